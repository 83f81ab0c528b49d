//! Type registry: type name → id, and per-id member codes.

use std::collections::{BTreeSet, HashMap};

use crate::error::{EdbError, Result};

#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    names: Vec<String>,
    ids: HashMap<String, usize>,
    members: Vec<BTreeSet<String>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from `(name, members)` pairs in id order (session restore).
    pub fn from_parts(parts: Vec<(String, BTreeSet<String>)>) -> Self {
        let mut reg = Self::new();
        for (name, members) in parts {
            let id = reg.add(&name);
            reg.members[id] = members;
        }
        reg
    }

    /// Idempotent: returns the existing id on repeat.
    pub fn add(&mut self, name: &str) -> usize {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.names.len();
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        self.members.push(BTreeSet::new());
        id
    }

    pub fn add_member(&mut self, type_id: usize, code: &str) -> Result<()> {
        let members = self
            .members
            .get_mut(type_id)
            .ok_or(EdbError::UnknownType(type_id))?;
        members.insert(code.to_string());
        Ok(())
    }

    /// Drop `code` from every member set except `keep`.
    pub(crate) fn retain_membership(&mut self, code: &str, keep: usize) {
        for (id, members) in self.members.iter_mut().enumerate() {
            if id != keep {
                members.remove(code);
            }
        }
    }

    pub fn id_of(&self, name: &str) -> Option<usize> {
        self.ids.get(name).copied()
    }

    pub fn name_of(&self, type_id: usize) -> Option<&str> {
        self.names.get(type_id).map(String::as_str)
    }

    pub fn members(&self, type_id: usize) -> Option<&BTreeSet<String>> {
        self.members.get(type_id)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
