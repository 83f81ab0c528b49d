//! Entity registry: stable code → permanent row index.
//!
//! Rows are assigned in insertion order and never reused. The name is the
//! only mutable attribute; the last ingested name wins.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One fund, ticker or index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub code: String,
    pub name: String,
    pub type_id: usize,
    /// Column of the first observation (finite, non-zero write).
    pub first_seen: Option<usize>,
    /// Column of the most recent observation.
    pub last_seen: Option<usize>,
}

impl Entity {
    /// Record an observation at `col`.
    pub fn observe(&mut self, col: usize) {
        if self.first_seen.is_none() {
            self.first_seen = Some(col);
        }
        self.last_seen = Some(self.last_seen.map_or(col, |l| l.max(col)));
    }
}

/// Outcome of an `insert` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    Inserted(usize),
    Existing(usize),
    Renamed { row: usize, old_name: String },
}

impl Upsert {
    pub fn row(&self) -> usize {
        match self {
            Self::Inserted(row) | Self::Existing(row) | Self::Renamed { row, .. } => *row,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: Vec<Entity>,
    rows: HashMap<String, usize>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from rows in index order (session restore).
    pub fn from_entities(entities: Vec<Entity>) -> Self {
        let rows = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.code.clone(), i))
            .collect();
        Self { entities, rows }
    }

    /// Insert on first sight; on repeat, overwrite a differing non-empty name.
    pub fn insert(&mut self, code: &str, name: Option<&str>, type_id: usize) -> Upsert {
        if let Some(&row) = self.rows.get(code) {
            let entity = &mut self.entities[row];
            return match name {
                Some(name) if !name.is_empty() && name != entity.name => {
                    let old_name = std::mem::replace(&mut entity.name, name.to_string());
                    Upsert::Renamed { row, old_name }
                }
                _ => Upsert::Existing(row),
            };
        }
        let row = self.entities.len();
        self.entities.push(Entity {
            code: code.to_string(),
            name: name.unwrap_or(code).to_string(),
            type_id,
            first_seen: None,
            last_seen: None,
        });
        self.rows.insert(code.to_string(), row);
        Upsert::Inserted(row)
    }

    pub fn row_of(&self, code: &str) -> Option<usize> {
        self.rows.get(code).copied()
    }

    pub fn get(&self, row: usize) -> Option<&Entity> {
        self.entities.get(row)
    }

    pub fn get_mut(&mut self, row: usize) -> Option<&mut Entity> {
        self.entities.get_mut(row)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn as_slice(&self) -> &[Entity] {
        &self.entities
    }
}
