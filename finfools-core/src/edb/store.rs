//! Data store: one dense `E × D` matrix per data key.
//!
//! Aliases are a name-indirection table `alias → canonical`. Reads resolve
//! through it and writes always land on the canonical key. Derived keys carry
//! a [`DerivedMeta`] record next to their matrix.

use ndarray::{s, Array2, Array3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{EdbError, Result};

/// Per-block statistics written by the `block<N>` operator.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockStats {
    /// Block length in columns.
    pub window: usize,
    /// First column of the oldest block.
    pub first_col: usize,
    /// `E × B` block means.
    pub avgs: Array2<f64>,
    /// `E × B` block standard deviations.
    pub stds: Array2<f64>,
    /// `E × B × 5` quantiles at `0, .25, .5, .75, 1`.
    pub qntls: Array3<f64>,
}

impl BlockStats {
    pub fn num_blocks(&self) -> usize {
        self.avgs.ncols()
    }
}

/// Companion metadata of a derived key `X`.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedMeta {
    /// `X.MetaType`: short operator tag, e.g. `srel`, `roll365`.
    pub tag: String,
    /// Key the operator read from (already alias-resolved).
    pub src: String,
    /// Base key at the root of the derivation chain.
    pub base: String,
    pub start_col: usize,
    pub end_col: usize,
    /// `X.MetaData`: `E × M` per-entity summary statistics.
    pub data: Array2<f64>,
    /// `X.MetaLabel`: per-entity display string.
    pub labels: Vec<String>,
    pub blocks: Option<BlockStats>,
}

impl DerivedMeta {
    /// One column of `X.MetaData`, NaN-filled when the operator wrote fewer.
    pub fn column(&self, idx: usize) -> Vec<f64> {
        if idx < self.data.ncols() {
            self.data.column(idx).to_vec()
        } else {
            vec![f64::NAN; self.data.nrows()]
        }
    }
}

/// Kind of a stored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    Base,
    Derived,
}

#[derive(Debug, Clone, Default)]
pub struct DataStore {
    matrices: BTreeMap<String, Array2<f64>>,
    aliases: BTreeMap<String, String>,
    meta: BTreeMap<String, DerivedMeta>,
    base_keys: Vec<String>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a base key with a zero matrix of `shape`.
    pub fn add_base_key(&mut self, key: &str, shape: (usize, usize)) -> Result<()> {
        if self.contains(key) {
            return Err(EdbError::DuplicateKey(key.to_string()));
        }
        self.matrices.insert(key.to_string(), Array2::zeros(shape));
        self.base_keys.push(key.to_string());
        Ok(())
    }

    /// Declare `alias` as another name for `canonical`.
    pub fn add_alias(&mut self, alias: &str, canonical: &str) -> Result<()> {
        let target = self
            .resolve(canonical)
            .ok_or_else(|| EdbError::UnknownKey(canonical.to_string()))?
            .to_string();
        if self.matrices.contains_key(alias) {
            return Err(EdbError::DuplicateKey(alias.to_string()));
        }
        if alias != target {
            self.aliases.insert(alias.to_string(), target);
        }
        Ok(())
    }

    /// Canonical name for `key`, if it names a stored matrix.
    pub fn resolve<'a>(&'a self, key: &'a str) -> Option<&'a str> {
        let canonical = self.aliases.get(key).map_or(key, String::as_str);
        self.matrices.contains_key(canonical).then_some(canonical)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.resolve(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&Array2<f64>> {
        self.resolve(key).and_then(|k| self.matrices.get(k))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Array2<f64>> {
        let canonical = self.aliases.get(key).cloned().unwrap_or_else(|| key.to_string());
        self.matrices.get_mut(&canonical)
    }

    pub fn meta(&self, key: &str) -> Option<&DerivedMeta> {
        self.resolve(key).and_then(|k| self.meta.get(k))
    }

    pub fn kind(&self, key: &str) -> Option<KeyKind> {
        self.resolve(key).map(|k| {
            if self.meta.contains_key(k) {
                KeyKind::Derived
            } else {
                KeyKind::Base
            }
        })
    }

    /// Store a derived matrix and its metadata, replacing any previous value.
    pub fn put_derived(&mut self, key: &str, data: Array2<f64>, meta: DerivedMeta) -> Result<()> {
        if self.base_keys.iter().any(|k| k == key) || self.aliases.contains_key(key) {
            return Err(EdbError::DuplicateKey(key.to_string()));
        }
        self.matrices.insert(key.to_string(), data);
        self.meta.insert(key.to_string(), meta);
        Ok(())
    }

    pub fn base_keys(&self) -> &[String] {
        &self.base_keys
    }

    pub fn derived_keys(&self) -> impl Iterator<Item = &str> {
        self.meta.keys().map(String::as_str)
    }

    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    /// All names a caller may read, aliases included.
    pub fn keys(&self) -> Vec<String> {
        self.matrices
            .keys()
            .chain(self.aliases.keys())
            .cloned()
            .collect()
    }

    /// Resize every base matrix to `shape`, keeping the overlapping corner.
    ///
    /// Derived keys are dropped: their shape no longer matches the store.
    pub fn reshape_base(&mut self, shape: (usize, usize)) -> Vec<String> {
        for key in &self.base_keys {
            if let Some(old) = self.matrices.get_mut(key) {
                if old.dim() == shape {
                    continue;
                }
                let mut new = Array2::zeros(shape);
                let rows = old.nrows().min(shape.0);
                let cols = old.ncols().min(shape.1);
                new.slice_mut(s![..rows, ..cols])
                    .assign(&old.slice(s![..rows, ..cols]));
                *old = new;
            }
        }
        let dropped: Vec<String> = self.meta.keys().cloned().collect();
        for key in &dropped {
            self.matrices.remove(key);
            self.meta.remove(key);
        }
        dropped
    }

    /// Reassemble a store from its parts (session restore).
    pub(crate) fn from_parts(
        base: Vec<(String, Array2<f64>)>,
        derived: Vec<(String, Array2<f64>, DerivedMeta)>,
        aliases: BTreeMap<String, String>,
    ) -> Self {
        let mut store = Self::new();
        for (key, m) in base {
            store.base_keys.push(key.clone());
            store.matrices.insert(key, m);
        }
        for (key, m, meta) in derived {
            store.matrices.insert(key.clone(), m);
            store.meta.insert(key, meta);
        }
        store.aliases = aliases;
        store
    }
}
