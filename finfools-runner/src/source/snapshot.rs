//! Per-day snapshot container.
//!
//! Layout: `{snapshots}/{source}/{YYYYMMDD}.snap`, one postcard image per
//! day. Writes are atomic (write to .tmp, rename into place) and reads check
//! the marker and row widths before anything reaches the database.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::IngestError;

pub const SNAPSHOT_MARKER: &str = "FINFOOLS-SNAP-1";

/// One entity's values for the snapshot's day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub name: String,
    /// Index into [`Snapshot::ent_types`].
    pub ent_type: usize,
    /// One value per entry of [`Snapshot::data_keys`]; NaN means not reported.
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub marker: String,
    pub date: NaiveDate,
    /// False while the day may still receive data; a stale snapshot is refetched.
    pub up_to_date: bool,
    pub ent_types: Vec<String>,
    pub data_keys: Vec<String>,
    pub code_to_index: BTreeMap<String, usize>,
    pub data: Vec<SnapshotRow>,
    pub more: BTreeMap<String, String>,
}

impl Snapshot {
    pub fn new(date: NaiveDate, data_keys: Vec<String>) -> Self {
        Self {
            marker: SNAPSHOT_MARKER.to_string(),
            date,
            up_to_date: true,
            ent_types: Vec::new(),
            data_keys,
            code_to_index: BTreeMap::new(),
            data: Vec::new(),
            more: BTreeMap::new(),
        }
    }

    /// Add or replace the row for `code`.
    pub fn push(&mut self, code: &str, name: &str, type_name: &str, values: Vec<f64>) {
        let ent_type = match self.ent_types.iter().position(|t| t == type_name) {
            Some(idx) => idx,
            None => {
                self.ent_types.push(type_name.to_string());
                self.ent_types.len() - 1
            }
        };
        let row = SnapshotRow {
            name: name.to_string(),
            ent_type,
            values,
        };
        match self.code_to_index.get(code) {
            Some(&idx) => self.data[idx] = row,
            None => {
                self.code_to_index.insert(code.to_string(), self.data.len());
                self.data.push(row);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Rows in insertion order, paired with their code.
    pub fn rows(&self) -> Vec<(&str, &SnapshotRow)> {
        let mut rows: Vec<(&str, &SnapshotRow)> = self
            .code_to_index
            .iter()
            .filter_map(|(code, &idx)| self.data.get(idx).map(|row| (code.as_str(), row)))
            .collect();
        rows.sort_by_key(|(code, _)| self.code_to_index.get(*code).copied());
        rows
    }

    pub fn type_name(&self, row: &SnapshotRow) -> &str {
        self.ent_types
            .get(row.ent_type)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, IngestError> {
        Ok(postcard::to_stdvec(self)?)
    }

    /// Decode and validate an image; `origin` names it in errors.
    pub fn from_bytes(bytes: &[u8], origin: &str) -> Result<Self, IngestError> {
        let snap: Self = postcard::from_bytes(bytes)?;
        snap.validate(origin)?;
        Ok(snap)
    }

    fn validate(&self, origin: &str) -> Result<(), IngestError> {
        if self.marker != SNAPSHOT_MARKER {
            return Err(IngestError::BadMarker {
                path: origin.to_string(),
                found: self.marker.clone(),
            });
        }
        let corrupt = |reason: String| IngestError::Corrupt {
            path: origin.to_string(),
            reason,
        };
        if self.code_to_index.len() != self.data.len() {
            return Err(corrupt(format!(
                "{} codes for {} rows",
                self.code_to_index.len(),
                self.data.len()
            )));
        }
        let width = self.data_keys.len();
        for (code, &idx) in &self.code_to_index {
            let row = self
                .data
                .get(idx)
                .ok_or_else(|| corrupt(format!("code {code} points past row {idx}")))?;
            if row.values.len() != width {
                return Err(corrupt(format!(
                    "code {code} has {} values for {width} keys",
                    row.values.len()
                )));
            }
            if row.ent_type >= self.ent_types.len() {
                return Err(corrupt(format!("code {code} has unknown type {}", row.ent_type)));
            }
        }
        Ok(())
    }

    /// Write the image atomically to `path`, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<(), IngestError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(IngestError::io(dir))?;
        }
        let bytes = self.to_bytes()?;
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, &bytes).map_err(IngestError::io(&tmp_path))?;
        fs::rename(&tmp_path, path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            IngestError::io(path)(e)
        })
    }

    pub fn read(path: &Path) -> Result<Self, IngestError> {
        let bytes = fs::read(path).map_err(IngestError::io(path))?;
        Self::from_bytes(&bytes, &path.display().to_string())
    }
}
