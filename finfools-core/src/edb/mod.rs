//! Entity Time-Series Database (ETSDB).
//!
//! A dense rectangular store indexed by entity row and trading-day column:
//! - [`DateIndex`]: date ↔ column, appended in chronological order
//! - [`EntityRegistry`]: code → row, with name, type and lifespan
//! - [`TypeRegistry`]: type name → id, with member codes
//! - [`DataStore`]: one `E × D` matrix per data key, plus aliases and
//!   derived keys written by the operator pipeline
//!
//! Ingestion appends dates and rows into a preallocated capacity. After a
//! batch load, [`Edb::optimise_size`] trims every matrix to the populated
//! shape and [`Edb::fill_holes`] forward-fills non-trading days.

pub mod dates;
pub mod entities;
pub mod fill;
pub mod session;
pub mod store;
pub mod types;

pub use dates::{date_to_ymd, ymd_to_date, DateIndex};
pub use entities::{Entity, EntityRegistry, Upsert};
pub use store::{BlockStats, DataStore, DerivedMeta, KeyKind};
pub use types::TypeRegistry;

use chrono::NaiveDate;
use ndarray::Array2;
use tracing::{debug, warn};

use crate::error::{EdbError, Result};
use crate::matcher::{Matcher, Matches};

/// The in-memory entity time-series database.
#[derive(Debug, Clone)]
pub struct Edb {
    dates: DateIndex,
    entities: EntityRegistry,
    types: TypeRegistry,
    store: DataStore,
    /// Allocated `(rows, cols)` of every base matrix.
    capacity: (usize, usize),
}

impl Edb {
    /// Create an empty database with room for `entities × dates` cells per key.
    pub fn new<S: AsRef<str>>(entities: usize, dates: usize, data_keys: &[S]) -> Result<Self> {
        let capacity = (entities.max(1), dates.max(1));
        let mut store = DataStore::new();
        for key in data_keys {
            store.add_base_key(key.as_ref(), capacity)?;
        }
        Ok(Self {
            dates: DateIndex::new(),
            entities: EntityRegistry::new(),
            types: TypeRegistry::new(),
            store,
            capacity,
        })
    }

    /// Reassemble a database from restored parts.
    pub(crate) fn from_parts(
        dates: DateIndex,
        entities: EntityRegistry,
        types: TypeRegistry,
        store: DataStore,
        capacity: (usize, usize),
    ) -> Self {
        Self {
            dates,
            entities,
            types,
            store,
            capacity,
        }
    }

    // ── Schema ──────────────────────────────────────────────────────

    /// Register another base key, zero-filled at the current capacity.
    pub fn add_data_key(&mut self, key: &str) -> Result<()> {
        self.store.add_base_key(key, self.capacity)
    }

    /// Declare `alias` as another name for `canonical`.
    pub fn add_alias(&mut self, alias: &str, canonical: &str) -> Result<()> {
        self.store.add_alias(alias, canonical)
    }

    pub fn add_type(&mut self, name: &str) -> usize {
        self.types.add(name)
    }

    /// Record `code` as a member of `type_id`.
    ///
    /// A known entity can only join its own type. Codes not yet seen are
    /// accepted; [`Edb::add_entity`] later keeps them in their actual type only.
    pub fn add_type_member(&mut self, type_id: usize, code: &str) -> Result<()> {
        if let Some(entity) = self.entity_by_code(code) {
            if entity.type_id != type_id {
                return Err(EdbError::TypeConflict {
                    code: code.to_string(),
                    actual: entity.type_id,
                    requested: type_id,
                });
            }
        }
        self.types.add_member(type_id, code)
    }

    // ── Ingestion ───────────────────────────────────────────────────

    /// Append a date column. Dates must be strictly increasing.
    pub fn add_date(&mut self, date: NaiveDate) -> Result<usize> {
        let col = self.dates.push(date)?;
        if col >= self.capacity.1 {
            self.grow((self.capacity.0, (self.capacity.1 * 2).max(col + 1)));
        }
        Ok(col)
    }

    /// Insert an entity on first sight and return its row.
    ///
    /// On repeat, a supplied name that differs from the stored one replaces it
    /// with a warning. The type of an existing entity never changes.
    pub fn add_entity(&mut self, code: &str, name: Option<&str>, type_id: usize) -> Result<usize> {
        if self.types.name_of(type_id).is_none() {
            return Err(EdbError::UnknownType(type_id));
        }
        let upsert = self.entities.insert(code, name, type_id);
        match &upsert {
            Upsert::Inserted(row) => {
                self.types.add_member(type_id, code)?;
                self.types.retain_membership(code, type_id);
                if *row >= self.capacity.0 {
                    self.grow(((self.capacity.0 * 2).max(row + 1), self.capacity.1));
                }
            }
            Upsert::Renamed { old_name, .. } => {
                warn!(code, old_name = %old_name, new_name = name.unwrap_or(""), "entity renamed");
            }
            Upsert::Existing(_) => {}
        }
        Ok(upsert.row())
    }

    /// Write one cell per `(key, value)` into the last added column.
    ///
    /// Unknown codes are inserted when `type_id` is supplied. Non-finite values
    /// are not stored. A finite, non-zero value counts as an observation and
    /// advances the entity's first/last seen columns.
    pub fn add_data(
        &mut self,
        code: &str,
        values: &[(&str, f64)],
        name: Option<&str>,
        type_id: Option<usize>,
    ) -> Result<()> {
        let col = self.dates.len().checked_sub(1).ok_or(EdbError::NoDateAdded)?;
        if let Some((key, _)) = values.iter().find(|(k, _)| !self.store.contains(k)) {
            return Err(EdbError::UnknownKey(key.to_string()));
        }
        let row = match (self.entities.row_of(code), type_id) {
            (Some(row), _) if name.is_none() => row,
            (Some(row), None) => {
                let type_id = self.entities.get(row).map_or(0, |e| e.type_id);
                self.add_entity(code, name, type_id)?
            }
            (_, Some(type_id)) => self.add_entity(code, name, type_id)?,
            (None, None) => return Err(EdbError::UnknownCode(code.to_string())),
        };

        let mut observed = false;
        for &(key, value) in values {
            if !value.is_finite() {
                continue;
            }
            if let Some(m) = self.store.get_mut(key) {
                m[[row, col]] = value;
            }
            observed |= value != 0.0;
        }
        if observed {
            if let Some(entity) = self.entities.get_mut(row) {
                entity.observe(col);
            }
        }
        Ok(())
    }

    fn grow(&mut self, capacity: (usize, usize)) {
        debug!(from = ?self.capacity, to = ?capacity, "growing store capacity");
        let dropped = self.store.reshape_base(capacity);
        if !dropped.is_empty() {
            warn!(keys = ?dropped, "store reshaped; derived keys dropped");
        }
        self.capacity = capacity;
    }

    /// Trim every base matrix to the populated `E_used × D_used` shape.
    pub fn optimise_size(&mut self) {
        let used = self.shape();
        if used != self.capacity {
            debug!(from = ?self.capacity, to = ?used, "trimming store");
            let dropped = self.store.reshape_base(used);
            if !dropped.is_empty() {
                warn!(keys = ?dropped, "store trimmed; derived keys dropped");
            }
            self.capacity = used;
        }
    }

    /// Forward-fill every base key over the populated columns.
    pub fn fill_holes(&mut self) -> usize {
        let cols = self.dates.len();
        let keys: Vec<String> = self.store.base_keys().to_vec();
        let mut filled = 0;
        for key in keys {
            if let Some(m) = self.store.get_mut(&key) {
                filled += fill::fill_matrix(m, cols);
            }
        }
        debug!(filled, "hole fill complete");
        filled
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Resolve an inclusive date range to columns. `None` means the first or
    /// last populated column.
    pub fn date_range_to_index(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<(usize, usize)> {
        let last = self.dates.len().checked_sub(1).ok_or(EdbError::NoDateAdded)?;
        let cs = match start {
            Some(d) => self.dates.col_of(d).ok_or(EdbError::UnknownDate(d))?,
            None => 0,
        };
        let ce = match end {
            Some(d) => self.dates.col_of(d).ok_or(EdbError::UnknownDate(d))?,
            None => last,
        };
        Ok((cs, ce))
    }

    /// Types whose names match `templates` (all types when empty).
    pub fn list_types<S: AsRef<str>>(&self, templates: &[S]) -> Result<Matches<(usize, &str)>> {
        let matcher = Matcher::new(templates, false)?;
        let types = self
            .types
            .names()
            .iter()
            .enumerate()
            .map(|(id, name)| (id, name.as_str()));
        Ok(matcher.split(types, |t| t.1))
    }

    /// Entities in types fully matching `type_templates` whose names match
    /// `name_templates`.
    pub fn list_type_members<S: AsRef<str>, N: AsRef<str>>(
        &self,
        type_templates: &[S],
        name_templates: &[N],
    ) -> Result<Matches<&Entity>> {
        let type_ids: Vec<usize> = self
            .list_types(type_templates)?
            .full
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        let names = Matcher::new(name_templates, false)?;
        let members = type_ids.into_iter().flat_map(|id| {
            self.types
                .members(id)
                .into_iter()
                .flatten()
                .filter_map(|code| self.entity_by_code(code))
        });
        Ok(names.split(members, |e| e.name.as_str()))
    }

    pub fn data(&self, key: &str) -> Result<&Array2<f64>> {
        self.store
            .get(key)
            .ok_or_else(|| EdbError::UnknownKey(key.to_string()))
    }

    pub fn meta(&self, key: &str) -> Option<&DerivedMeta> {
        self.store.meta(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.store.contains(key)
    }

    /// Every readable key: base, derived and aliases.
    pub fn keys(&self) -> Vec<String> {
        self.store.keys()
    }

    pub fn row_of(&self, code: &str) -> Result<usize> {
        self.entities
            .row_of(code)
            .ok_or_else(|| EdbError::UnknownCode(code.to_string()))
    }

    pub fn col_of(&self, date: NaiveDate) -> Result<usize> {
        self.dates.col_of(date).ok_or(EdbError::UnknownDate(date))
    }

    pub fn date_of(&self, col: usize) -> Option<NaiveDate> {
        self.dates.date_of(col)
    }

    pub fn entity(&self, row: usize) -> Option<&Entity> {
        self.entities.get(row)
    }

    pub fn entity_by_code(&self, code: &str) -> Option<&Entity> {
        self.entities.row_of(code).and_then(|r| self.entities.get(r))
    }

    pub fn entities(&self) -> &[Entity] {
        self.entities.as_slice()
    }

    pub fn type_name(&self, type_id: usize) -> Option<&str> {
        self.types.name_of(type_id)
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn dates(&self) -> &DateIndex {
        &self.dates
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last()
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut DataStore {
        &mut self.store
    }

    /// Populated `(entities, dates)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.entities.len(), self.dates.len())
    }

    pub fn capacity(&self) -> (usize, usize) {
        self.capacity
    }

    pub fn is_trimmed(&self) -> bool {
        self.capacity == self.shape()
    }
}
