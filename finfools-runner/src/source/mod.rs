//! Data sources: where per-day snapshots come from.
//!
//! A source fetches a day into a local snapshot (possibly from its remote
//! endpoint) and loads a snapshot into the database. Loading retries: the
//! first attempt uses whatever is local, later attempts force a remote
//! fetch. A corrupt snapshot is deleted so the next attempt can replace it.

pub mod csv_dir;
pub mod snapshot;

pub use csv_dir::CsvDirSource;
pub use snapshot::{Snapshot, SnapshotRow, SNAPSHOT_MARKER};

use chrono::NaiveDate;
use finfools_core::{CompiledFilter, Edb};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::IngestError;

/// Attempts per date before it is recorded as missing.
pub const LOAD_ATTEMPTS: usize = 3;

/// Domain a source belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSrcType {
    Mf,
    Stock,
    Any,
}

impl DataSrcType {
    /// Whether a source of type `self` serves a request for `wanted`.
    pub fn serves(self, wanted: DataSrcType) -> bool {
        wanted == DataSrcType::Any || self == DataSrcType::Any || self == wanted
    }
}

impl fmt::Display for DataSrcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mf => "mf",
            Self::Stock => "stock",
            Self::Any => "any",
        })
    }
}

impl FromStr for DataSrcType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mf" => Ok(Self::Mf),
            "stock" => Ok(Self::Stock),
            "any" => Ok(Self::Any),
            other => Err(format!("unknown source type '{other}' (mf, stock, any)")),
        }
    }
}

/// Fetch preferences. Remote wins when both flags are set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub force_remote: bool,
    pub force_local: bool,
}

impl FetchOptions {
    pub fn remote() -> Self {
        Self {
            force_remote: true,
            force_local: false,
        }
    }

    pub fn local() -> Self {
        Self {
            force_remote: false,
            force_local: true,
        }
    }

    /// The endpoint must be consulted even when a snapshot exists.
    pub fn wants_remote(&self) -> bool {
        self.force_remote
    }

    /// The endpoint must not be consulted.
    pub fn local_only(&self) -> bool {
        self.force_local && !self.force_remote
    }
}

/// Result of a fetch for one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// An up-to-date snapshot was already present.
    Cached,
    /// A snapshot was (re)written from the endpoint.
    Fetched,
    /// No data exists for the date (weekend, holiday, not yet published).
    Absent,
}

/// Result of loading one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { entities: usize, dropped: usize },
    Absent,
}

pub trait DataSource: Send {
    fn name(&self) -> &str;

    fn src_type(&self) -> DataSrcType;

    /// Data keys this source writes.
    fn data_keys(&self) -> &[String];

    /// Make sure a usable local snapshot exists for `date`.
    fn fetch_for_date(
        &mut self,
        date: NaiveDate,
        opts: FetchOptions,
    ) -> Result<FetchStatus, IngestError>;

    /// Read the local snapshot for `date`.
    fn read_snapshot(&self, date: NaiveDate) -> Result<Snapshot, IngestError>;

    /// Remove the local snapshot for `date`, if any.
    fn discard_snapshot(&self, date: NaiveDate);

    fn record_missing(&mut self, date: NaiveDate);

    /// Dates whose every load attempt failed.
    fn missing_dates(&self) -> &[NaiveDate];

    /// Load `date` into `edb`, retrying per [`LOAD_ATTEMPTS`].
    ///
    /// A column is added for `date` unless the database already ends on it.
    fn load_for_date(
        &mut self,
        date: NaiveDate,
        edb: &mut Edb,
        filter: &CompiledFilter,
        opts: FetchOptions,
    ) -> Result<LoadOutcome, IngestError> {
        let mut last_err = IngestError::NoSnapshot(date);
        for attempt in 0..LOAD_ATTEMPTS {
            let attempt_opts = if attempt == 0 {
                opts
            } else {
                FetchOptions::remote()
            };
            match self.fetch_for_date(date, attempt_opts) {
                Ok(FetchStatus::Absent) => return Ok(LoadOutcome::Absent),
                Ok(_) => {}
                Err(e) => {
                    warn!(source = self.name(), %date, attempt, error = %e, "fetch failed");
                    last_err = e;
                    continue;
                }
            }
            match self.read_snapshot(date) {
                Ok(snap) => {
                    let (entities, dropped) = ingest_snapshot(edb, &snap, filter)?;
                    debug!(source = self.name(), %date, entities, dropped, "date loaded");
                    return Ok(LoadOutcome::Loaded { entities, dropped });
                }
                Err(e) => {
                    warn!(source = self.name(), %date, attempt, error = %e, "snapshot unreadable; discarding");
                    self.discard_snapshot(date);
                    last_err = e;
                }
            }
        }
        warn!(source = self.name(), %date, "giving up on date");
        self.record_missing(date);
        Err(last_err)
    }
}

/// Write a snapshot's rows into the last column of `edb`, adding the column
/// first when needed. Rows the filter rejects are dropped silently; keys the
/// database does not carry are ignored.
///
/// Returns `(ingested, dropped)`.
pub fn ingest_snapshot(
    edb: &mut Edb,
    snap: &Snapshot,
    filter: &CompiledFilter,
) -> Result<(usize, usize), IngestError> {
    if edb.last_date() != Some(snap.date) {
        edb.add_date(snap.date)?;
    }
    let keys: Vec<(usize, &str)> = snap
        .data_keys
        .iter()
        .enumerate()
        .filter(|(_, k)| edb.contains_key(k))
        .map(|(i, k)| (i, k.as_str()))
        .collect();

    let mut ingested = 0;
    let mut dropped = 0;
    for (code, row) in snap.rows() {
        let type_name = snap.type_name(row);
        if !filter.accepts(type_name, &row.name) {
            dropped += 1;
            continue;
        }
        let type_id = edb.add_type(type_name);
        let values: Vec<(&str, f64)> = keys.iter().map(|&(i, k)| (k, row.values[i])).collect();
        edb.add_data(code, &values, Some(&row.name), Some(type_id))?;
        ingested += 1;
    }
    Ok((ingested, dropped))
}
