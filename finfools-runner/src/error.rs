//! Error types for the runner layer.
//!
//! Ingestion errors are recovered per date by the loader; everything else
//! surfaces to the driver's caller.

use chrono::NaiveDate;
use finfools_core::{EdbError, OpError, SessionError};
use thiserror::Error;

/// Errors raised while fetching or parsing a per-day snapshot.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("snapshot encoding error: {0}")]
    Codec(#[from] postcard::Error),

    #[error("snapshot {path} has marker '{found}'")]
    BadMarker { path: String, found: String },

    #[error("snapshot {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("no snapshot available for {0}")]
    NoSnapshot(NaiveDate),

    #[error(transparent)]
    Edb(#[from] EdbError),
}

impl IngestError {
    pub(crate) fn io(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Errors raised by ranking and similarity.
#[derive(Debug, Error)]
pub enum RankError {
    #[error("key '{key}' was written by '{tag}', which has no {mode} scores")]
    WrongMode {
        key: String,
        mode: String,
        tag: String,
    },

    #[error("key '{0}' has no column with finite data")]
    NoColumn(String),

    #[error("column {col} is outside '{key}' ({cols} columns)")]
    ColumnOutOfRange { key: String, col: usize, cols: usize },

    #[error(transparent)]
    Edb(#[from] EdbError),

    #[error(transparent)]
    Op(#[from] OpError),
}

/// Errors raised while reading `finfools.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors raised by a plotter.
#[derive(Debug, Error)]
pub enum PlotError {
    #[error("plot output error: {0}")]
    Csv(#[from] csv::Error),

    #[error("plot output error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by driver commands.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("no database loaded: run `load` or restore a session first")]
    NoData,

    #[error("invalid date '{0}': expected YYYY, YYYYMM or YYYYMMDD")]
    BadDate(String),

    #[error("unknown load filter '{0}'")]
    UnknownFilter(String),

    #[error("no configured source matches type {0}")]
    NoSource(String),

    #[error(transparent)]
    Edb(#[from] EdbError),

    #[error(transparent)]
    Op(#[from] OpError),

    #[error(transparent)]
    Rank(#[from] RankError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Plot(#[from] PlotError),
}
