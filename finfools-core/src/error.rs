//! Structured error types for the entity time-series database.
//!
//! Lookup failures and invariant violations are hard failures surfaced to the
//! caller. Operator errors are separate so a batch of ops can log and skip a
//! bad spec without aborting the rest.

use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised by ETSDB operations.
#[derive(Debug, Error)]
pub enum EdbError {
    #[error("unknown data key: {0}")]
    UnknownKey(String),

    #[error("unknown entity code: {0}")]
    UnknownCode(String),

    #[error("unknown date: {0}")]
    UnknownDate(NaiveDate),

    #[error("unknown type id: {0}")]
    UnknownType(usize),

    #[error("entity {code} has type {actual}, not {requested}")]
    TypeConflict {
        code: String,
        actual: usize,
        requested: usize,
    },

    #[error("invalid date value: {0}")]
    InvalidDate(String),

    #[error("date {new} is not after the last added date {last}")]
    DateOutOfOrder { new: NaiveDate, last: NaiveDate },

    #[error("addData called before any date was added")]
    NoDateAdded,

    #[error("data key already exists: {0}")]
    DuplicateKey(String),

    #[error("shape mismatch for '{key}': expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        key: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("invalid match template '{template}': {reason}")]
    BadTemplate { template: String, reason: String },
}

/// Errors raised while parsing or running a derived-series operator.
#[derive(Debug, Error)]
pub enum OpError {
    #[error("malformed op spec '{spec}': {reason}")]
    Malformed { spec: String, reason: String },

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("source key '{0}' does not exist")]
    MissingSource(String),

    #[error("operator needs key '{0}', which does not exist")]
    MissingInput(String),

    #[error("date range [{start}:{end}] is empty")]
    EmptyRange { start: usize, end: usize },

    #[error("window {window} does not fit the {len} column range")]
    WindowTooLarge { window: usize, len: usize },

    #[error(transparent)]
    Edb(#[from] EdbError),
}

/// Errors raised while saving or restoring a session image.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("session encoding error: {0}")]
    Codec(#[from] postcard::Error),

    #[error("session sidecar error: {0}")]
    Sidecar(#[from] serde_json::Error),

    #[error("session '{0}' not found")]
    NotFound(String),

    #[error("session image is corrupt: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, EdbError>;
