//! Derived-series operators.
//!
//! Every operator reads one `E × D` source matrix and produces:
//! - a derived `E × D` matrix (cells outside the requested range are NaN)
//! - an `E × M` metadata matrix of per-entity summary statistics
//! - one display label per entity
//!
//! Operators are vectorised over entities: each row is computed independently
//! and rows run in parallel. The typed [`OpSpec`] is the internal form; the
//! string DSL in [`parse`] is a thin frontend over it.

pub mod average;
pub mod block;
pub mod parse;
pub mod pipeline;
pub mod pivot;
pub mod returns;
pub mod rsi;
pub mod stats;

pub use parse::{parse_op, OpRequest};
pub use pipeline::{apply, ensure_srel, run_ops};

use chrono::NaiveDate;
use ndarray::{Array2, ArrayView1, ArrayViewMut1, Zip};
use std::fmt;

use crate::edb::{date_to_ymd, BlockStats};

/// Day count used for every annualisation. Columns are trading days, but the
/// divisor stays a flat 365.
pub const DAYS_PER_YEAR: f64 = 365.0;

/// Return threshold (percent) below which a rolling return counts as poor.
pub const MIN_THRESHOLD: f64 = 4.0;

/// How a price ratio becomes a return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetKind {
    /// `(ratio − 1) · 100`
    AbsRet,
    /// `(ratio^(365/gap) − 1) · 100`
    RetPa,
    /// `AbsRet` up to one year of gap, `RetPa` beyond.
    Safe,
}

impl RetKind {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::AbsRet => "absret",
            Self::RetPa => "retpa",
            Self::Safe => "safe",
        }
    }

    /// Return for `ratio` observed over `gap` columns.
    pub fn apply(self, ratio: f64, gap: usize) -> f64 {
        let absret = (ratio - 1.0) * 100.0;
        if gap == 0 {
            return absret;
        }
        let retpa = (ratio.powf(DAYS_PER_YEAR / gap as f64) - 1.0) * 100.0;
        match self {
            Self::AbsRet => absret,
            Self::RetPa => retpa,
            Self::Safe if gap as f64 <= DAYS_PER_YEAR => absret,
            Self::Safe => retpa,
        }
    }
}

/// Moving-average flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaKind {
    /// `mas<N>`: trailing simple mean.
    Simple,
    /// `dma<N>`: window centred on the cell.
    Centred,
    /// `mae<N>`: exponential, `α = 2/(N+1)`.
    Exponential,
}

impl MaKind {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Simple => "mas",
            Self::Centred => "dma",
            Self::Exponential => "mae",
        }
    }
}

/// A parsed operator.
#[derive(Debug, Clone, PartialEq)]
pub enum OpSpec {
    Srel,
    Rel { base: Option<NaiveDate> },
    Reton { anchor: Option<NaiveDate>, kind: RetKind },
    Ma { window: usize, kind: MaKind },
    Roll { window: usize, kind: RetKind },
    Block { window: usize },
    Rsi { lookback: usize },
    Pivot { date: Option<NaiveDate> },
}

impl OpSpec {
    /// Short tag stored as `X.MetaType`.
    pub fn tag(&self) -> String {
        match self {
            Self::Srel => "srel".into(),
            Self::Rel { .. } => "rel".into(),
            Self::Reton { kind, .. } => format!("reton_{}", kind.suffix()),
            Self::Ma { window, kind } => format!("{}{window}", kind.prefix()),
            Self::Roll {
                window,
                kind: RetKind::AbsRet,
            } => format!("roll{window}"),
            Self::Roll { window, kind } => format!("roll{window}_{}", kind.suffix()),
            Self::Block { window } => format!("block{window}"),
            Self::Rsi { lookback } => format!("rsi{lookback}"),
            Self::Pivot { .. } => "pivot".into(),
        }
    }
}

impl fmt::Display for OpSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let date = |d: &Option<NaiveDate>| {
            d.map(|d| format!("[{}]", date_to_ymd(d)))
                .unwrap_or_default()
        };
        match self {
            Self::Rel { base } => write!(f, "rel{}", date(base)),
            Self::Reton { anchor, kind } => write!(f, "reton{}_{}", date(anchor), kind.suffix()),
            Self::Pivot { date: d } => write!(f, "pivot{}", date(d)),
            other => write!(f, "{}", other.tag()),
        }
    }
}

/// Everything an operator kernel produces.
#[derive(Debug, Clone)]
pub struct OpOutput {
    pub data: Array2<f64>,
    pub meta: Array2<f64>,
    pub labels: Vec<String>,
    pub blocks: Option<BlockStats>,
}

/// Run `f` over every `(source row, output row, meta row)` triple in parallel.
///
/// Output and meta cells start as NaN; `f` returns the row's label.
pub(crate) fn map_rows<F>(src: &Array2<f64>, meta_cols: usize, f: F) -> OpOutput
where
    F: Fn(ArrayView1<'_, f64>, ArrayViewMut1<'_, f64>, ArrayViewMut1<'_, f64>) -> String
        + Send
        + Sync,
{
    let (rows, cols) = src.dim();
    let mut data = Array2::from_elem((rows, cols), f64::NAN);
    let mut meta = Array2::from_elem((rows, meta_cols), f64::NAN);
    let mut labels = vec![String::new(); rows];
    Zip::from(src.rows())
        .and(data.rows_mut())
        .and(meta.rows_mut())
        .and(&mut labels[..])
        .par_for_each(|s, o, m, label| *label = f(s, o, m));
    OpOutput {
        data,
        meta,
        labels,
        blocks: None,
    }
}

/// First and last finite values of a row, if any.
pub(crate) fn finite_ends(row: ArrayView1<'_, f64>) -> Option<(f64, f64)> {
    let first = row.iter().copied().find(|v| v.is_finite())?;
    let last = row.iter().rev().copied().find(|v| v.is_finite())?;
    Some((first, last))
}

/// Assert two f64 values are approximately equal (within epsilon).
/// NaN only equals NaN.
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    if expected.is_nan() {
        assert!(actual.is_nan(), "assert_approx failed: actual={actual}, expected=NaN");
        return;
    }
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Assert a row matches `expected` cell by cell.
#[cfg(test)]
pub fn assert_row(actual: ArrayView1<'_, f64>, expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "row length");
    for (a, e) in actual.iter().zip(expected) {
        assert_approx(*a, *e, DEFAULT_EPSILON);
    }
}

/// Default epsilon for operator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-9;
