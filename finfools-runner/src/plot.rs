//! Plot collaborator: series extraction and a CSV backend.
//!
//! Rendering lives behind [`Plotter`]; the runner only builds the series.

use chrono::NaiveDate;
use finfools_core::{EdbError, Edb};
use std::io::Write;

use crate::error::PlotError;

/// One line: finite cells of an entity's row.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotSeries {
    pub x: Vec<usize>,
    pub y: Vec<f64>,
    pub label: String,
}

pub trait Plotter {
    /// Draw `series`; `dates[x]` is the date of column `x`.
    fn plot(&mut self, series: &[PlotSeries], dates: &[NaiveDate]) -> Result<(), PlotError>;
}

/// Series of `key` for each entity in `codes`.
///
/// The label is the entity name, followed by the key's metadata label when
/// the key is derived.
pub fn plot_series<S: AsRef<str>>(
    edb: &Edb,
    key: &str,
    codes: &[S],
) -> Result<Vec<PlotSeries>, EdbError> {
    let data = edb.data(key)?;
    let meta = edb.meta(key);
    codes
        .iter()
        .map(|code| {
            let row = edb.row_of(code.as_ref())?;
            let (x, y) = data
                .row(row)
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_finite())
                .map(|(c, v)| (c, *v))
                .unzip();
            let name = edb.entity(row).map_or(code.as_ref(), |e| e.name.as_str());
            let label = match meta.and_then(|m| m.labels.get(row)) {
                Some(extra) if !extra.is_empty() => format!("{name} {}", extra.trim()),
                _ => name.to_string(),
            };
            Ok(PlotSeries { x, y, label })
        })
        .collect()
}

/// Writes `label,date,value` rows.
pub struct CsvPlotter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvPlotter<W> {
    pub fn new(out: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(out),
        }
    }

    pub fn into_inner(self) -> Result<W, PlotError> {
        self.writer
            .into_inner()
            .map_err(|e| PlotError::Io(e.into_error()))
    }
}

impl<W: Write> Plotter for CsvPlotter<W> {
    fn plot(&mut self, series: &[PlotSeries], dates: &[NaiveDate]) -> Result<(), PlotError> {
        self.writer.write_record(["label", "date", "value"])?;
        for s in series {
            for (x, y) in s.x.iter().zip(&s.y) {
                let date = dates
                    .get(*x)
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                self.writer
                    .write_record([s.label.as_str(), date.as_str(), y.to_string().as_str()])?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }
}
