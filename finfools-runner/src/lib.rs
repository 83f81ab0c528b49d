//! finfools runner: everything that orchestrates the core database.
//!
//! This crate builds on `finfools-core` to provide:
//! - Per-day data sources with marker-checked snapshots and retrying loads
//! - Batch loading of a date range (load, trim, hole-fill)
//! - Selection/ranking over data keys and operator metadata
//! - Beta of entities against a reference entity
//! - Plot series extraction behind a `Plotter` trait
//! - Settings (`finfools.toml`), base paths and the driver command surface

pub mod config;
pub mod driver;
pub mod error;
pub mod loader;
pub mod plot;
pub mod rank;
pub mod similarity;
pub mod source;

pub use config::{Paths, Settings, SourceConfig, BASE_ENV};
pub use driver::{parse_date_bound, Driver};
pub use error::{ConfigError, DriverError, IngestError, PlotError, RankError};
pub use loader::{fetch_range, load_range, FetchSummary, LoadSummary};
pub use plot::{plot_series, CsvPlotter, PlotSeries, Plotter};
pub use rank::{rank, Order, RankMode, RankOptions, RankedEntity};
pub use similarity::beta;
pub use source::{
    CsvDirSource, DataSource, DataSrcType, FetchOptions, FetchStatus, LoadOutcome, Snapshot,
};
