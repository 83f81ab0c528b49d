//! Batch loading of a date range from one or more sources.
//!
//! Walks calendar days, lets every source load the day, then trims the
//! store and forward-fills holes. Per-date failures are logged and counted;
//! they never abort the batch.

use chrono::NaiveDate;
use finfools_core::{CompiledFilter, Edb};
use tracing::{info, warn};

use crate::source::{DataSource, FetchOptions, FetchStatus, LoadOutcome};

/// Counters of a [`load_range`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Days for which at least one source had data.
    pub days_loaded: usize,
    pub days_absent: usize,
    /// `(source, date)` pairs that failed every attempt.
    pub failures: usize,
    pub rows_ingested: usize,
    pub rows_dropped: usize,
    pub holes_filled: usize,
}

/// Counters of a [`fetch_range`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub fetched: usize,
    pub cached: usize,
    pub absent: usize,
    pub failures: usize,
}

fn days(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

/// Load every day in `[start, end]` into `edb`, then trim and hole-fill.
///
/// Days the database already covers are skipped.
pub fn load_range(
    edb: &mut Edb,
    sources: &mut [Box<dyn DataSource>],
    start: NaiveDate,
    end: NaiveDate,
    filter: &CompiledFilter,
    opts: FetchOptions,
) -> LoadSummary {
    let mut summary = LoadSummary::default();
    for date in days(start, end) {
        if edb.last_date().is_some_and(|last| date <= last) {
            continue;
        }
        let mut any = false;
        for source in sources.iter_mut() {
            match source.load_for_date(date, edb, filter, opts) {
                Ok(LoadOutcome::Loaded { entities, dropped }) => {
                    any = true;
                    summary.rows_ingested += entities;
                    summary.rows_dropped += dropped;
                }
                Ok(LoadOutcome::Absent) => {}
                Err(e) => {
                    warn!(source = source.name(), %date, error = %e, "date skipped");
                    summary.failures += 1;
                }
            }
        }
        if any {
            summary.days_loaded += 1;
        } else {
            summary.days_absent += 1;
        }
    }
    edb.optimise_size();
    summary.holes_filled = edb.fill_holes();
    info!(
        days = summary.days_loaded,
        entities = edb.shape().0,
        failures = summary.failures,
        dropped = summary.rows_dropped,
        "load complete"
    );
    summary
}

/// Make sure every source has a snapshot for every day in `[start, end]`.
pub fn fetch_range(
    sources: &mut [Box<dyn DataSource>],
    start: NaiveDate,
    end: NaiveDate,
    opts: FetchOptions,
) -> FetchSummary {
    let mut summary = FetchSummary::default();
    for date in days(start, end) {
        for source in sources.iter_mut() {
            match source.fetch_for_date(date, opts) {
                Ok(FetchStatus::Fetched) => summary.fetched += 1,
                Ok(FetchStatus::Cached) => summary.cached += 1,
                Ok(FetchStatus::Absent) => summary.absent += 1,
                Err(e) => {
                    warn!(source = source.name(), %date, error = %e, "fetch failed");
                    source.record_missing(date);
                    summary.failures += 1;
                }
            }
        }
    }
    info!(
        fetched = summary.fetched,
        cached = summary.cached,
        failures = summary.failures,
        "fetch complete"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_are_inclusive() {
        let start = NaiveDate::from_ymd_opt(2020, 2, 27).unwrap();
        let end = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        assert_eq!(days(start, end).count(), 4);
        assert_eq!(days(end, start).count(), 0);
    }
}
