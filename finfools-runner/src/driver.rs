//! Driver: the command surface over one database.
//!
//! The driver owns the database, the settings (load filters, sources) and
//! the base paths. Every command takes `&self`/`&mut self`; there is no
//! process-wide state.

use chrono::{Datelike, NaiveDate};
use finfools_core::edb::session::{read_session_meta, restore_session, save_session, SessionMeta};
use finfools_core::{run_ops, Edb, Entity, Matcher, Matches, OpError};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::{Paths, Settings};
use crate::error::DriverError;
use crate::loader::{fetch_range, load_range, FetchSummary, LoadSummary};
use crate::plot::{plot_series, Plotter};
use crate::rank::{rank, Order, RankMode, RankOptions, RankedEntity};
use crate::similarity::beta;
use crate::source::{DataSource, DataSrcType, FetchOptions};

/// Parse a date bound written as `YYYY`, `YYYYMM` or `YYYYMMDD`.
///
/// Missing parts default to January / day 1 for a start bound and to
/// December / the month's last day for an end bound. An end day of 31
/// clamps to the month's last day.
pub fn parse_date_bound(text: &str, is_end: bool) -> Result<NaiveDate, DriverError> {
    let bad = || DriverError::BadDate(text.to_string());
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let num = |range: std::ops::Range<usize>| text[range].parse::<u32>().map_err(|_| bad());
    let (year, month, day) = match text.len() {
        4 => (num(0..4)?, if is_end { 12 } else { 1 }, None),
        6 => (num(0..4)?, num(4..6)?, None),
        8 => (num(0..4)?, num(4..6)?, Some(num(6..8)?)),
        _ => return Err(bad()),
    };
    let year = i32::try_from(year).map_err(|_| bad())?;
    let last = last_day_of_month(year, month).ok_or_else(bad)?;
    let day = match day {
        Some(31) if is_end => last,
        Some(day) => day,
        None if is_end => last,
        None => 1,
    };
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(bad)
}

fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some(next.pred_opt()?.day())
}

pub struct Driver {
    paths: Paths,
    settings: Settings,
    edb: Option<Edb>,
}

impl Driver {
    /// Driver over `paths`, reading `finfools.toml` when present.
    pub fn new(paths: Paths) -> Result<Self, DriverError> {
        let settings = Settings::load_or_default(&paths.config_file())?;
        Ok(Self::with_settings(paths, settings))
    }

    pub fn with_settings(paths: Paths, settings: Settings) -> Self {
        Self {
            paths,
            settings,
            edb: None,
        }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn edb(&self) -> Result<&Edb, DriverError> {
        self.edb.as_ref().ok_or(DriverError::NoData)
    }

    pub fn edb_mut(&mut self) -> Result<&mut Edb, DriverError> {
        self.edb.as_mut().ok_or(DriverError::NoData)
    }

    /// Replace the in-memory database.
    pub fn set_edb(&mut self, edb: Edb) {
        self.edb = Some(edb);
    }

    fn sources(&self, src_type: DataSrcType) -> Result<Vec<Box<dyn DataSource>>, DriverError> {
        let sources: Vec<Box<dyn DataSource>> = self
            .settings
            .sources_for(src_type)
            .into_iter()
            .map(|cfg| cfg.build(&self.paths))
            .collect();
        if sources.is_empty() {
            return Err(DriverError::NoSource(src_type.to_string()));
        }
        Ok(sources)
    }

    /// Make sure snapshots exist for every day in the range.
    pub fn fetch(
        &mut self,
        start: &str,
        end: &str,
        src_type: DataSrcType,
        opts: FetchOptions,
    ) -> Result<FetchSummary, DriverError> {
        let start = parse_date_bound(start, false)?;
        let end = parse_date_bound(end, true)?;
        let mut sources = self.sources(src_type)?;
        let summary = fetch_range(&mut sources, start, end, opts);
        report_missing(&sources);
        Ok(summary)
    }

    /// Load the range into a fresh database, replacing the current one.
    ///
    /// `filter_name` overrides the active load filter for this load only.
    pub fn load(
        &mut self,
        start: &str,
        end: &str,
        src_type: Option<DataSrcType>,
        filter_name: Option<&str>,
        opts: FetchOptions,
    ) -> Result<LoadSummary, DriverError> {
        let start = parse_date_bound(start, false)?;
        let end = parse_date_bound(end, true)?;
        let src_type = src_type.unwrap_or(DataSrcType::Any);
        let filter = match filter_name {
            Some(name) => self
                .settings
                .filters
                .get(name)
                .ok_or_else(|| DriverError::UnknownFilter(name.to_string()))?,
            None => self.settings.filters.active(),
        }
        .compile()?;

        let configs = self.settings.sources_for(src_type);
        let mut keys = BTreeSet::new();
        for cfg in &configs {
            keys.extend(cfg.data_keys.iter().cloned());
        }
        let keys: Vec<String> = keys.into_iter().collect();
        let mut edb = Edb::new(
            self.settings.initial_entities,
            self.settings.initial_dates,
            &keys,
        )?;
        for cfg in &configs {
            for (alias, canonical) in &cfg.aliases {
                if edb.contains_key(alias) {
                    debug!(alias = alias.as_str(), source = cfg.name.as_str(), "alias shadowed by a data key");
                    continue;
                }
                edb.add_alias(alias, canonical)?;
            }
        }

        let mut sources = self.sources(src_type)?;
        let summary = load_range(&mut edb, &mut sources, start, end, &filter, opts);
        report_missing(&sources);
        self.edb = Some(edb);
        Ok(summary)
    }

    /// Entities whose names match `templates`, split by match quality.
    pub fn search<S: AsRef<str>>(
        &self,
        templates: &[S],
        partial_tokens: bool,
    ) -> Result<Matches<&Entity>, DriverError> {
        let matcher = Matcher::new(templates, partial_tokens)?;
        let edb = self.edb()?;
        Ok(matcher.split(edb.entities().iter(), |e| e.name.as_str()))
    }

    /// Run a batch of op strings; failing specs are logged and skipped.
    pub fn ops<S: AsRef<str>>(
        &mut self,
        specs: &[S],
    ) -> Result<Vec<Result<String, OpError>>, DriverError> {
        let edb = self.edb_mut()?;
        Ok(run_ops(edb, specs))
    }

    pub fn rank(
        &mut self,
        key: &str,
        mode: RankMode,
        order: Order,
        opts: &RankOptions,
    ) -> Result<Vec<RankedEntity>, DriverError> {
        let edb = self.edb_mut()?;
        Ok(rank(edb, key, mode, order, opts)?)
    }

    pub fn beta<S: AsRef<str>>(
        &self,
        key: &str,
        ref_code: &str,
        codes: &[S],
    ) -> Result<Vec<(String, f64)>, DriverError> {
        Ok(beta(self.edb()?, key, ref_code, codes)?)
    }

    pub fn plot<S: AsRef<str>>(
        &self,
        key: &str,
        codes: &[S],
        plotter: &mut dyn Plotter,
    ) -> Result<(), DriverError> {
        let edb = self.edb()?;
        let series = plot_series(edb, key, codes)?;
        plotter.plot(&series, edb.dates().dates())?;
        Ok(())
    }

    pub fn session_save(&self, name: &str) -> Result<PathBuf, DriverError> {
        Ok(save_session(self.edb()?, &self.paths.sessions_dir(), name)?)
    }

    /// Replace the database with the saved session. On failure the current
    /// database is kept.
    pub fn session_restore(&mut self, name: &str) -> Result<(), DriverError> {
        let edb = restore_session(&self.paths.sessions_dir(), name)?;
        self.edb = Some(edb);
        Ok(())
    }

    pub fn session_info(&self, name: &str) -> Result<SessionMeta, DriverError> {
        Ok(read_session_meta(&self.paths.sessions_dir(), name)?)
    }

    /// `(name, active)` for every configured load filter.
    pub fn list_filters(&self) -> Vec<(String, bool)> {
        let active = self.settings.filters.active_name();
        self.settings
            .filters
            .names()
            .into_iter()
            .map(|name| (name.to_string(), name == active))
            .collect()
    }

    pub fn set_active_filter(&mut self, name: &str) -> Result<(), DriverError> {
        if !self.settings.filters.set_active(name) {
            return Err(DriverError::UnknownFilter(name.to_string()));
        }
        info!(filter = name, "active load filter changed");
        Ok(())
    }

    /// Write the settings back to `finfools.toml`.
    pub fn save_settings(&self) -> Result<PathBuf, DriverError> {
        let path = self.paths.config_file();
        self.settings.save(&path)?;
        Ok(path)
    }
}

fn report_missing(sources: &[Box<dyn DataSource>]) {
    for source in sources {
        let missing = source.missing_dates();
        if !missing.is_empty() {
            warn!(source = source.name(), count = missing.len(), dates = ?missing, "dates with no usable data");
        }
    }
}
