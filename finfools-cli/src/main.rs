//! finfools CLI: fetch, load, derive, rank and persist entity time series.
//!
//! Commands:
//! - `fetch`: make sure per-day snapshots exist for a date range
//! - `load`: load a date range into a fresh database
//! - `search`: list entities whose names match templates
//! - `ops`: run operator specs such as `roll365_retpa(data)`
//! - `rank`: top/bottom entities of a data key
//! - `beta`: beta of entities against a reference entity
//! - `plot`: write series as CSV
//! - `session save|restore|info`: persist the database
//! - `filters list|activate`: manage load filters
//!
//! State carries between invocations through `--session NAME`: the session
//! is restored before the command and saved after commands that change it.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use finfools_runner::{
    parse_date_bound, CsvPlotter, DataSrcType, Driver, FetchOptions, Order, Paths, RankMode,
    RankOptions,
};

#[derive(Parser)]
#[command(name = "finfools", about = "finfools: entity time-series analysis")]
struct Cli {
    /// Base directory. Defaults to $FINFOOLSERRAND_BASE, then ./data.
    #[arg(long, global = true)]
    base: Option<PathBuf>,

    /// Session restored before the command and saved after it.
    #[arg(long, global = true)]
    session: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct RangeArgs {
    /// Start date: YYYY, YYYYMM or YYYYMMDD.
    #[arg(long)]
    start: String,

    /// End date: YYYY, YYYYMM or YYYYMMDD.
    #[arg(long)]
    end: String,

    /// Source type: mf, stock or any.
    #[arg(long, default_value = "any")]
    src_type: String,

    /// Always consult the source endpoint.
    #[arg(long, default_value_t = false)]
    remote: bool,

    /// Never consult the source endpoint.
    #[arg(long, default_value_t = false)]
    local: bool,
}

impl RangeArgs {
    fn src_type(&self) -> Result<DataSrcType> {
        self.src_type.parse().map_err(anyhow::Error::msg)
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            force_remote: self.remote,
            force_local: self.local,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Make sure per-day snapshots exist for a date range.
    Fetch {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Load a date range into a fresh database.
    Load {
        #[command(flatten)]
        range: RangeArgs,

        /// Load filter to apply instead of the active one.
        #[arg(long)]
        filter: Option<String>,
    },
    /// List entities whose names match the templates.
    Search {
        #[arg(required = true)]
        templates: Vec<String>,

        /// Match tokens as substrings.
        #[arg(long, default_value_t = false)]
        partial: bool,
    },
    /// Run operator specs, e.g. `srel(data)` or `r = roll365_retpa(nav[20200101:])`.
    Ops {
        #[arg(required = true)]
        specs: Vec<String>,
    },
    /// Rank entities of a data key.
    Rank {
        key: String,

        /// normal, srel_absret, srel_retpa, roll_avg, block_ranked or block_avg.
        #[arg(long, default_value = "normal")]
        mode: String,

        /// top or bottom.
        #[arg(long, default_value = "top")]
        order: String,

        /// Column date for normal mode (YYYYMMDD).
        #[arg(long)]
        date: Option<String>,

        /// Column index for normal mode.
        #[arg(long)]
        index: Option<usize>,

        #[arg(short = 'n', long, default_value_t = 10)]
        num: usize,

        /// Restrict to these entity codes.
        #[arg(long, num_args = 1..)]
        codes: Option<Vec<String>>,

        /// Minimum years of data.
        #[arg(long, default_value_t = 0.0)]
        min_years: f64,

        /// Only entities that reported recently.
        #[arg(long, default_value_t = false)]
        only_current: bool,
    },
    /// Beta of entities against a reference entity.
    Beta {
        key: String,

        #[arg(long)]
        reference: String,

        /// Entities to compare; all when omitted.
        codes: Vec<String>,
    },
    /// Write series of a data key as CSV.
    Plot {
        key: String,

        #[arg(required = true)]
        codes: Vec<String>,

        /// Output file. Defaults to stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Session management.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Load filter management.
    Filters {
        #[command(subcommand)]
        action: FilterAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Save the database under a name.
    Save { name: String },
    /// Replace the database with a saved session.
    Restore { name: String },
    /// Show a saved session's sidecar.
    Info { name: String },
}

#[derive(Subcommand)]
enum FilterAction {
    /// List configured load filters.
    List,
    /// Make a filter active and write it to finfools.toml.
    Activate { name: String },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let paths = cli.base.clone().map_or_else(Paths::from_env, Paths::new);
    let mut driver = Driver::new(paths).context("reading settings")?;

    let needs_data = !matches!(
        cli.command,
        Commands::Fetch { .. }
            | Commands::Load { .. }
            | Commands::Session { .. }
            | Commands::Filters { .. }
    );
    if let Some(name) = cli.session.as_deref() {
        if needs_data {
            driver
                .session_restore(name)
                .with_context(|| format!("restoring session '{name}'"))?;
        }
    }

    let changed = run_command(&mut driver, cli.command)?;

    if let (Some(name), true) = (cli.session.as_deref(), changed) {
        let path = driver.session_save(name)?;
        info!(session = name, path = %path.display(), "session saved");
    }
    Ok(())
}

/// Run one command. Returns whether the database changed.
fn run_command(driver: &mut Driver, command: Commands) -> Result<bool> {
    let mut out = io::stdout().lock();
    match command {
        Commands::Fetch { range } => {
            let summary = driver.fetch(
                &range.start,
                &range.end,
                range.src_type()?,
                range.fetch_options(),
            )?;
            writeln!(
                out,
                "fetched {} cached {} absent {} failed {}",
                summary.fetched, summary.cached, summary.absent, summary.failures
            )?;
            Ok(false)
        }
        Commands::Load { range, filter } => {
            let summary = driver.load(
                &range.start,
                &range.end,
                Some(range.src_type()?),
                filter.as_deref(),
                range.fetch_options(),
            )?;
            let (entities, dates) = driver.edb()?.shape();
            writeln!(
                out,
                "loaded {} days ({} absent, {} failed): {entities} entities x {dates} dates, {} dropped by filter",
                summary.days_loaded, summary.days_absent, summary.failures, summary.rows_dropped
            )?;
            Ok(true)
        }
        Commands::Search { templates, partial } => {
            let matches = driver.search(&templates, partial)?;
            for (kind, list) in [("full", &matches.full), ("partial", &matches.partial)] {
                writeln!(out, "{kind} matches: {}", list.len())?;
                for e in list.iter() {
                    writeln!(out, "  {:<12} {}", e.code, e.name)?;
                }
            }
            Ok(false)
        }
        Commands::Ops { specs } => {
            let results = driver.ops(&specs)?;
            let mut failed = 0;
            for (spec, result) in specs.iter().zip(results) {
                match result {
                    Ok(key) => writeln!(out, "{spec} -> {key}")?,
                    Err(e) => {
                        failed += 1;
                        writeln!(out, "{spec} -> error: {e}")?;
                    }
                }
            }
            if failed == specs.len() {
                bail!("every op failed");
            }
            Ok(true)
        }
        Commands::Rank {
            key,
            mode,
            order,
            date,
            index,
            num,
            codes,
            min_years,
            only_current,
        } => {
            let mode: RankMode = mode.parse().map_err(anyhow::Error::msg)?;
            let order: Order = order.parse().map_err(anyhow::Error::msg)?;
            if min_years < 0.0 {
                bail!("--min-years must not be negative");
            }
            let opts = RankOptions {
                the_date: date
                    .as_deref()
                    .map(|d| parse_date_bound(d, false))
                    .transpose()?,
                the_index: index,
                num_entities: num,
                ent_codes: codes,
                min_data_years: min_years,
                only_current,
            };
            let ranked = driver.rank(&key, mode, order, &opts)?;
            write!(out, "{:>4}  {:<12} {:<48} {:>12}", "#", "code", "name", mode.as_str())?;
            for name in mode.extra_names() {
                write!(out, " {name:>12}")?;
            }
            writeln!(out)?;
            for (i, r) in ranked.iter().enumerate() {
                write!(out, "{:>4}  {:<12} {:<48} {:>12.2}", i + 1, r.code, r.name, r.score)?;
                for v in &r.extra {
                    write!(out, " {v:>12.2}")?;
                }
                writeln!(out)?;
            }
            // min_years may have stored an srel.
            Ok(min_years > 0.0)
        }
        Commands::Beta {
            key,
            reference,
            codes,
        } => {
            for (code, beta) in driver.beta(&key, &reference, &codes)? {
                writeln!(out, "{code:<12} {beta:>8.3}")?;
            }
            Ok(false)
        }
        Commands::Plot { key, codes, out: path } => {
            match path {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    driver.plot(&key, &codes, &mut CsvPlotter::new(file))?;
                }
                None => driver.plot(&key, &codes, &mut CsvPlotter::new(&mut out))?,
            }
            Ok(false)
        }
        Commands::Session { action } => match action {
            SessionAction::Save { name } => {
                let path = driver.session_save(&name)?;
                writeln!(out, "saved {}", path.display())?;
                Ok(false)
            }
            SessionAction::Restore { name } => {
                driver.session_restore(&name)?;
                let (entities, dates) = driver.edb()?.shape();
                writeln!(out, "restored '{name}': {entities} entities x {dates} dates")?;
                Ok(true)
            }
            SessionAction::Info { name } => {
                let meta = driver.session_info(&name)?;
                writeln!(
                    out,
                    "{}: {} entities x {} dates, {:?}..{:?}, saved {}",
                    meta.name, meta.entities, meta.dates, meta.first_date, meta.last_date, meta.saved_at
                )?;
                writeln!(out, "keys: {}", meta.keys.join(", "))?;
                Ok(false)
            }
        },
        Commands::Filters { action } => {
            match action {
                FilterAction::List => {
                    for (name, active) in driver.list_filters() {
                        writeln!(out, "{} {name}", if active { "*" } else { " " })?;
                    }
                }
                FilterAction::Activate { name } => {
                    driver.set_active_filter(&name)?;
                    let path = driver.save_settings()?;
                    writeln!(out, "active filter '{name}' written to {}", path.display())?;
                }
            }
            Ok(false)
        }
    }
}
