//! Integration tests for the runner's data pipeline.
//!
//! A temporary base directory holds `finfools.toml` and per-day raw CSV
//! files; the driver fetches, loads, derives, ranks, plots and persists.
//!
//! Tests:
//! 1. Load filter keeps only whitelisted types
//! 2. Weekends and holidays add no columns; a bad day is skipped
//! 3. Fetch writes snapshots that a local-only load can use
//! 4. Ops, rank and plot on the loaded store
//! 5. Session save/restore through the driver

use chrono::NaiveDate;
use finfools_runner::{
    CsvPlotter, DataSrcType, Driver, FetchOptions, Order, Paths, RankMode, RankOptions,
};
use std::fs;
use std::path::Path;

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

const CONFIG: &str = r#"
active_filter = "equity"

[filters.equity]
white_list_types = ["open equity"]

[[sources]]
name = "amfi"
src_type = "mf"
data_keys = ["nav"]
aliases = { data = "nav" }
"#;

fn write_day(base: &Path, ymd: &str, rows: &[&str]) {
    let dir = base.join("raw").join("amfi");
    fs::create_dir_all(&dir).unwrap();
    let mut body = String::from("code,name,type,nav\n");
    for row in rows {
        body.push_str(row);
        body.push('\n');
    }
    fs::write(dir.join(format!("{ymd}.csv")), body).unwrap();
}

/// Three trading days in the first week of 2021.
fn setup(base: &Path) -> Driver {
    fs::write(base.join("finfools.toml"), CONFIG).unwrap();
    write_day(
        base,
        "20210104",
        &[
            "100,Alpha Equity Fund,open equity,10",
            "200,Beta Debt Fund,open debt,20",
            "300,Gamma Equity Fund,open equity,30",
        ],
    );
    write_day(
        base,
        "20210105",
        &[
            "100,Alpha Equity Fund,open equity,11",
            "200,Beta Debt Fund,open debt,20.5",
        ],
    );
    write_day(
        base,
        "20210106",
        &[
            "100,Alpha Equity Fund,open equity,12",
            "200,Beta Debt Fund,open debt,21",
            "300,Gamma Equity Fund,open equity,33",
        ],
    );
    Driver::new(Paths::new(base)).unwrap()
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

// ──────────────────────────────────────────────
// 1. Load filter
// ──────────────────────────────────────────────

#[test]
fn load_filter_keeps_whitelisted_types() {
    let dir = tempfile::tempdir().unwrap();
    let mut driver = setup(dir.path());
    let summary = driver
        .load("20210101", "20210110", None, None, FetchOptions::default())
        .unwrap();
    assert_eq!(summary.rows_dropped, 3);

    let edb = driver.edb().unwrap();
    assert_eq!(edb.shape(), (2, 3));
    assert!(edb.row_of("200").is_err());
    let nav = edb.data("nav").unwrap();
    let gamma = edb.row_of("300").unwrap();
    assert_eq!(nav.row(gamma).to_vec(), vec![30.0, 30.0, 33.0]);
    assert_eq!(edb.data("data").unwrap(), nav);
    assert!(edb
        .entities()
        .iter()
        .all(|e| edb.type_name(e.type_id) == Some("open equity")));
}

#[test]
fn explicit_filter_overrides_active() {
    let dir = tempfile::tempdir().unwrap();
    let mut driver = setup(dir.path());
    driver
        .load("20210104", "20210106", Some(DataSrcType::Mf), Some("none"), FetchOptions::default())
        .unwrap();
    assert_eq!(driver.edb().unwrap().shape(), (3, 3));

    let err = driver
        .load("20210104", "20210106", None, Some("nope"), FetchOptions::default())
        .unwrap_err();
    assert!(err.to_string().contains("nope"));
}

// ──────────────────────────────────────────────
// 2. Calendar walk
// ──────────────────────────────────────────────

#[test]
fn absent_days_add_no_columns_and_bad_days_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut driver = setup(dir.path());
    // 2021-01-07 exists but has a broken header.
    let raw = dir.path().join("raw").join("amfi").join("20210107.csv");
    fs::write(raw, "id;nav\n100;13\n").unwrap();

    let summary = driver
        .load("202101", "202101", None, None, FetchOptions::default())
        .unwrap();
    assert_eq!(summary.days_loaded, 3);
    assert_eq!(summary.failures, 1);
    assert_eq!(summary.days_absent, 28);

    let edb = driver.edb().unwrap();
    assert_eq!(
        edb.dates().dates(),
        &[d(2021, 1, 4), d(2021, 1, 5), d(2021, 1, 6)]
    );
}

// ──────────────────────────────────────────────
// 3. Fetch then local load
// ──────────────────────────────────────────────

#[test]
fn fetched_snapshots_serve_local_loads() {
    let dir = tempfile::tempdir().unwrap();
    let mut driver = setup(dir.path());
    let fetched = driver
        .fetch("20210104", "20210106", DataSrcType::Mf, FetchOptions::default())
        .unwrap();
    assert_eq!(fetched.fetched, 3);
    assert!(dir
        .path()
        .join("snapshots")
        .join("amfi")
        .join("20210105.snap")
        .exists());

    // Raw files gone: only the snapshots remain.
    fs::remove_dir_all(dir.path().join("raw")).unwrap();
    driver
        .load("20210104", "20210106", None, None, FetchOptions::local())
        .unwrap();
    assert_eq!(driver.edb().unwrap().shape(), (2, 3));
}

// ──────────────────────────────────────────────
// 4. Ops, rank, plot
// ──────────────────────────────────────────────

#[test]
fn derive_rank_and_plot() {
    let dir = tempfile::tempdir().unwrap();
    let mut driver = setup(dir.path());
    driver
        .load("20210104", "20210106", None, None, FetchOptions::default())
        .unwrap();

    let results = driver.ops(&["s = srel(data)", "bogus(data)", "m = mas2(nav)"]).unwrap();
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    assert!(results[2].is_ok());

    let top = driver
        .rank("s", RankMode::SrelAbsret, Order::Top, &RankOptions::default())
        .unwrap();
    let codes: Vec<&str> = top.iter().map(|r| r.code.as_str()).collect();
    assert_eq!(codes, vec!["100", "300"]);
    assert!((top[0].score - 20.0).abs() < 1e-9);
    assert_eq!(top[0].name, "Alpha Equity Fund");

    let mut plotter = CsvPlotter::new(Vec::new());
    driver.plot("nav", &["100"], &mut plotter).unwrap();
    let text = String::from_utf8(plotter.into_inner().unwrap()).unwrap();
    assert!(text.contains("Alpha Equity Fund,2021-01-06,12"));

    let betas = driver.beta("nav", "100", &["300"]).unwrap();
    assert!(betas[0].1.is_finite());
}

// ──────────────────────────────────────────────
// 5. Sessions
// ──────────────────────────────────────────────

#[test]
fn session_round_trip_through_driver() {
    let dir = tempfile::tempdir().unwrap();
    let mut driver = setup(dir.path());
    driver
        .load("20210104", "20210106", None, None, FetchOptions::default())
        .unwrap();
    driver.ops(&["r = roll1(nav)"]).unwrap();
    driver.session_save("week1").unwrap();
    let info = driver.session_info("week1").unwrap();
    assert_eq!((info.entities, info.dates), (2, 3));

    let mut other = Driver::new(Paths::new(dir.path())).unwrap();
    assert!(other.session_restore("missing").is_err());
    assert!(other.edb().is_err());
    other.session_restore("week1").unwrap();

    let a = driver.edb().unwrap();
    let b = other.edb().unwrap();
    assert_eq!(a.data("r").unwrap().shape(), b.data("r").unwrap().shape());
    assert_eq!(a.meta("r"), b.meta("r"));
    assert_eq!(a.entities(), b.entities());
}
