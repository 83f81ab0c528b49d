//! Boundary scenarios for ranking and filtered ingestion.
//!
//! Tests:
//! 1. Normal ranking at a fixed column, with the hole-filled tie-break made explicit
//! 2. Type white list drops every other entity at ingestion
//! 3. Ranking shortfall returns a shorter list

use chrono::NaiveDate;
use finfools_core::{ymd_to_date, Edb, LoadFilter};
use finfools_runner::source::ingest_snapshot;
use finfools_runner::{rank, Order, RankMode, RankOptions, RankedEntity, Snapshot};

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn d(ymd: u32) -> NaiveDate {
    ymd_to_date(ymd).unwrap()
}

/// Capacity 4×8, key `data`, `A → [10, 0, 12]`, `B → [20, 22, 0]`.
fn seeded() -> Edb {
    let mut edb = Edb::new(4, 8, &["data"]).unwrap();
    let t = edb.add_type("open equity");
    edb.add_entity("A", Some("A"), t).unwrap();
    edb.add_entity("B", Some("B"), t).unwrap();
    for (date, a, b) in [
        (20200101, 10.0, 20.0),
        (20200102, 0.0, 22.0),
        (20200106, 12.0, 0.0),
    ] {
        edb.add_date(d(date)).unwrap();
        edb.add_data("A", &[("data", a)], None, None).unwrap();
        edb.add_data("B", &[("data", b)], None, None).unwrap();
    }
    edb.optimise_size();
    edb.fill_holes();
    edb
}

fn codes(ranked: &[RankedEntity]) -> Vec<&str> {
    ranked.iter().map(|e| e.code.as_str()).collect()
}

fn at_column_two(num_entities: usize) -> RankOptions {
    RankOptions {
        the_index: Some(2),
        num_entities,
        ..Default::default()
    }
}

// ──────────────────────────────────────────────
// 1. Normal ranking at column 2
// ──────────────────────────────────────────────

#[test]
fn normal_rank_at_fixed_column() {
    let mut edb = seeded();

    // Hole-fill carries B's 22 into column 2, so B leads the top list.
    let top = rank(&mut edb, "data", RankMode::Normal, Order::Top, &at_column_two(1)).unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!((top[0].code.as_str(), top[0].score), ("B", 22.0));

    // With B excluded, A is the only candidate.
    let opts = RankOptions {
        ent_codes: Some(vec!["A".into()]),
        ..at_column_two(1)
    };
    let top = rank(&mut edb, "data", RankMode::Normal, Order::Top, &opts).unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].code, "A");
    assert_eq!(top[0].name, "A");
    assert_eq!(top[0].score, 12.0);

    let bottom = rank(&mut edb, "data", RankMode::Normal, Order::Bottom, &at_column_two(1)).unwrap();
    assert_eq!((bottom[0].code.as_str(), bottom[0].score), ("A", 12.0));
}

#[test]
fn ties_keep_insertion_order_from_the_bottom() {
    let mut edb = Edb::new(3, 2, &["data"]).unwrap();
    let t = edb.add_type("open equity");
    edb.add_date(d(20200101)).unwrap();
    for code in ["X", "Y", "Z"] {
        edb.add_data(code, &[("data", 5.0)], Some(code), Some(t)).unwrap();
    }
    let opts = RankOptions {
        the_index: Some(0),
        num_entities: 3,
        ..Default::default()
    };
    let bottom = rank(&mut edb, "data", RankMode::Normal, Order::Bottom, &opts).unwrap();
    let top = rank(&mut edb, "data", RankMode::Normal, Order::Top, &opts).unwrap();
    assert_eq!(codes(&bottom), vec!["X", "Y", "Z"]);
    assert_eq!(codes(&top), vec!["Z", "Y", "X"]);
}

// ──────────────────────────────────────────────
// 2. Type white list
// ──────────────────────────────────────────────

#[test]
fn white_listed_types_only() {
    let mut snap = Snapshot::new(d(20210104), vec!["nav".into()]);
    snap.push("1", "Alpha Growth", "open equity", vec![10.0]);
    snap.push("2", "Beta Income", "open debt", vec![11.0]);
    snap.push("3", "Gamma Close", "close equity", vec![12.0]);
    snap.push("4", "Delta Value", "Open Equity", vec![13.0]);

    let filter = LoadFilter {
        white_list_types: Some(vec!["open equity".into()]),
        ..Default::default()
    }
    .compile()
    .unwrap();
    let mut edb = Edb::new(4, 4, &["nav"]).unwrap();
    let (kept, dropped) = ingest_snapshot(&mut edb, &snap, &filter).unwrap();
    assert_eq!((kept, dropped), (2, 2));

    let codes: Vec<&str> = edb.entities().iter().map(|e| e.code.as_str()).collect();
    assert_eq!(codes, vec!["1", "4"]);
    assert!(edb.row_of("2").is_err());
    assert!(edb.row_of("3").is_err());
}

// ──────────────────────────────────────────────
// 3. Shortfall
// ──────────────────────────────────────────────

#[test]
fn shortfall_returns_fewer_records() {
    let mut edb = seeded();
    let top = rank(&mut edb, "data", RankMode::Normal, Order::Top, &at_column_two(5)).unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].code, "B");
    assert_eq!(top[1].code, "A");
}
