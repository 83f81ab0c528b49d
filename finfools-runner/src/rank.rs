//! Selection: rank entities by a per-entity score read from the database.
//!
//! Scores come either from one column of a data key (`normal`) or from the
//! metadata an operator left behind. Rows that fail a filter are pushed to a
//! sentinel (`-inf` for top, `+inf` for bottom) and never reach the result.

use chrono::NaiveDate;
use finfools_core::ops::{block::ranked_scores, ensure_srel};
use finfools_core::{DerivedMeta, Edb};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::RankError;

/// Columns an entity may lag the end of the store and still count as current.
pub const CURRENT_WINDOW: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMode {
    Normal,
    SrelAbsret,
    SrelRetpa,
    RollAvg,
    BlockRanked,
    BlockAvg,
}

impl RankMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::SrelAbsret => "srel_absret",
            Self::SrelRetpa => "srel_retpa",
            Self::RollAvg => "roll_avg",
            Self::BlockRanked => "block_ranked",
            Self::BlockAvg => "block_avg",
        }
    }

    /// Names of the extra columns each record carries.
    pub fn extra_names(self) -> &'static [&'static str] {
        match self {
            Self::Normal => &[],
            Self::SrelAbsret => &["retpa", "years"],
            Self::SrelRetpa => &["absret", "years"],
            Self::RollAvg => &["std", "pct_below", "ma_sharpe", "years"],
            Self::BlockRanked => &["blocks_ranked"],
            Self::BlockAvg => &["valid_blocks", "mean_std"],
        }
    }
}

impl fmt::Display for RankMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Normal,
            Self::SrelAbsret,
            Self::SrelRetpa,
            Self::RollAvg,
            Self::BlockRanked,
            Self::BlockAvg,
        ]
        .into_iter()
        .find(|m| m.as_str() == s)
        .ok_or_else(|| format!("unknown rank mode '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    Top,
    Bottom,
}

impl Order {
    fn sentinel(self) -> f64 {
        match self {
            Self::Top => f64::NEG_INFINITY,
            Self::Bottom => f64::INFINITY,
        }
    }
}

impl FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top" => Ok(Self::Top),
            "bottom" => Ok(Self::Bottom),
            other => Err(format!("unknown order '{other}' (top, bottom)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankOptions {
    /// Column for `normal` mode, resolved to an index.
    pub the_date: Option<NaiveDate>,
    /// Column for `normal` mode; wins over `the_date`.
    pub the_index: Option<usize>,
    pub num_entities: usize,
    pub ent_codes: Option<Vec<String>>,
    pub min_data_years: f64,
    pub only_current: bool,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            the_date: None,
            the_index: None,
            num_entities: 10,
            ent_codes: None,
            min_data_years: 0.0,
            only_current: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntity {
    pub code: String,
    pub name: String,
    pub score: f64,
    pub extra: Vec<f64>,
}

/// Rank the entities of `key` and return up to `num_entities` records.
///
/// Takes `&mut Edb` because the `min_data_years` filter may have to compute
/// the base key's `srel` first.
pub fn rank(
    edb: &mut Edb,
    key: &str,
    mode: RankMode,
    order: Order,
    opts: &RankOptions,
) -> Result<Vec<RankedEntity>, RankError> {
    let years = if opts.min_data_years > 0.0 {
        let srel_key = ensure_srel(edb, key)?;
        edb.meta(&srel_key).map(|m| m.column(2))
    } else {
        None
    };
    let edb = &*edb;

    let (mut scores, extras) = mode_scores(edb, key, mode, opts)?;
    let sentinel = order.sentinel();
    for s in scores.iter_mut().filter(|s| !s.is_finite()) {
        *s = sentinel;
    }

    if let Some(codes) = &opts.ent_codes {
        let mut keep = HashSet::new();
        for code in codes {
            match edb.row_of(code) {
                Ok(row) => {
                    keep.insert(row);
                }
                Err(_) => warn!(code = code.as_str(), "requested entity not in database"),
            }
        }
        for (row, s) in scores.iter_mut().enumerate() {
            if !keep.contains(&row) {
                *s = sentinel;
            }
        }
    }

    if let Some(years) = years {
        for (s, y) in scores.iter_mut().zip(&years) {
            if !(*y >= opts.min_data_years) {
                *s = sentinel;
            }
        }
    }

    if opts.only_current {
        let end = edb.shape().1.saturating_sub(1);
        for (row, s) in scores.iter_mut().enumerate() {
            let current = edb
                .entity(row)
                .and_then(|e| e.last_seen)
                .is_some_and(|last| last + CURRENT_WINDOW >= end);
            if !current {
                *s = sentinel;
            }
        }
    }

    let mut idx: Vec<usize> = (0..scores.len()).collect();
    idx.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));
    if order == Order::Top {
        idx.reverse();
    }

    let ranked: Vec<RankedEntity> = idx
        .into_iter()
        .take_while(|&row| scores[row] != sentinel)
        .filter_map(|row| {
            edb.entity(row).map(|e| RankedEntity {
                code: e.code.clone(),
                name: e.name.clone(),
                score: scores[row],
                extra: extras.get(row).cloned().unwrap_or_default(),
            })
        })
        .take(opts.num_entities)
        .collect();

    if ranked.len() < opts.num_entities {
        warn!(
            key,
            mode = mode.as_str(),
            requested = opts.num_entities,
            found = ranked.len(),
            "fewer candidates than requested"
        );
    }
    debug!(key, mode = mode.as_str(), returned = ranked.len(), "ranked");
    Ok(ranked)
}

fn derived<'a>(edb: &'a Edb, key: &str, mode: RankMode) -> Result<&'a DerivedMeta, RankError> {
    let wrong = |tag: &str| RankError::WrongMode {
        key: key.to_string(),
        mode: mode.to_string(),
        tag: tag.to_string(),
    };
    let meta = match edb.meta(key) {
        Some(meta) => meta,
        None if edb.contains_key(key) => return Err(wrong("base data")),
        None => return Err(finfools_core::EdbError::UnknownKey(key.to_string()).into()),
    };
    let fits = match mode {
        RankMode::Normal => true,
        RankMode::SrelAbsret | RankMode::SrelRetpa => meta.tag == "srel" || meta.tag == "rel",
        RankMode::RollAvg => meta.tag.starts_with("roll"),
        RankMode::BlockRanked | RankMode::BlockAvg => meta.blocks.is_some(),
    };
    if fits {
        Ok(meta)
    } else {
        Err(wrong(&meta.tag))
    }
}

/// Per-row score and extras for `mode`.
fn mode_scores(
    edb: &Edb,
    key: &str,
    mode: RankMode,
    opts: &RankOptions,
) -> Result<(Vec<f64>, Vec<Vec<f64>>), RankError> {
    let columns = |meta: &DerivedMeta, score: usize, extra: &[usize]| {
        let scores = meta.column(score);
        let extra_cols: Vec<Vec<f64>> = extra.iter().map(|&c| meta.column(c)).collect();
        let extras = (0..scores.len())
            .map(|row| extra_cols.iter().map(|c| c[row]).collect())
            .collect();
        (scores, extras)
    };

    Ok(match mode {
        RankMode::Normal => {
            let data = edb.data(key)?;
            let col = normal_column(edb, key, opts)?;
            let scores = data.column(col).to_vec();
            let extras = vec![Vec::new(); scores.len()];
            (scores, extras)
        }
        RankMode::SrelAbsret => columns(derived(edb, key, mode)?, 0, &[1, 2]),
        RankMode::SrelRetpa => columns(derived(edb, key, mode)?, 1, &[0, 2]),
        RankMode::RollAvg => columns(derived(edb, key, mode)?, 0, &[1, 2, 3, 4]),
        RankMode::BlockAvg => columns(derived(edb, key, mode)?, 1, &[0, 2]),
        RankMode::BlockRanked => {
            let meta = derived(edb, key, mode)?;
            let stats = meta.blocks.as_ref().ok_or_else(|| RankError::WrongMode {
                key: key.to_string(),
                mode: mode.to_string(),
                tag: meta.tag.clone(),
            })?;
            ranked_scores(stats)
                .into_iter()
                .map(|(score, n)| (score, vec![n as f64]))
                .unzip()
        }
    })
}

/// Column `normal` mode reads: the explicit index, the explicit date, or the
/// latest column holding any finite non-zero value.
fn normal_column(edb: &Edb, key: &str, opts: &RankOptions) -> Result<usize, RankError> {
    let data = edb.data(key)?;
    let cols = data.ncols();
    let col = match (opts.the_index, opts.the_date) {
        (Some(col), _) => col,
        (None, Some(date)) => edb.col_of(date)?,
        (None, None) => {
            return (0..cols)
                .rev()
                .find(|&c| data.column(c).iter().any(|v| v.is_finite() && *v != 0.0))
                .ok_or_else(|| RankError::NoColumn(key.to_string()));
        }
    };
    if col >= cols {
        return Err(RankError::ColumnOutOfRange {
            key: key.to_string(),
            col,
            cols,
        });
    }
    Ok(col)
}
