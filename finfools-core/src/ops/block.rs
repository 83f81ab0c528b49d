//! Blocked statistics: `block<N>`.
//!
//! Columns `cs..=ce` are cut into whole blocks of `N` aligned to `ce`; the
//! oldest partial block is dropped. Each block gets a mean, a population
//! std and five-point quantiles over its finite values.

use ndarray::{s, Array2, Array3, ArrayView1};
use rayon::prelude::*;

use super::stats::{digitize_right, finite_mean_std, five_point};
use super::OpOutput;
use crate::edb::BlockStats;

struct BlockRow {
    avgs: Vec<f64>,
    stds: Vec<f64>,
    qntls: Vec<[f64; 5]>,
}

fn block_row(src: ArrayView1<'_, f64>, window: usize, first_col: usize, blocks: usize) -> BlockRow {
    let mut row = BlockRow {
        avgs: Vec::with_capacity(blocks),
        stds: Vec::with_capacity(blocks),
        qntls: Vec::with_capacity(blocks),
    };
    for b in 0..blocks {
        let from = first_col + b * window;
        let cells = src.slice(s![from..from + window]);
        let (_, avg, std) = finite_mean_std(cells.iter().copied());
        row.avgs.push(avg);
        row.stds.push(std);
        row.qntls.push(five_point(cells.iter().copied()));
    }
    row
}

/// Number of whole blocks and the first column of the oldest one.
pub fn layout(window: usize, cs: usize, ce: usize) -> (usize, usize) {
    if window == 0 || ce < cs {
        return (0, ce + 1);
    }
    let blocks = (ce - cs + 1) / window;
    (blocks, ce + 1 - blocks * window)
}

/// Run `block<N>`. The caller guarantees at least one whole block fits.
///
/// The primary matrix holds each block's mean over the block's columns.
/// MetaData: `[validBlocks, meanOfBlockAvgs, meanOfBlockStds]`.
pub fn block(src: &Array2<f64>, window: usize, cs: usize, ce: usize) -> OpOutput {
    let (rows, cols) = src.dim();
    let (blocks, first_col) = layout(window, cs, ce);

    let per_row: Vec<BlockRow> = (0..rows)
        .into_par_iter()
        .map(|r| block_row(src.row(r), window, first_col, blocks))
        .collect();

    let mut data = Array2::from_elem((rows, cols), f64::NAN);
    let mut meta = Array2::from_elem((rows, 3), f64::NAN);
    let mut avgs = Array2::from_elem((rows, blocks), f64::NAN);
    let mut stds = Array2::from_elem((rows, blocks), f64::NAN);
    let mut qntls = Array3::from_elem((rows, blocks, 5), f64::NAN);
    let mut labels = Vec::with_capacity(rows);

    for (r, row) in per_row.iter().enumerate() {
        for b in 0..blocks {
            let from = first_col + b * window;
            data.slice_mut(s![r, from..from + window]).fill(row.avgs[b]);
            avgs[[r, b]] = row.avgs[b];
            stds[[r, b]] = row.stds[b];
            for (q, v) in row.qntls[b].iter().enumerate() {
                qntls[[r, b, q]] = *v;
            }
        }
        let (valid, mean_avg, _) = finite_mean_std(row.avgs.iter().copied());
        let (_, mean_std, _) = finite_mean_std(row.stds.iter().copied());
        meta[[r, 0]] = valid as f64;
        meta[[r, 1]] = mean_avg;
        meta[[r, 2]] = mean_std;
        labels.push(if valid == 0 {
            String::new()
        } else {
            format!("{valid} blocks avg {mean_avg:7.2} std {mean_std:7.2}")
        });
    }

    OpOutput {
        data,
        meta,
        labels,
        blocks: Some(BlockStats {
            window,
            first_col,
            avgs,
            stds,
            qntls,
        }),
    }
}

/// Quintile score per entity: each block's finite values are bucketed
/// against that block's five-point quantiles taken across entities, and an
/// entity scores the mean bucket over the blocks where it had a value.
///
/// Returns `(score, blocksRanked)` per entity.
pub fn ranked_scores(stats: &BlockStats) -> Vec<(f64, usize)> {
    let rows = stats.avgs.nrows();
    let mut totals = vec![(0.0, 0usize); rows];
    for col in stats.avgs.columns() {
        let edges = five_point(col.iter().copied());
        if edges[0].is_nan() {
            continue;
        }
        for (r, v) in col.iter().enumerate() {
            if v.is_finite() {
                totals[r].0 += digitize_right(*v, &edges) as f64;
                totals[r].1 += 1;
            }
        }
    }
    totals
        .into_iter()
        .map(|(sum, n)| if n == 0 { (f64::NAN, 0) } else { (sum / n as f64, n) })
        .collect()
}
