//! Operator dispatch: resolve the source, run the kernel, store the result.
//!
//! Sources are read through alias resolution. Results always land on a new
//! derived key; a base key can never be overwritten.

use tracing::{debug, warn};

use super::parse::{parse_op, OpRequest};
use super::{average, block, pivot, returns, rsi, OpOutput, OpSpec};
use crate::edb::{date_to_ymd, DerivedMeta, Edb};
use crate::error::OpError;

/// Keys the pivot operator reads next to its close source.
const PIVOT_HIGH: &str = "high";
const PIVOT_LOW: &str = "low";

/// Resolve a request's inclusive column range.
fn columns(edb: &Edb, req: &OpRequest) -> Result<(usize, usize), OpError> {
    let (cs, ce) = edb.date_range_to_index(req.start, req.end)?;
    if cs > ce {
        return Err(OpError::EmptyRange { start: cs, end: ce });
    }
    Ok((cs, ce))
}

/// `OP(SRC[START:END])` with the resolved dates filled in.
pub fn canonical_name(edb: &Edb, req: &OpRequest) -> Result<String, OpError> {
    let (cs, ce) = columns(edb, req)?;
    let ymd = |col| edb.date_of(col).map(date_to_ymd).unwrap_or_default();
    Ok(format!("{}({}[{}:{}])", req.op, req.src, ymd(cs), ymd(ce)))
}

fn run_kernel(edb: &Edb, src: &str, op: &OpSpec, cs: usize, ce: usize) -> Result<OpOutput, OpError> {
    let v = edb.data(src)?;
    let col_or = |date: &Option<chrono::NaiveDate>, default: usize| match date {
        Some(d) => edb.col_of(*d).map_err(OpError::from),
        None => Ok(default),
    };
    let output = match op {
        OpSpec::Srel => returns::srel(v, cs, ce),
        OpSpec::Rel { base } => returns::rel(v, col_or(base, cs)?, cs, ce),
        OpSpec::Reton { anchor, kind } => returns::reton(v, col_or(anchor, ce)?, *kind, cs, ce),
        OpSpec::Ma { window, kind } => average::moving_average(v, *window, *kind, cs, ce),
        OpSpec::Roll { window, kind } => returns::roll(v, *window, *kind, cs, ce),
        OpSpec::Block { window } => {
            let (blocks, _) = block::layout(*window, cs, ce);
            if blocks == 0 {
                return Err(OpError::WindowTooLarge {
                    window: *window,
                    len: ce - cs + 1,
                });
            }
            block::block(v, *window, cs, ce)
        }
        OpSpec::Rsi { lookback } => rsi::rsi(v, *lookback, cs, ce),
        OpSpec::Pivot { date } => {
            let high = edb
                .data(PIVOT_HIGH)
                .map_err(|_| OpError::MissingInput(PIVOT_HIGH.into()))?;
            let low = edb
                .data(PIVOT_LOW)
                .map_err(|_| OpError::MissingInput(PIVOT_LOW.into()))?;
            pivot::pivot(high, low, v, col_or(date, ce)?)
        }
    };
    Ok(output)
}

/// Run one operator request and return the destination key.
pub fn apply(edb: &mut Edb, req: &OpRequest) -> Result<String, OpError> {
    let src = edb
        .store()
        .resolve(&req.src)
        .ok_or_else(|| OpError::MissingSource(req.src.clone()))?
        .to_string();
    let (cs, ce) = columns(edb, req)?;
    let base = edb
        .meta(&src)
        .map_or_else(|| src.clone(), |m| m.base.clone());

    let output = run_kernel(edb, &src, &req.op, cs, ce)?;
    let dst = match &req.dst {
        Some(dst) => dst.clone(),
        None => canonical_name(edb, req)?,
    };

    let meta = DerivedMeta {
        tag: req.op.tag(),
        src,
        base,
        start_col: cs,
        end_col: ce,
        data: output.meta,
        labels: output.labels,
        blocks: output.blocks,
    };
    edb.store_mut().put_derived(&dst, output.data, meta)?;
    debug!(dst = %dst, op = %req.op, cs, ce, "operator applied");
    Ok(dst)
}

/// Parse and run a batch of op strings in order.
///
/// A failing spec is logged and skipped; the rest of the batch still runs.
pub fn run_ops<S: AsRef<str>>(edb: &mut Edb, specs: &[S]) -> Vec<Result<String, OpError>> {
    specs
        .iter()
        .map(|spec| {
            let spec = spec.as_ref();
            let result = parse_op(spec).and_then(|req| apply(edb, &req));
            if let Err(e) = &result {
                warn!(spec, error = %e, "operator skipped");
            }
            result
        })
        .collect()
}

/// Name of the full-range `srel` of `key`'s base data, computing it first
/// when it is not already stored.
pub fn ensure_srel(edb: &mut Edb, key: &str) -> Result<String, OpError> {
    let canonical = edb
        .store()
        .resolve(key)
        .ok_or_else(|| OpError::MissingSource(key.to_string()))?;
    let base = edb
        .meta(canonical)
        .map_or_else(|| canonical.to_string(), |m| m.base.clone());
    let req = OpRequest::new(OpSpec::Srel, &base);
    let name = canonical_name(edb, &req)?;
    if edb.meta(&name).is_some_and(|m| m.tag == req.op.tag()) {
        return Ok(name);
    }
    apply(edb, &req)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edb::tests::{d, seed_edb};
    use crate::edb::KeyKind;
    use crate::error::EdbError;
    use crate::ops::{assert_row, RetKind};

    const NAN: f64 = f64::NAN;

    fn loaded() -> Edb {
        let mut edb = seed_edb();
        edb.optimise_size();
        edb.fill_holes();
        edb
    }

    #[test]
    fn srel_through_pipeline() {
        let mut edb = loaded();
        let dst = apply(&mut edb, &parse_op("srel(data)").unwrap()).unwrap();
        assert_eq!(dst, "srel(data[20200101:20200106])");
        let out = edb.data(&dst).unwrap();
        assert_row(out.row(0), &[0.0, 0.0, 20.0]);
        assert_row(out.row(1), &[0.0, 10.0, 10.0]);
        let meta = edb.meta(&dst).unwrap();
        assert_eq!(meta.tag, "srel");
        assert_eq!(meta.base, "data");
        assert_eq!(edb.store().kind(&dst), Some(KeyKind::Derived));
    }

    #[test]
    fn named_destination_through_alias() {
        let mut edb = loaded();
        edb.add_alias("nav", "data").unwrap();
        let dst = apply(&mut edb, &parse_op("r1 = roll1(nav)").unwrap()).unwrap();
        assert_eq!(dst, "r1");
        assert_row(edb.data("r1").unwrap().row(0), &[NAN, 0.0, 20.0]);
        assert_eq!(edb.meta("r1").unwrap().src, "data");
        assert_eq!(edb.meta("r1").unwrap().tag, "roll1");
    }

    #[test]
    fn derived_of_derived_keeps_base() {
        let mut edb = loaded();
        apply(&mut edb, &parse_op("s = srel(data)").unwrap()).unwrap();
        apply(&mut edb, &parse_op("m = mas2(s)").unwrap()).unwrap();
        let meta = edb.meta("m").unwrap();
        assert_eq!(meta.src, "s");
        assert_eq!(meta.base, "data");
    }

    #[test]
    fn range_restricts_columns() {
        let mut edb = loaded();
        let req = OpRequest::new(OpSpec::Srel, "data").with_range(Some(d(20200102)), None);
        let dst = apply(&mut edb, &req).unwrap();
        assert_eq!(dst, "srel(data[20200102:20200106])");
        assert_row(edb.data(&dst).unwrap().row(0), &[NAN, 0.0, 20.0]);
        assert_eq!(edb.meta(&dst).unwrap().start_col, 1);
    }

    #[test]
    fn cannot_overwrite_base_key() {
        let mut edb = loaded();
        let err = apply(&mut edb, &parse_op("data = srel(data)").unwrap()).unwrap_err();
        assert!(matches!(err, OpError::Edb(EdbError::DuplicateKey(_))));
    }

    #[test]
    fn errors_are_reported_per_spec() {
        let mut edb = loaded();
        let results = run_ops(
            &mut edb,
            &[
                "srel(volume)",
                "bogus(data)",
                "srel(data[20200106:20200101])",
                "block5(data)",
                "pivot(data)",
                "x = roll1_retpa(data)",
            ],
        );
        assert!(matches!(results[0], Err(OpError::MissingSource(_))));
        assert!(matches!(results[1], Err(OpError::UnknownOperator(_))));
        assert!(matches!(results[2], Err(OpError::EmptyRange { .. })));
        assert!(matches!(results[3], Err(OpError::WindowTooLarge { .. })));
        assert!(matches!(results[4], Err(OpError::MissingInput(_))));
        assert_eq!(results[5].as_ref().unwrap(), "x");
    }

    #[test]
    fn oversize_windows_leave_the_batch_running() {
        let mut edb = loaded();
        let huge = usize::MAX;
        let results = run_ops(
            &mut edb,
            &[
                format!("a = roll{huge}(data[20200102:])"),
                format!("b = mas{huge}(data)"),
                format!("c = dma{huge}(data)"),
                format!("e = rsi{huge}(data)"),
                "x = srel(data)".to_string(),
            ],
        );
        for (key, result) in ["a", "b", "c", "e"].iter().zip(&results) {
            assert_eq!(result.as_ref().unwrap().as_str(), *key);
            assert!(edb.data(key).unwrap().iter().all(|v| v.is_nan()));
        }
        assert_eq!(results[4].as_ref().unwrap(), "x");
        assert_row(edb.data("x").unwrap().row(0), &[0.0, 0.0, 20.0]);
    }

    #[test]
    fn ensure_srel_is_cached() {
        let mut edb = loaded();
        apply(
            &mut edb,
            &OpRequest::new(
                OpSpec::Roll {
                    window: 1,
                    kind: RetKind::AbsRet,
                },
                "data",
            )
            .with_dst("r"),
        )
        .unwrap();
        let first = ensure_srel(&mut edb, "r").unwrap();
        assert_eq!(first, "srel(data[20200101:20200106])");
        let count = edb.store().derived_keys().count();
        assert_eq!(ensure_srel(&mut edb, "data").unwrap(), first);
        assert_eq!(edb.store().derived_keys().count(), count);
    }

    #[test]
    fn pivot_reads_high_low_keys() {
        let mut edb = Edb::new(1, 2, &["open", "high", "low", "close"]).unwrap();
        let t = edb.add_type("stock");
        edb.add_date(d(20210104)).unwrap();
        edb.add_data(
            "X",
            &[("high", 12.0), ("low", 6.0), ("close", 9.0)],
            Some("X"),
            Some(t),
        )
        .unwrap();
        edb.optimise_size();
        let dst = apply(&mut edb, &parse_op("pivot[20210104](close)").unwrap()).unwrap();
        assert_eq!(dst, "pivot[20210104](close[20210104:20210104])");
        assert_row(edb.meta(&dst).unwrap().data.row(0), &[9.0, 12.0, 6.0, 15.0, 3.0]);
    }
}
