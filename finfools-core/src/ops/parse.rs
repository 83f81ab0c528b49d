//! String frontend for operators: `[DST =] OP(SRC[START:END])`.
//!
//! `START`/`END` are `YYYYMMDD` and either may be empty. Operator tags carry
//! their parameters inline: `rel[20200101]`, `reton[20210104]_retpa`,
//! `mas50`, `roll365_retpa`, `rsi`, `pivot[20210104]`.

use chrono::NaiveDate;

use super::rsi::DEFAULT_LOOKBACK;
use super::{MaKind, OpSpec, RetKind};
use crate::edb::ymd_to_date;
use crate::error::OpError;

/// A parsed operator invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct OpRequest {
    /// Destination key; a canonical name is synthesised when absent.
    pub dst: Option<String>,
    pub op: OpSpec,
    pub src: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl OpRequest {
    pub fn new(op: OpSpec, src: &str) -> Self {
        Self {
            dst: None,
            op,
            src: src.to_string(),
            start: None,
            end: None,
        }
    }

    pub fn with_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn with_dst(mut self, dst: &str) -> Self {
        self.dst = Some(dst.to_string());
        self
    }
}

fn malformed(spec: &str, reason: impl Into<String>) -> OpError {
    OpError::Malformed {
        spec: spec.to_string(),
        reason: reason.into(),
    }
}

fn parse_date(text: &str, spec: &str) -> Result<Option<NaiveDate>, OpError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(spec, format!("'{text}' is not a YYYYMMDD date")));
    }
    let ymd: u32 = text
        .parse()
        .map_err(|_| malformed(spec, format!("'{text}' is not a YYYYMMDD date")))?;
    ymd_to_date(ymd)
        .map(Some)
        .map_err(|e| malformed(spec, e.to_string()))
}

/// Parse one op string.
pub fn parse_op(spec: &str) -> Result<OpRequest, OpError> {
    let text = spec.trim();
    let open = text
        .find('(')
        .ok_or_else(|| malformed(spec, "missing '('"))?;

    let (dst, call) = match text[..open].find('=') {
        Some(eq) => {
            let dst = text[..eq].trim();
            if dst.is_empty() {
                return Err(malformed(spec, "empty destination"));
            }
            (Some(dst.to_string()), text[eq + 1..].trim())
        }
        None => (None, text),
    };

    let open = call
        .find('(')
        .ok_or_else(|| malformed(spec, "missing '('"))?;
    let inner = call[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| malformed(spec, "missing closing ')'"))?
        .trim();
    let op = parse_tag(call[..open].trim(), spec)?;

    let (src, start, end) = match inner.find('[') {
        Some(bracket) => {
            let range = inner[bracket + 1..]
                .strip_suffix(']')
                .ok_or_else(|| malformed(spec, "missing closing ']'"))?;
            let (start, end) = range
                .split_once(':')
                .ok_or_else(|| malformed(spec, "range must be START:END"))?;
            (
                inner[..bracket].trim(),
                parse_date(start, spec)?,
                parse_date(end, spec)?,
            )
        }
        None => (inner, None, None),
    };
    if src.is_empty() {
        return Err(malformed(spec, "empty source key"));
    }

    Ok(OpRequest {
        dst,
        op,
        src: src.to_string(),
        start,
        end,
    })
}

fn parse_tag(tag: &str, spec: &str) -> Result<OpSpec, OpError> {
    let name_end = tag
        .find(|c: char| !c.is_ascii_lowercase())
        .unwrap_or(tag.len());
    let (name, rest) = tag.split_at(name_end);
    let num_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let (num, rest) = rest.split_at(num_end);
    let (date, rest) = match rest.strip_prefix('[') {
        Some(r) => {
            let close = r
                .find(']')
                .ok_or_else(|| malformed(spec, "missing closing ']' in operator"))?;
            (Some(parse_date(&r[..close], spec)?), &r[close + 1..])
        }
        None => (None, rest),
    };
    let kind = match rest {
        "" => None,
        r => Some(
            r.strip_prefix('_')
                .ok_or_else(|| malformed(spec, format!("unexpected '{r}' in operator")))?,
        ),
    };

    let number = || -> Result<Option<usize>, OpError> {
        if num.is_empty() {
            return Ok(None);
        }
        match num.parse::<usize>() {
            Ok(0) | Err(_) => Err(malformed(spec, format!("bad window '{num}'"))),
            Ok(n) => Ok(Some(n)),
        }
    };
    let window = || number()?.ok_or_else(|| malformed(spec, format!("'{name}' needs a window")));
    let no_number = || {
        if num.is_empty() {
            Ok(())
        } else {
            Err(malformed(spec, format!("'{name}' takes no window")))
        }
    };
    let no_date = || {
        if date.is_none() {
            Ok(())
        } else {
            Err(malformed(spec, format!("'{name}' takes no date")))
        }
    };
    let no_kind = || {
        if kind.is_none() {
            Ok(())
        } else {
            Err(malformed(spec, format!("'{name}' takes no return kind")))
        }
    };
    let ret_kind = |allow_safe: bool| match kind {
        None | Some("absret") => Ok(RetKind::AbsRet),
        Some("retpa") => Ok(RetKind::RetPa),
        Some("safe") if allow_safe => Ok(RetKind::Safe),
        Some(other) => Err(malformed(spec, format!("unknown return kind '{other}'"))),
    };
    let date = date.flatten();

    match name {
        "srel" => {
            no_number()?;
            no_date()?;
            no_kind()?;
            Ok(OpSpec::Srel)
        }
        "rel" => {
            no_number()?;
            no_kind()?;
            Ok(OpSpec::Rel { base: date })
        }
        "reton" => {
            no_number()?;
            Ok(OpSpec::Reton {
                anchor: date,
                kind: ret_kind(true)?,
            })
        }
        "mas" | "dma" | "mae" => {
            no_date()?;
            no_kind()?;
            let kind = match name {
                "mas" => MaKind::Simple,
                "dma" => MaKind::Centred,
                _ => MaKind::Exponential,
            };
            Ok(OpSpec::Ma {
                window: window()?,
                kind,
            })
        }
        "roll" => {
            no_date()?;
            Ok(OpSpec::Roll {
                window: window()?,
                kind: ret_kind(false)?,
            })
        }
        "block" => {
            no_date()?;
            no_kind()?;
            Ok(OpSpec::Block { window: window()? })
        }
        "rsi" => {
            no_date()?;
            no_kind()?;
            Ok(OpSpec::Rsi {
                lookback: number()?.unwrap_or(DEFAULT_LOOKBACK),
            })
        }
        "pivot" => {
            no_number()?;
            no_kind()?;
            Ok(OpSpec::Pivot { date })
        }
        _ => Err(OpError::UnknownOperator(tag.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edb::ymd_to_date;

    fn d(ymd: u32) -> NaiveDate {
        ymd_to_date(ymd).unwrap()
    }

    #[test]
    fn bare_srel() {
        let req = parse_op("srel(data)").unwrap();
        assert_eq!(req, OpRequest::new(OpSpec::Srel, "data"));
    }

    #[test]
    fn destination_and_range() {
        let req = parse_op(" ret3y = roll1095_retpa(nav[20150101:]) ").unwrap();
        assert_eq!(req.dst.as_deref(), Some("ret3y"));
        assert_eq!(
            req.op,
            OpSpec::Roll {
                window: 1095,
                kind: RetKind::RetPa
            }
        );
        assert_eq!(req.src, "nav");
        assert_eq!(req.start, Some(d(20150101)));
        assert_eq!(req.end, None);
    }

    #[test]
    fn dated_operators() {
        let req = parse_op("reton[20210104]_safe(close)").unwrap();
        assert_eq!(
            req.op,
            OpSpec::Reton {
                anchor: Some(d(20210104)),
                kind: RetKind::Safe
            }
        );
        assert_eq!(
            parse_op("rel[20200101](data)").unwrap().op,
            OpSpec::Rel {
                base: Some(d(20200101))
            }
        );
        assert_eq!(
            parse_op("pivot(close)").unwrap().op,
            OpSpec::Pivot { date: None }
        );
    }

    #[test]
    fn windows_and_defaults() {
        assert_eq!(
            parse_op("dma20(data)").unwrap().op,
            OpSpec::Ma {
                window: 20,
                kind: MaKind::Centred
            }
        );
        assert_eq!(
            parse_op("roll30(data)").unwrap().op,
            OpSpec::Roll {
                window: 30,
                kind: RetKind::AbsRet
            }
        );
        assert_eq!(
            parse_op("rsi(close)").unwrap().op,
            OpSpec::Rsi { lookback: 14 }
        );
    }

    #[test]
    fn canonical_display_reparses() {
        for spec in ["reton[20210104]_retpa", "roll365_retpa", "mae30", "block30"] {
            let req = parse_op(&format!("{spec}(data)")).unwrap();
            assert_eq!(req.op.to_string(), spec);
        }
    }

    #[test]
    fn rejects_bad_specs() {
        assert!(matches!(
            parse_op("frobnicate(data)"),
            Err(OpError::UnknownOperator(_))
        ));
        for bad in [
            "srel data",
            "srel(data",
            "= srel(data)",
            "mas(data)",
            "mas0(data)",
            "roll30_safe(data)",
            "srel(data[2020:])",
            "srel([:])",
            "block10[20200101](data)",
        ] {
            assert!(
                matches!(parse_op(bad), Err(OpError::Malformed { .. })),
                "expected malformed: {bad}"
            );
        }
    }
}
