//! Date index: trading day ↔ contiguous column.
//!
//! Only days for which data existed get a column, so the axis skips weekends
//! and holidays. Columns are appended strictly in chronological order.

use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;

use crate::error::{EdbError, Result};

/// Convert an integer `YYYYMMDD` into a date.
pub fn ymd_to_date(ymd: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt((ymd / 10_000) as i32, (ymd / 100) % 100, ymd % 100)
        .ok_or_else(|| EdbError::InvalidDate(ymd.to_string()))
}

/// Convert a date into its integer `YYYYMMDD` form.
pub fn date_to_ymd(date: NaiveDate) -> u32 {
    date.year() as u32 * 10_000 + date.month() * 100 + date.day()
}

#[derive(Debug, Clone, Default)]
pub struct DateIndex {
    dates: Vec<NaiveDate>,
    cols: HashMap<NaiveDate, usize>,
}

impl DateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from an ordered date list (session restore).
    pub fn from_dates(dates: Vec<NaiveDate>) -> Self {
        let cols = dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        Self { dates, cols }
    }

    /// Append a column. Fails unless `date` is after every date seen so far.
    pub fn push(&mut self, date: NaiveDate) -> Result<usize> {
        if let Some(&last) = self.dates.last() {
            if date <= last {
                return Err(EdbError::DateOutOfOrder { new: date, last });
            }
        }
        let col = self.dates.len();
        self.dates.push(date);
        self.cols.insert(date, col);
        Ok(col)
    }

    pub fn col_of(&self, date: NaiveDate) -> Option<usize> {
        self.cols.get(&date).copied()
    }

    pub fn date_of(&self, col: usize) -> Option<NaiveDate> {
        self.dates.get(col).copied()
    }

    pub fn last(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Column of the last date on or before `date`, if any.
    pub fn col_at_or_before(&self, date: NaiveDate) -> Option<usize> {
        match self.dates.binary_search(&date) {
            Ok(i) => Some(i),
            Err(0) => None,
            Err(i) => Some(i - 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(ymd: u32) -> NaiveDate {
        ymd_to_date(ymd).unwrap()
    }

    #[test]
    fn ymd_roundtrip() {
        assert_eq!(date_to_ymd(d(20200106)), 20200106);
        assert!(ymd_to_date(20201332).is_err());
    }

    #[test]
    fn push_assigns_contiguous_columns() {
        let mut idx = DateIndex::new();
        assert_eq!(idx.push(d(20200101)).unwrap(), 0);
        assert_eq!(idx.push(d(20200102)).unwrap(), 1);
        assert_eq!(idx.push(d(20200106)).unwrap(), 2);
        assert_eq!(idx.col_of(d(20200106)), Some(2));
        assert_eq!(idx.date_of(1), Some(d(20200102)));
        assert_eq!(idx.col_of(d(20200103)), None);
    }

    #[test]
    fn push_rejects_non_increasing_dates() {
        let mut idx = DateIndex::new();
        idx.push(d(20200102)).unwrap();
        assert!(matches!(
            idx.push(d(20200102)),
            Err(EdbError::DateOutOfOrder { .. })
        ));
        assert!(idx.push(d(20200101)).is_err());
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn col_at_or_before_skips_holidays() {
        let idx = DateIndex::from_dates(vec![d(20200101), d(20200102), d(20200106)]);
        assert_eq!(idx.col_at_or_before(d(20200104)), Some(1));
        assert_eq!(idx.col_at_or_before(d(20191231)), None);
        assert_eq!(idx.col_at_or_before(d(20200301)), Some(2));
    }
}
