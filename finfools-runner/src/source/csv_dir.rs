//! Source backed by a directory of per-day CSV files.
//!
//! Layout: `{raw}/{YYYYMMDD}.csv` with header `code,name,type,<keys...>`.
//! Fetching converts a raw file into `{snapshots}/{YYYYMMDD}.snap`. Cells
//! that are empty or not numbers (feeds write `N.A.`) become NaN.

use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{DataSource, DataSrcType, FetchOptions, FetchStatus, Snapshot};
use crate::error::IngestError;

pub struct CsvDirSource {
    name: String,
    src_type: DataSrcType,
    data_keys: Vec<String>,
    raw_dir: PathBuf,
    snapshot_dir: PathBuf,
    /// Days before this are final; snapshots of later days are stale.
    today: NaiveDate,
    missing: Vec<NaiveDate>,
}

impl CsvDirSource {
    pub fn new(
        name: impl Into<String>,
        src_type: DataSrcType,
        data_keys: Vec<String>,
        raw_dir: impl Into<PathBuf>,
        snapshot_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            src_type,
            data_keys,
            raw_dir: raw_dir.into(),
            snapshot_dir: snapshot_dir.into(),
            today: chrono::Local::now().date_naive(),
            missing: Vec::new(),
        }
    }

    /// Override the day used for staleness checks.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn raw_path(&self, date: NaiveDate) -> PathBuf {
        self.raw_dir.join(format!("{}.csv", date.format("%Y%m%d")))
    }

    pub fn snapshot_path(&self, date: NaiveDate) -> PathBuf {
        self.snapshot_dir.join(format!("{}.snap", date.format("%Y%m%d")))
    }

    /// Parse one raw day file into a snapshot.
    pub fn parse_raw(&self, path: &Path, date: NaiveDate) -> Result<Snapshot, IngestError> {
        let csv_err = |source: csv::Error| IngestError::Csv {
            path: path.display().to_string(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(csv_err)?;
        let headers = reader.headers().map_err(csv_err)?.clone();
        let leading: Vec<&str> = headers.iter().take(3).collect();
        if leading != ["code", "name", "type"] {
            return Err(IngestError::Corrupt {
                path: path.display().to_string(),
                reason: format!("header must start with code,name,type; got {leading:?}"),
            });
        }
        let columns: Vec<Option<usize>> = self
            .data_keys
            .iter()
            .map(|key| headers.iter().skip(3).position(|h| h == key).map(|p| p + 3))
            .collect();

        let mut snap = Snapshot::new(date, self.data_keys.clone());
        snap.up_to_date = date < self.today;
        snap.more.insert("source".into(), self.name.clone());
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            let code = record.get(0).unwrap_or_default();
            if code.is_empty() {
                continue;
            }
            let values = columns
                .iter()
                .map(|col| {
                    col.and_then(|c| record.get(c))
                        .and_then(|cell| cell.parse::<f64>().ok())
                        .unwrap_or(f64::NAN)
                })
                .collect();
            snap.push(
                code,
                record.get(1).unwrap_or_default(),
                record.get(2).unwrap_or_default(),
                values,
            );
        }
        Ok(snap)
    }
}

impl DataSource for CsvDirSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn src_type(&self) -> DataSrcType {
        self.src_type
    }

    fn data_keys(&self) -> &[String] {
        &self.data_keys
    }

    fn fetch_for_date(
        &mut self,
        date: NaiveDate,
        opts: FetchOptions,
    ) -> Result<FetchStatus, IngestError> {
        let snap_path = self.snapshot_path(date);
        let have_snapshot = snap_path.exists();
        if have_snapshot && opts.local_only() {
            return Ok(FetchStatus::Cached);
        }
        if have_snapshot && !opts.wants_remote() {
            match Snapshot::read(&snap_path) {
                Ok(snap) if snap.up_to_date => return Ok(FetchStatus::Cached),
                Ok(_) => debug!(source = %self.name, %date, "snapshot is stale"),
                Err(e) => debug!(source = %self.name, %date, error = %e, "snapshot unreadable"),
            }
        }
        if opts.local_only() {
            return Ok(FetchStatus::Absent);
        }

        let raw_path = self.raw_path(date);
        if !raw_path.exists() {
            return Ok(if have_snapshot {
                FetchStatus::Cached
            } else {
                FetchStatus::Absent
            });
        }
        let snap = self.parse_raw(&raw_path, date)?;
        snap.write(&snap_path)?;
        debug!(source = %self.name, %date, entities = snap.len(), "snapshot written");
        Ok(FetchStatus::Fetched)
    }

    fn read_snapshot(&self, date: NaiveDate) -> Result<Snapshot, IngestError> {
        let path = self.snapshot_path(date);
        if !path.exists() {
            return Err(IngestError::NoSnapshot(date));
        }
        Snapshot::read(&path)
    }

    fn discard_snapshot(&self, date: NaiveDate) {
        let path = self.snapshot_path(date);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                debug!(path = %path.display(), error = %e, "could not remove snapshot");
            }
        }
    }

    fn record_missing(&mut self, date: NaiveDate) {
        if !self.missing.contains(&date) {
            self.missing.push(date);
        }
    }

    fn missing_dates(&self) -> &[NaiveDate] {
        &self.missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::LoadOutcome;
    use finfools_core::{CompiledFilter, Edb};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn source(root: &Path) -> CsvDirSource {
        CsvDirSource::new(
            "mf",
            DataSrcType::Mf,
            vec!["nav".into()],
            root.join("raw"),
            root.join("snapshots"),
        )
        .with_today(d(2021, 2, 1))
    }

    fn write_raw(root: &Path, ymd: &str, body: &str) {
        let dir = root.join("raw");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{ymd}.csv")), body).unwrap();
    }

    #[test]
    fn parses_raw_file_with_bad_cells() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(
            dir.path(),
            "20210104",
            "code,name,type,nav\n100,Alpha Fund,open equity,10.5\n200,Beta Fund,open debt,N.A.\n,blank,x,1\n",
        );
        let src = source(dir.path());
        let snap = src
            .parse_raw(&src.raw_path(d(2021, 1, 4)), d(2021, 1, 4))
            .unwrap();
        assert_eq!(snap.len(), 2);
        assert!(snap.up_to_date);
        assert_eq!(snap.data[0].values, vec![10.5]);
        assert!(snap.data[1].values[0].is_nan());
    }

    #[test]
    fn bad_header_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(dir.path(), "20210104", "id,nav\n100,1.0\n");
        let src = source(dir.path());
        let err = src
            .parse_raw(&src.raw_path(d(2021, 1, 4)), d(2021, 1, 4))
            .unwrap_err();
        assert!(matches!(err, IngestError::Corrupt { .. }));
    }

    #[test]
    fn fetch_converts_then_caches() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(dir.path(), "20210104", "code,name,type,nav\n100,Alpha,open equity,10\n");
        let mut src = source(dir.path());
        let date = d(2021, 1, 4);
        assert_eq!(src.fetch_for_date(date, FetchOptions::default()).unwrap(), FetchStatus::Fetched);
        assert_eq!(src.fetch_for_date(date, FetchOptions::default()).unwrap(), FetchStatus::Cached);
        assert_eq!(src.fetch_for_date(date, FetchOptions::remote()).unwrap(), FetchStatus::Fetched);
        assert_eq!(src.fetch_for_date(d(2021, 1, 5), FetchOptions::default()).unwrap(), FetchStatus::Absent);
    }

    #[test]
    fn stale_snapshot_is_refetched() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(dir.path(), "20210201", "code,name,type,nav\n100,Alpha,open equity,10\n");
        let mut src = source(dir.path());
        let date = d(2021, 2, 1);
        src.fetch_for_date(date, FetchOptions::default()).unwrap();
        assert!(!src.read_snapshot(date).unwrap().up_to_date);
        assert_eq!(src.fetch_for_date(date, FetchOptions::default()).unwrap(), FetchStatus::Fetched);
        assert_eq!(src.fetch_for_date(date, FetchOptions::local()).unwrap(), FetchStatus::Cached);
    }

    #[test]
    fn corrupt_snapshot_is_replaced_on_retry() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(dir.path(), "20210104", "code,name,type,nav\n100,Alpha,open equity,10\n");
        let mut src = source(dir.path());
        let date = d(2021, 1, 4);
        let snap_path = src.snapshot_path(date);
        fs::create_dir_all(snap_path.parent().unwrap()).unwrap();
        fs::write(&snap_path, b"garbage").unwrap();

        let mut edb = Edb::new(2, 2, &["nav"]).unwrap();
        let outcome = src
            .load_for_date(date, &mut edb, &CompiledFilter::default(), FetchOptions::local())
            .unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded { entities: 1, dropped: 0 });
        assert!(src.missing_dates().is_empty());
        assert_eq!(edb.data("nav").unwrap()[[0, 0]], 10.0);
    }

    #[test]
    fn unrecoverable_date_is_recorded_missing() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(dir.path(), "20210104", "id,nav\n100,1.0\n");
        let mut src = source(dir.path());
        let date = d(2021, 1, 4);
        let mut edb = Edb::new(2, 2, &["nav"]).unwrap();
        let result = src.load_for_date(date, &mut edb, &CompiledFilter::default(), FetchOptions::default());
        assert!(result.is_err());
        assert_eq!(src.missing_dates(), &[date]);
        assert_eq!(edb.shape().1, 0);
    }
}
