//! Recorded CSV logs.

use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::error::{GloveError, Result};

/// Column every recorded log must carry.
pub const TIMESTAMP_COLUMN: &str = "timestamp_ms";

/// A CSV log read fully into memory.
#[derive(Debug, Clone)]
pub struct CsvLog {
    path: PathBuf,
    headers: StringRecord,
    rows: Vec<StringRecord>,
}

impl CsvLog {
    /// Read `path`. A missing `timestamp_ms` column is a configuration fault.
    ///
    /// Structurally broken records are logged and skipped; short rows are
    /// kept and their missing cells read as absent.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        if !headers.iter().any(|h| h == TIMESTAMP_COLUMN) {
            return Err(GloveError::MissingColumn {
                path: path.to_path_buf(),
                column: TIMESTAMP_COLUMN.to_string(),
            });
        }

        let mut rows = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            match record {
                Ok(record) => rows.push(record),
                Err(e) => tracing::warn!("{}: skipping record {}: {}", path.display(), idx + 1, e),
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            rows,
        })
    }

    /// Read only the header row (no column requirements).
    pub fn headers_of(path: impl AsRef<Path>) -> Result<Vec<String>> {
        let mut reader = ReaderBuilder::new().trim(Trim::All).from_path(path)?;
        Ok(reader.headers()?.iter().map(str::to_string).collect())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<Column> {
        self.headers.iter().position(|h| h == name).map(Column)
    }

    pub fn rows(&self) -> &[StringRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Per-row timestamps, `None` where the cell does not parse.
    pub fn timestamps(&self) -> impl Iterator<Item = (Option<f64>, &StringRecord)> + '_ {
        let ts = self.column(TIMESTAMP_COLUMN);
        self.rows.iter().map(move |row| (cell(row, ts), row))
    }
}

/// Index of a named column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column(usize);

/// Parse one cell. Absent column, short row, blank or non-numeric cell
/// all yield `None`.
pub fn cell(row: &StringRecord, column: Option<Column>) -> Option<f64> {
    row.get(column?.0)?.parse::<f64>().ok()
}

/// [`cell`] defaulting to `0.0`.
pub fn cell_or_zero(row: &StringRecord, column: Option<Column>) -> f64 {
    cell(row, column).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, text: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_missing_timestamp_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "cv.csv", "t,L_x0\n1,2\n");
        match CsvLog::read(&path) {
            Err(GloveError::MissingColumn { column, .. }) => assert_eq!(column, "timestamp_ms"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_cells_and_short_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "s.csv",
            "timestamp_ms, accel_x ,accel_y\n10, 1.5,abc\n20\nxx,3,4\n",
        );
        let log = CsvLog::read(&path).unwrap();
        assert_eq!(log.len(), 3);
        assert!(log.has_column("accel_x"));
        assert!(!log.has_column("accel_z"));

        let ax = log.column("accel_x");
        let ay = log.column("accel_y");
        let rows: Vec<_> = log.timestamps().collect();
        assert_eq!(rows[0].0, Some(10.0));
        assert_eq!(cell(rows[0].1, ax), Some(1.5));
        assert_eq!(cell_or_zero(rows[0].1, ay), 0.0);
        assert_eq!(cell(rows[1].1, ax), None);
        assert_eq!(rows[2].0, None);
        assert_eq!(cell(rows[0].1, log.column("accel_z")), None);
    }

    #[test]
    fn test_headers_of() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "d.csv", "timestamp_ms,left_acc_1\n");
        assert_eq!(
            CsvLog::headers_of(&path).unwrap(),
            vec!["timestamp_ms".to_string(), "left_acc_1".to_string()]
        );
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CsvLog::read(dir.path().join("nope.csv")).is_err());
    }
}
