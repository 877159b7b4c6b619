//! Per-worker append-only checkpoint logs, one JSON record per line.

use crate::domain::{HaloError, TabulationWarning};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Relative tolerance under which two redshifts name the same grid point.
pub const REDSHIFT_MATCH_TOLERANCE: f64 = 1.0e-10;

pub fn same_redshift(lhs: f64, rhs: f64) -> bool {
    (lhs - rhs).abs() <= REDSHIFT_MATCH_TOLERANCE * lhs.abs().max(rhs.abs()).max(1.0)
}

/// One completed redshift: the power-spectrum row and the correlation row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub z: f64,
    pub ps: Vec<f64>,
    pub cf: Vec<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O failed on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint '{path}' line {line} is malformed: {message}")]
    Malformed {
        path: String,
        line: usize,
        message: String,
    },
    #[error("failed to encode checkpoint record for z={z}: {message}")]
    Encode { z: f64, message: String },
}

impl From<CheckpointError> for HaloError {
    fn from(error: CheckpointError) -> Self {
        match error {
            CheckpointError::Io { .. } => HaloError::io_system("IO.CHECKPOINT", error.to_string()),
            CheckpointError::Malformed { .. } => {
                HaloError::format("FORMAT.CHECKPOINT", error.to_string())
            }
            CheckpointError::Encode { .. } => {
                HaloError::internal("RUN.CHECKPOINT_ENCODE", error.to_string())
            }
        }
    }
}

/// Records read back from a log, plus the warning raised when its last
/// line was only partially written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedCheckpoint {
    pub records: Vec<CheckpointRecord>,
    pub warning: Option<TabulationWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointLog {
    path: PathBuf,
}

impl CheckpointLog {
    /// The log of `rank` for tables named by `prefix`.
    pub fn new(directory: impl AsRef<Path>, prefix: &str, rank: usize) -> Self {
        Self {
            path: directory
                .as_ref()
                .join(format!("{}.{:03}.jsonl", prefix, rank)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Deletes the log. Returns whether there was one.
    pub fn clear(&self) -> Result<bool, CheckpointError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(self.io_error(source)),
        }
    }

    /// Every complete record. A missing log is empty.
    pub fn load(&self) -> Result<LoadedCheckpoint, CheckpointError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LoadedCheckpoint::default());
            }
            Err(source) => return Err(self.io_error(source)),
        };

        let lines: Vec<(usize, &str)> = content
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty())
            .collect();

        let mut loaded = LoadedCheckpoint::default();
        for (position, (line_number, line)) in lines.iter().enumerate() {
            match serde_json::from_str::<CheckpointRecord>(line) {
                Ok(record) => loaded.records.push(record),
                Err(_) if position + 1 == lines.len() => {
                    let warning = TabulationWarning::TruncatedCheckpoint {
                        path: self.path.display().to_string(),
                        line: *line_number,
                    };
                    tracing::warn!(%warning);
                    loaded.warning = Some(warning);
                }
                Err(source) => {
                    return Err(CheckpointError::Malformed {
                        path: self.path.display().to_string(),
                        line: *line_number,
                        message: source.to_string(),
                    });
                }
            }
        }

        Ok(loaded)
    }

    /// Appends one record and flushes it before returning.
    pub fn append(&self, record: &CheckpointRecord) -> Result<(), CheckpointError> {
        let mut line = serde_json::to_string(record).map_err(|source| CheckpointError::Encode {
            z: record.z,
            message: source.to_string(),
        })?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_error(source))?;
        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .and_then(|()| file.sync_data())
            .map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CheckpointLog, CheckpointRecord, same_redshift};
    use crate::domain::{HaloError, HaloErrorCategory, TabulationWarning};
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use tempfile::TempDir;

    fn record(z: f64) -> CheckpointRecord {
        CheckpointRecord {
            z,
            ps: vec![z, 2.0 * z, 1.0e-30],
            cf: vec![-0.1, 0.1 / 3.0],
        }
    }

    #[test]
    fn appended_records_load_back_exactly() {
        let temp = TempDir::new().expect("tempdir should be created");
        let log = CheckpointLog::new(temp.path(), "halo_ps_ST", 2);
        assert!(log.path().ends_with("halo_ps_ST.002.jsonl"));
        assert!(log.load().expect("missing log").records.is_empty());

        log.append(&record(6.0)).expect("append");
        log.append(&record(8.05)).expect("append");

        let loaded = log.load().expect("load");
        assert_eq!(loaded.records, vec![record(6.0), record(8.05)]);
        assert_eq!(loaded.warning, None);
    }

    #[test]
    fn partially_written_tail_is_dropped_with_warning() {
        let temp = TempDir::new().expect("tempdir should be created");
        let log = CheckpointLog::new(temp.path(), "prefix", 0);
        log.append(&record(6.0)).expect("append");
        let mut file = OpenOptions::new().append(true).open(log.path()).expect("open");
        file.write_all(b"{\"z\":8.0,\"ps\":[1.0,").expect("write torn record");

        let loaded = log.load().expect("load");
        assert_eq!(loaded.records, vec![record(6.0)]);
        assert!(matches!(
            loaded.warning,
            Some(TabulationWarning::TruncatedCheckpoint { line: 2, .. })
        ));
    }

    #[test]
    fn malformed_interior_line_is_a_format_error() {
        let temp = TempDir::new().expect("tempdir should be created");
        let log = CheckpointLog::new(temp.path(), "prefix", 0);
        fs::write(log.path(), "garbage\n").expect("seed");
        log.append(&record(6.0)).expect("append");

        let error = HaloError::from(log.load().expect_err("malformed"));
        assert_eq!(error.category(), HaloErrorCategory::Format);
    }

    #[test]
    fn clear_removes_the_log() {
        let temp = TempDir::new().expect("tempdir should be created");
        let log = CheckpointLog::new(temp.path(), "prefix", 1);
        assert!(!log.clear().expect("nothing to clear"));
        log.append(&record(6.0)).expect("append");
        assert!(log.clear().expect("clear"));
        assert!(!log.exists());
    }

    #[test]
    fn redshift_matching_tolerates_rounding_only() {
        assert!(same_redshift(8.05, 8.0 + 0.05));
        assert!(!same_redshift(8.0, 8.05));
    }
}
