//! Append-only JSON-lines audit log, one file per operation per run.
//!
//! Each line is an [`AuditRecord`]. Files are named
//! `<operation-id>_<run-id>.log` and opened with create-new semantics, so a
//! run can never write into another run's log.

use crate::executor::{ApplyResult, Outcome};
use crate::operation::OperationKind;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("cannot create log directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot create log file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write log file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot read log file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed record at {}:{line}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// One line of an audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// RFC 3339 local time the record was written.
    pub timestamp: String,
    pub run_id: String,
    pub operation: OperationKind,
    pub dry_run: bool,
    /// Path recorded at scan time.
    pub source: String,
    /// Location the operation saw, when an earlier operation moved the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub outcome: String,
    /// Final or would-be path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditRecord {
    fn new(run_id: &str, operation: OperationKind, dry_run: bool, result: &ApplyResult) -> Self {
        let mut record = Self {
            timestamp: Local::now().to_rfc3339(),
            run_id: run_id.to_string(),
            operation,
            dry_run,
            source: result.source.display().to_string(),
            from: (result.location != result.source)
                .then(|| result.location.display().to_string()),
            outcome: result.outcome.label().to_string(),
            path: None,
            reason: None,
            error_kind: None,
            detail: None,
        };
        match &result.outcome {
            Outcome::Applied { final_path } => record.path = Some(final_path.display().to_string()),
            Outcome::Simulated { would_be_path } => {
                record.path = Some(would_be_path.display().to_string())
            }
            Outcome::Skipped { reason } => record.reason = Some(reason.code().to_string()),
            Outcome::Failed { error_kind, detail } => {
                record.error_kind = Some(error_kind.code().to_string());
                record.detail = Some(detail.clone());
            }
        }
        record
    }
}

/// Log writer for one operation of one run.
///
/// Dropping the logger without calling [`AuditLogger::finish`] still flushes
/// buffered lines through `BufWriter`'s drop, but skips the sync.
#[derive(Debug)]
pub struct AuditLogger {
    path: PathBuf,
    writer: BufWriter<File>,
    run_id: String,
    operation: OperationKind,
    dry_run: bool,
    written: usize,
}

impl AuditLogger {
    /// File name for an operation's log in a run.
    pub fn file_name(operation: OperationKind, run_id: &str) -> String {
        format!("{}_{run_id}.log", operation.id())
    }

    /// Creates the log file, and the directory holding it if needed.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created or a file with the same
    /// name already exists.
    pub fn open(
        log_dir: &Path,
        run_id: &str,
        operation: OperationKind,
        dry_run: bool,
    ) -> Result<Self, AuditError> {
        fs::create_dir_all(log_dir).map_err(|e| AuditError::CreateDir {
            path: log_dir.to_path_buf(),
            source: e,
        })?;

        let path = log_dir.join(Self::file_name(operation, run_id));
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .map_err(|e| AuditError::Open {
                path: path.clone(),
                source: e,
            })?;

        tracing::debug!(path = %path.display(), %operation, "opened audit log");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            run_id: run_id.to_string(),
            operation,
            dry_run,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one result.
    pub fn record(&mut self, result: &ApplyResult) -> Result<(), AuditError> {
        let record = AuditRecord::new(&self.run_id, self.operation, self.dry_run, result);
        let write = serde_json::to_writer(&mut self.writer, &record)
            .map_err(io::Error::from)
            .and_then(|()| self.writer.write_all(b"\n"));
        write.map_err(|e| AuditError::Write {
            path: self.path.clone(),
            source: e,
        })?;
        self.written += 1;
        Ok(())
    }

    /// Flushes and syncs the log, returning its path.
    pub fn finish(mut self) -> Result<PathBuf, AuditError> {
        let path = self.path.clone();
        self.writer
            .flush()
            .and_then(|()| self.writer.get_ref().sync_all())
            .map_err(|e| AuditError::Write {
                path: path.clone(),
                source: e,
            })?;
        tracing::debug!(path = %path.display(), records = self.written, "closed audit log");
        Ok(path)
    }
}

/// Reads every record of a log file.
pub fn read_log(path: &Path) -> Result<Vec<AuditRecord>, AuditError> {
    let file = File::open(path).map_err(|e| AuditError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| AuditError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| AuditError::Malformed {
            path: path.to_path_buf(),
            line: index + 1,
            source: e,
        })?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::SkipReason;
    use crate::executor::FailureKind;
    use tempfile::TempDir;

    fn result(source: &str, outcome: Outcome) -> ApplyResult {
        ApplyResult {
            source: PathBuf::from(source),
            location: PathBuf::from(source),
            outcome,
        }
    }

    #[test]
    fn test_writes_one_line_per_result() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("logs");

        let mut logger =
            AuditLogger::open(&log_dir, "run1", OperationKind::SegregateByYear, true).unwrap();
        logger
            .record(&result(
                "/r/a.txt",
                Outcome::Simulated {
                    would_be_path: PathBuf::from("/r/2023/a.txt"),
                },
            ))
            .unwrap();
        logger
            .record(&result(
                "/r/b.txt",
                Outcome::Skipped {
                    reason: SkipReason::NoTimestamp,
                },
            ))
            .unwrap();
        logger
            .record(&result(
                "/r/c.txt",
                Outcome::Failed {
                    error_kind: FailureKind::Probe,
                    detail: "boom".to_string(),
                },
            ))
            .unwrap();
        let path = logger.finish().unwrap();

        assert_eq!(path, log_dir.join("segregate_by_year_run1.log"));
        let records = read_log(&path).unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].outcome, "simulated");
        assert_eq!(records[0].path.as_deref(), Some("/r/2023/a.txt"));
        assert!(records[0].dry_run);
        assert_eq!(records[0].from, None);
        assert_eq!(records[1].reason.as_deref(), Some("no_timestamp"));
        assert_eq!(records[2].error_kind.as_deref(), Some("probe"));
        assert_eq!(records[2].detail.as_deref(), Some("boom"));
        assert!(chrono::DateTime::parse_from_rfc3339(&records[0].timestamp).is_ok());
    }

    #[test]
    fn test_records_relocated_location() {
        let temp_dir = TempDir::new().unwrap();
        let mut logger =
            AuditLogger::open(temp_dir.path(), "r", OperationKind::SmartRename, false).unwrap();
        logger
            .record(&ApplyResult {
                source: PathBuf::from("/r/a .txt"),
                location: PathBuf::from("/r/2020/a .txt"),
                outcome: Outcome::Applied {
                    final_path: PathBuf::from("/r/2020/a.txt"),
                },
            })
            .unwrap();
        let records = read_log(&logger.finish().unwrap()).unwrap();
        assert_eq!(records[0].from.as_deref(), Some("/r/2020/a .txt"));
        assert_eq!(records[0].operation, OperationKind::SmartRename);
    }

    #[test]
    fn test_never_reuses_a_log_file() {
        let temp_dir = TempDir::new().unwrap();
        let first =
            AuditLogger::open(temp_dir.path(), "same", OperationKind::SmartRename, false).unwrap();
        first.finish().unwrap();

        let second = AuditLogger::open(temp_dir.path(), "same", OperationKind::SmartRename, false);
        assert!(matches!(second, Err(AuditError::Open { .. })));
    }

    #[test]
    fn test_unwritable_log_dir() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        fs::write(&blocker, "x").unwrap();

        let result =
            AuditLogger::open(&blocker.join("logs"), "r", OperationKind::SmartRename, true);
        assert!(matches!(result, Err(AuditError::CreateDir { .. })));
    }
}
