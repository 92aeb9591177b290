//! Execution of resolved moves and renames.
//!
//! Each mutation is isolated to one file: either the file ends up at its
//! destination, or it is left where it was and the failure is reported.
//! Existing files are never overwritten.
use crate::classifier::SkipReason;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Category of a per-file failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Probe,
    SourceVanished,
    DestinationDirUnavailable,
    PermissionDenied,
    DestinationExists,
    CopyVerificationMismatch,
    CollisionExhausted,
    Io,
}

impl FailureKind {
    pub fn code(&self) -> &'static str {
        match self {
            FailureKind::Probe => "probe",
            FailureKind::SourceVanished => "source_vanished",
            FailureKind::DestinationDirUnavailable => "destination_dir_unavailable",
            FailureKind::PermissionDenied => "permission_denied",
            FailureKind::DestinationExists => "destination_exists",
            FailureKind::CopyVerificationMismatch => "copy_verification_mismatch",
            FailureKind::CollisionExhausted => "collision_exhausted",
            FailureKind::Io => "io",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// What happened to one file in one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied { final_path: PathBuf },
    Simulated { would_be_path: PathBuf },
    Skipped { reason: SkipReason },
    Failed { error_kind: FailureKind, detail: String },
}

impl Outcome {
    /// Short outcome name used in audit records.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Applied { .. } => "applied",
            Outcome::Simulated { .. } => "simulated",
            Outcome::Skipped { .. } => "skipped",
            Outcome::Failed { .. } => "failed",
        }
    }

    /// Where the file is (or would be) after the operation, if it moved.
    pub fn new_location(&self) -> Option<&Path> {
        match self {
            Outcome::Applied { final_path } => Some(final_path),
            Outcome::Simulated { would_be_path } => Some(would_be_path),
            _ => None,
        }
    }
}

/// Result for one scanned file, recorded once per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyResult {
    /// Path the file had when the run scanned it.
    pub source: PathBuf,
    /// Path the file had when this operation looked at it.
    pub location: PathBuf,
    /// What this operation did with the file.
    pub outcome: Outcome,
}

/// A move or rename that could not be carried out.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("source {} no longer exists", .path.display())]
    SourceVanished { path: PathBuf },
    #[error("cannot create directory {}: {source}", .path.display())]
    DestinationDirUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("permission denied moving {}", .path.display())]
    PermissionDenied { path: PathBuf },
    #[error("destination {} already exists", .path.display())]
    DestinationExists { path: PathBuf },
    #[error("copy of {} is {copied} bytes, expected {expected}", .path.display())]
    CopyVerificationMismatch {
        path: PathBuf,
        expected: u64,
        copied: u64,
    },
    #[error("moving {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl MutationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            MutationError::SourceVanished { .. } => FailureKind::SourceVanished,
            MutationError::DestinationDirUnavailable { .. } => {
                FailureKind::DestinationDirUnavailable
            }
            MutationError::PermissionDenied { .. } => FailureKind::PermissionDenied,
            MutationError::DestinationExists { .. } => FailureKind::DestinationExists,
            MutationError::CopyVerificationMismatch { .. } => FailureKind::CopyVerificationMismatch,
            MutationError::Io { .. } => FailureKind::Io,
        }
    }

    fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            ErrorKind::NotFound => MutationError::SourceVanished { path },
            ErrorKind::PermissionDenied => MutationError::PermissionDenied { path },
            ErrorKind::AlreadyExists => MutationError::DestinationExists { path },
            _ => MutationError::Io { path, source },
        }
    }
}

/// Performs or simulates moves.
#[derive(Debug, Clone, Copy)]
pub struct MutationExecutor {
    dry_run: bool,
}

impl MutationExecutor {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Moves `from` to the already-resolved `to`.
    ///
    /// In dry-run mode nothing is touched and the outcome is `Simulated`.
    pub fn execute(&self, from: &Path, to: &Path) -> Outcome {
        if self.dry_run {
            return Outcome::Simulated {
                would_be_path: to.to_path_buf(),
            };
        }

        match Self::apply(from, to) {
            Ok(()) => Outcome::Applied {
                final_path: to.to_path_buf(),
            },
            Err(e) => Outcome::Failed {
                error_kind: e.kind(),
                detail: e.to_string(),
            },
        }
    }

    /// Performs the move on disk.
    ///
    /// # Errors
    ///
    /// Returns a [`MutationError`] and leaves the source in place when the
    /// move cannot be completed.
    pub fn apply(from: &Path, to: &Path) -> Result<(), MutationError> {
        if let Some(parent) = to.parent() {
            // create_dir_all succeeds if another worker created it first.
            fs::create_dir_all(parent).map_err(|e| MutationError::DestinationDirUnavailable {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        if fs::symlink_metadata(to).is_ok() {
            return Err(MutationError::DestinationExists {
                path: to.to_path_buf(),
            });
        }

        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::CrossesDevices => {
                tracing::debug!(
                    from = %from.display(),
                    to = %to.display(),
                    "rename crosses devices, copying"
                );
                Self::copy_then_remove(from, to)
            }
            Err(e) => Err(MutationError::from_io(from, e)),
        }
    }

    fn copy_then_remove(from: &Path, to: &Path) -> Result<(), MutationError> {
        let mut source = File::open(from).map_err(|e| MutationError::from_io(from, e))?;
        let expected = source
            .metadata()
            .map_err(|e| MutationError::from_io(from, e))?
            .len();

        let mut destination = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(to)
            .map_err(|e| MutationError::from_io(to, e))?;

        let copied = io::copy(&mut source, &mut destination)
            .and_then(|copied| destination.sync_all().map(|()| copied));
        drop(destination);

        let copied = match copied {
            Ok(copied) => copied,
            Err(e) => {
                let _ = fs::remove_file(to);
                return Err(MutationError::Io {
                    path: to.to_path_buf(),
                    source: e,
                });
            }
        };

        let on_disk = fs::metadata(to).map(|m| m.len()).unwrap_or(copied);
        if copied != expected || on_disk != expected {
            let _ = fs::remove_file(to);
            return Err(MutationError::CopyVerificationMismatch {
                path: from.to_path_buf(),
                expected,
                copied: on_disk.min(copied),
            });
        }

        if let Err(e) = fs::remove_file(from) {
            // Keep exactly one copy: the original.
            let _ = fs::remove_file(to);
            return Err(MutationError::from_io(from, e));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_apply_creates_directory_and_moves() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("test.txt");
        fs::write(&from, "test content").unwrap();
        let to = temp_dir.path().join("2024").join("test.txt");

        let outcome = MutationExecutor::new(false).execute(&from, &to);
        assert_eq!(
            outcome,
            Outcome::Applied {
                final_path: to.clone()
            }
        );
        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "test content");
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("test.txt");
        fs::write(&from, "x").unwrap();
        let to = temp_dir.path().join("Small").join("test.txt");

        let outcome = MutationExecutor::new(true).execute(&from, &to);
        assert_eq!(
            outcome,
            Outcome::Simulated {
                would_be_path: to.clone()
            }
        );
        assert!(from.exists());
        assert!(!to.parent().unwrap().exists());
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("a.txt");
        let to = temp_dir.path().join("b.txt");
        fs::write(&from, "new").unwrap();
        fs::write(&to, "old").unwrap();

        let err = MutationExecutor::apply(&from, &to).unwrap_err();
        assert_eq!(err.kind(), FailureKind::DestinationExists);
        assert_eq!(fs::read_to_string(&to).unwrap(), "old");
        assert!(from.exists());
    }

    #[test]
    fn test_vanished_source() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("gone.txt");
        let to = temp_dir.path().join("dest").join("gone.txt");

        match MutationExecutor::new(false).execute(&from, &to) {
            Outcome::Failed { error_kind, .. } => {
                assert_eq!(error_kind, FailureKind::SourceVanished)
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_destination_dir_blocked_by_file() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("a.txt");
        fs::write(&from, "x").unwrap();
        fs::write(temp_dir.path().join("2020"), "not a dir").unwrap();
        let to = temp_dir.path().join("2020").join("a.txt");

        let err = MutationExecutor::apply(&from, &to).unwrap_err();
        assert_eq!(err.kind(), FailureKind::DestinationDirUnavailable);
        assert!(from.exists());
    }

    #[test]
    fn test_copy_fallback_moves_content() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("a.bin");
        let to = temp_dir.path().join("b.bin");
        fs::write(&from, vec![7u8; 4096]).unwrap();

        MutationExecutor::copy_then_remove(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), vec![7u8; 4096]);
    }

    #[test]
    fn test_copy_fallback_never_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("a.bin");
        let to = temp_dir.path().join("b.bin");
        fs::write(&from, "new").unwrap();
        fs::write(&to, "old").unwrap();

        let err = MutationExecutor::copy_then_remove(&from, &to).unwrap_err();
        assert_eq!(err.kind(), FailureKind::DestinationExists);
        assert_eq!(fs::read_to_string(&to).unwrap(), "old");
        assert!(from.exists());
    }

    #[test]
    fn test_outcome_new_location() {
        let path = PathBuf::from("/r/2020/a.txt");
        assert_eq!(
            Outcome::Applied {
                final_path: path.clone()
            }
            .new_location(),
            Some(path.as_path())
        );
        assert_eq!(
            Outcome::Skipped {
                reason: SkipReason::NoTimestamp
            }
            .new_location(),
            None
        );
    }
}
