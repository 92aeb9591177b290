//! Read-only metadata extraction for scanned files.
//!
//! The probe gathers everything a classifier needs up front (size, timestamp,
//! stored extension, content signature and, for video containers, the
//! playback duration) so that classification itself never touches the disk.
use crate::media::{self, Container};
use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that stop a single file from being probed.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The file disappeared between the scan and the probe.
    #[error("{} vanished before it could be probed", .path.display())]
    Vanished { path: PathBuf },
    /// The process may not read the file.
    #[error("permission denied reading {}", .path.display())]
    PermissionDenied { path: PathBuf },
    /// The file exists but reading it failed.
    #[error("could not read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The entry is not a regular file (or is a dangling link).
    #[error("{} is not a regular file", .path.display())]
    NotAFile { path: PathBuf },
}

impl ProbeError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => Self::Vanished { path },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Unreadable { path, source },
        }
    }

    /// Path of the file that failed.
    pub fn path(&self) -> &Path {
        match self {
            Self::Vanished { path }
            | Self::PermissionDenied { path }
            | Self::Unreadable { path, .. }
            | Self::NotAFile { path } => path,
        }
    }
}

/// Content signature detected from the leading bytes of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub mime: String,
    /// Canonical extension for the detected format, without the dot.
    pub extension: String,
    /// Signature was matched by a text heuristic rather than magic bytes.
    pub textual: bool,
}

/// Snapshot of one file taken at scan time.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Absolute path where the file currently lives.
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Local>>,
    /// Extension as stored in the file name, without the dot.
    pub extension: Option<String>,
    pub signature: Option<Signature>,
    /// Only present for recognized video containers.
    pub duration: Option<Duration>,
}

impl FileRecord {
    /// Returns the same attributes seen at another location.
    pub fn relocated(&self, path: PathBuf) -> Self {
        let extension = path
            .file_name()
            .and_then(|name| split_file_name(&name.to_string_lossy()).1.map(str::to_string));
        Self {
            path,
            extension,
            ..self.clone()
        }
    }

    /// File name as a string, lossily converted.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Splits a file name into stem and extension.
///
/// A leading dot does not start an extension, so `.bashrc` has none. A name
/// ending in a dot has an empty extension.
///
/// # Examples
///
/// ```
/// use reshelf::probe::split_file_name;
///
/// assert_eq!(split_file_name("holiday.tar.gz"), ("holiday.tar", Some("gz")));
/// assert_eq!(split_file_name("README"), ("README", None));
/// assert_eq!(split_file_name(".bashrc"), (".bashrc", None));
/// assert_eq!(split_file_name("odd."), ("odd", Some("")));
/// ```
pub fn split_file_name(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(index) if index > 0 => (&name[..index], Some(&name[index + 1..])),
        _ => (name, None),
    }
}

/// Extracts [`FileRecord`]s from paths on disk.
#[derive(Debug, Clone)]
pub struct FileMetadataProbe {
    signature_bytes: usize,
}

impl FileMetadataProbe {
    pub fn new(signature_bytes: usize) -> Self {
        Self { signature_bytes }
    }

    /// Probes a single file.
    ///
    /// Symbolic links are followed; a link whose target is missing is
    /// reported as [`ProbeError::NotAFile`].
    ///
    /// # Errors
    ///
    /// Returns a [`ProbeError`] when the file cannot be inspected. Callers
    /// treat this as a per-file failure.
    pub fn probe(&self, path: &Path) -> Result<FileRecord, ProbeError> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound && fs::symlink_metadata(path).is_ok() => {
                return Err(ProbeError::NotAFile {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(ProbeError::from_io(path, e)),
        };
        if !metadata.is_file() {
            return Err(ProbeError::NotAFile {
                path: path.to_path_buf(),
            });
        }

        let modified = metadata.modified().ok().map(DateTime::<Local>::from);
        let extension = path
            .file_name()
            .and_then(|name| split_file_name(&name.to_string_lossy()).1.map(str::to_string));

        let file = File::open(path).map_err(|e| ProbeError::from_io(path, e))?;
        let mut reader = BufReader::new(file);

        let mut prefix = Vec::with_capacity(self.signature_bytes.min(metadata.len() as usize));
        (&mut reader)
            .take(self.signature_bytes as u64)
            .read_to_end(&mut prefix)
            .map_err(|e| ProbeError::from_io(path, e))?;

        let signature = infer::get(&prefix).map(|kind| Signature {
            mime: kind.mime_type().to_string(),
            extension: kind.extension().to_string(),
            textual: kind.matcher_type() == infer::MatcherType::Text,
        });

        // Duration parsing seeks from the start of the file on its own.
        let duration = signature
            .as_ref()
            .and_then(|sig| Container::from_mime(&sig.mime))
            .and_then(|container| media::read_duration(&mut reader, container));

        tracing::trace!(
            path = %path.display(),
            size = metadata.len(),
            mime = signature.as_ref().map(|s| s.mime.as_str()),
            ?duration,
            "probed file"
        );

        Ok(FileRecord {
            path: path.to_path_buf(),
            size: metadata.len(),
            modified,
            extension,
            signature,
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PNG_HEADER: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    fn probe() -> FileMetadataProbe {
        FileMetadataProbe::new(8192)
    }

    #[test]
    fn test_probe_png() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("picture.dat");
        fs::write(&path, PNG_HEADER).unwrap();

        let record = probe().probe(&path).unwrap();
        assert_eq!(record.size, PNG_HEADER.len() as u64);
        assert_eq!(record.extension.as_deref(), Some("dat"));
        assert!(record.modified.is_some());
        assert_eq!(record.duration, None);

        let signature = record.signature.unwrap();
        assert_eq!(signature.mime, "image/png");
        assert_eq!(signature.extension, "png");
        assert!(!signature.textual);
    }

    #[test]
    fn test_probe_unrecognized_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes");
        fs::write(&path, "just some words").unwrap();

        let record = probe().probe(&path).unwrap();
        assert_eq!(record.extension, None);
        assert!(record.signature.is_none());
    }

    #[test]
    fn test_probe_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gone.txt");

        let err = probe().probe(&path).unwrap_err();
        assert!(matches!(err, ProbeError::Vanished { .. }));
        assert_eq!(err.path(), path.as_path());
    }

    #[test]
    fn test_probe_directory_is_not_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = probe().probe(temp_dir.path()).unwrap_err();
        assert!(matches!(err, ProbeError::NotAFile { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_dangling_symlink() {
        let temp_dir = TempDir::new().unwrap();
        let link = temp_dir.path().join("broken.jpg");
        std::os::unix::fs::symlink(temp_dir.path().join("nowhere"), &link).unwrap();

        let err = probe().probe(&link).unwrap_err();
        assert!(matches!(err, ProbeError::NotAFile { .. }));
    }

    #[test]
    fn test_relocated_updates_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photo.txt");
        fs::write(&path, PNG_HEADER).unwrap();

        let record = probe().probe(&path).unwrap();
        let moved = record.relocated(temp_dir.path().join("photo.png"));
        assert_eq!(moved.extension.as_deref(), Some("png"));
        assert_eq!(moved.size, record.size);
        assert_eq!(moved.signature, record.signature);
        assert_eq!(moved.file_name(), "photo.png");
    }

    #[test]
    fn test_split_file_name() {
        assert_eq!(split_file_name("a.b.c"), ("a.b", Some("c")));
        assert_eq!(split_file_name("plain"), ("plain", None));
        assert_eq!(split_file_name("..."), ("..", Some("")));
    }
}
