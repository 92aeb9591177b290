//! Classification rules for every operation kind.
//!
//! A classifier looks at a [`FileRecord`] (already probed) and decides where
//! the file should go for its operation. Classifiers are pure: all metadata
//! was gathered by the probe, so nothing here touches the disk.
//!
//! The [`ClassifierRegistry`] owns one classifier per kind and enforces the
//! destination invariants for all of them: a decision never leaves the
//! scanned root and never points back at the file itself.
use crate::config::{Config, SizeSettings};
use crate::file_family::{ExtensionVerdict, FileMapper};
use crate::operation::OperationKind;
use crate::probe::{FileRecord, split_file_name};
use chrono::Datelike;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

static ILLEGAL_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[<>:"/\\|?*\x00-\x08\x0E-\x1F\x7F]"#)
        .unwrap_or_else(|e| panic!("illegal-char regex: {e}"))
});

static SEPARATOR_RUNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\s_]+").unwrap_or_else(|e| panic!("separator regex: {e}"))
});

const TRIMMED: &[char] = &[' ', '_', '-', '.'];

/// Why a file was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoTimestamp,
    NotLongOrNotVideo,
    DetectionInconclusive,
    ExtensionConsistent,
    NameAlreadyClean,
    CleanedNameEmpty,
    AlreadyInPlace,
    UnsafeDestination,
    Cancelled,
}

impl SkipReason {
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::NoTimestamp => "no_timestamp",
            SkipReason::NotLongOrNotVideo => "not_long_or_not_video",
            SkipReason::DetectionInconclusive => "detection_inconclusive",
            SkipReason::ExtensionConsistent => "extension_consistent",
            SkipReason::NameAlreadyClean => "name_already_clean",
            SkipReason::CleanedNameEmpty => "cleaned_name_empty",
            SkipReason::AlreadyInPlace => "already_in_place",
            SkipReason::UnsafeDestination => "unsafe_destination",
            SkipReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// What should happen to one file under one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Move the file, keeping its name, into this directory.
    Move { target_dir: PathBuf },
    /// Rename the file in place.
    Rename { new_name: String },
    Skip { reason: SkipReason },
}

impl Decision {
    fn skip(reason: SkipReason) -> Self {
        Decision::Skip { reason }
    }

    /// Proposed destination for a file currently at `source`.
    pub fn destination(&self, source: &Path) -> Option<PathBuf> {
        match self {
            Decision::Move { target_dir } => source.file_name().map(|name| target_dir.join(name)),
            Decision::Rename { new_name } => source.parent().map(|parent| parent.join(new_name)),
            Decision::Skip { .. } => None,
        }
    }
}

/// One rule, with the settings it needs.
#[derive(Debug, Clone)]
pub enum Classifier {
    SegregateByYear,
    SegregateBySize(SizeSettings),
    MoveLongVideos { threshold: Duration, target_dir: String },
    RenameWeirdExtensions(FileMapper),
    SmartRename,
}

impl Classifier {
    pub fn kind(&self) -> OperationKind {
        match self {
            Classifier::SegregateByYear => OperationKind::SegregateByYear,
            Classifier::SegregateBySize(_) => OperationKind::SegregateBySize,
            Classifier::MoveLongVideos { .. } => OperationKind::MoveLongVideos,
            Classifier::RenameWeirdExtensions(_) => OperationKind::RenameWeirdExtensions,
            Classifier::SmartRename => OperationKind::SmartRename,
        }
    }

    /// Applies the rule without any safety checks.
    fn classify(&self, record: &FileRecord, root: &Path) -> Decision {
        match self {
            Classifier::SegregateByYear => match record.modified {
                Some(modified) => Decision::Move {
                    target_dir: root.join(modified.year().to_string()),
                },
                None => Decision::skip(SkipReason::NoTimestamp),
            },
            Classifier::SegregateBySize(size) => match size.bucket_for(record.size) {
                Some(bucket) => Decision::Move {
                    target_dir: root.join(&bucket.name),
                },
                // Validated configs always end with an open bucket.
                None => Decision::skip(SkipReason::UnsafeDestination),
            },
            Classifier::MoveLongVideos {
                threshold,
                target_dir,
            } => match record.duration {
                Some(duration) if duration >= *threshold => Decision::Move {
                    target_dir: root.join(target_dir),
                },
                _ => Decision::skip(SkipReason::NotLongOrNotVideo),
            },
            Classifier::RenameWeirdExtensions(mapper) => weird_extension(mapper, record),
            Classifier::SmartRename => smart_rename(record),
        }
    }
}

fn weird_extension(mapper: &FileMapper, record: &FileRecord) -> Decision {
    let Some(signature) = record.signature.as_ref().filter(|sig| !sig.textual) else {
        return Decision::skip(SkipReason::DetectionInconclusive);
    };

    match mapper.verdict(&signature.mime, record.extension.as_deref()) {
        ExtensionVerdict::Inconclusive => Decision::skip(SkipReason::DetectionInconclusive),
        ExtensionVerdict::Consistent => Decision::skip(SkipReason::ExtensionConsistent),
        ExtensionVerdict::Mismatch => {
            let name = record.file_name();
            let (stem, _) = split_file_name(&name);
            Decision::Rename {
                new_name: format!("{stem}.{}", signature.extension),
            }
        }
    }
}

fn smart_rename(record: &FileRecord) -> Decision {
    let name = record.file_name();
    let (stem, extension) = split_file_name(&name);
    let cleaned = normalize_stem(stem);

    if cleaned.is_empty() {
        return Decision::skip(SkipReason::CleanedNameEmpty);
    }
    if cleaned == stem {
        return Decision::skip(SkipReason::NameAlreadyClean);
    }

    let new_name = match extension {
        Some(ext) => format!("{cleaned}.{ext}"),
        None => cleaned.into_owned(),
    };
    Decision::Rename { new_name }
}

/// Cleans a file stem for use on any common filesystem.
///
/// Characters that are illegal on Windows or are control codes are removed.
/// Each run of whitespace and underscores becomes a single space when the run
/// contained whitespace, or a single underscore otherwise. Spaces,
/// underscores, dashes and dots are trimmed from both ends.
///
/// # Examples
///
/// ```
/// use reshelf::classifier::normalize_stem;
///
/// assert_eq!(normalize_stem("  my__holiday  photo?? "), "my_holiday photo");
/// assert_eq!(normalize_stem("report: final|v2"), "report finalv2");
/// assert_eq!(normalize_stem("__--__"), "");
/// ```
pub fn normalize_stem(stem: &str) -> Cow<'_, str> {
    let stripped = ILLEGAL_CHARS.replace_all(stem, "");
    let collapsed = SEPARATOR_RUNS.replace_all(&stripped, |caps: &regex::Captures<'_>| {
        if caps[0].chars().any(char::is_whitespace) {
            " "
        } else {
            "_"
        }
    });
    let trimmed = collapsed.trim_matches(TRIMMED);

    if trimmed == stem {
        Cow::Borrowed(stem)
    } else {
        Cow::Owned(trimmed.to_string())
    }
}

/// One classifier per operation kind.
#[derive(Debug, Clone)]
pub struct ClassifierRegistry {
    classifiers: [Classifier; 5],
}

impl ClassifierRegistry {
    pub fn from_config(config: &Config) -> Self {
        Self {
            classifiers: [
                Classifier::SegregateByYear,
                Classifier::SegregateBySize(config.size.clone()),
                Classifier::MoveLongVideos {
                    threshold: config.videos.threshold(),
                    target_dir: config.videos.target_dir.clone(),
                },
                Classifier::RenameWeirdExtensions(FileMapper::default()),
                Classifier::SmartRename,
            ],
        }
    }

    pub fn get(&self, kind: OperationKind) -> &Classifier {
        let index = match kind {
            OperationKind::SegregateByYear => 0,
            OperationKind::SegregateBySize => 1,
            OperationKind::MoveLongVideos => 2,
            OperationKind::RenameWeirdExtensions => 3,
            OperationKind::SmartRename => 4,
        };
        &self.classifiers[index]
    }

    /// Classifies a record and enforces the destination invariants.
    ///
    /// `root` must be the canonical scan root.
    pub fn decide(&self, kind: OperationKind, record: &FileRecord, root: &Path) -> Decision {
        let decision = self.get(kind).classify(record, root);
        let safe = match &decision {
            Decision::Skip { .. } => return decision,
            Decision::Move { target_dir } => {
                is_single_component(target_dir.strip_prefix(root).unwrap_or(Path::new("..")))
            }
            Decision::Rename { new_name } => is_single_component(Path::new(new_name)),
        };
        if !safe || !record.path.starts_with(root) {
            tracing::warn!(path = %record.path.display(), ?decision, "refusing unsafe destination");
            return Decision::skip(SkipReason::UnsafeDestination);
        }

        match decision.destination(&record.path) {
            Some(destination) if destination != record.path => decision,
            Some(_) => Decision::skip(SkipReason::AlreadyInPlace),
            None => Decision::skip(SkipReason::UnsafeDestination),
        }
    }
}

fn is_single_component(path: &Path) -> bool {
    let mut components = path.components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !path.to_string_lossy().contains(['/', '\\'])
}
