//! Operation kinds a run can select.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The identifier did not name a known operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown operation '{0}' (expected one of: {known})", known = OperationKind::identifiers())]
pub struct OperationParseError(pub String);

/// One of the reorganization rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    SegregateByYear,
    SegregateBySize,
    MoveLongVideos,
    #[serde(alias = "rename_files")]
    RenameWeirdExtensions,
    SmartRename,
}

impl OperationKind {
    /// Every kind, in the order they are listed to users.
    pub const ALL: [OperationKind; 5] = [
        OperationKind::SegregateByYear,
        OperationKind::SegregateBySize,
        OperationKind::MoveLongVideos,
        OperationKind::RenameWeirdExtensions,
        OperationKind::SmartRename,
    ];

    /// Stable identifier used in log file names and on the command line.
    pub fn id(&self) -> &'static str {
        match self {
            OperationKind::SegregateByYear => "segregate_by_year",
            OperationKind::SegregateBySize => "segregate_by_size",
            OperationKind::MoveLongVideos => "move_long_videos",
            OperationKind::RenameWeirdExtensions => "rename_weird_extensions",
            OperationKind::SmartRename => "smart_rename",
        }
    }

    /// Human-readable name.
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::SegregateByYear => "Segregate by year",
            OperationKind::SegregateBySize => "Segregate by size",
            OperationKind::MoveLongVideos => "Move long videos",
            OperationKind::RenameWeirdExtensions => "Rename weird extensions",
            OperationKind::SmartRename => "Smart rename",
        }
    }

    fn identifiers() -> String {
        Self::ALL
            .iter()
            .map(OperationKind::id)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for OperationKind {
    type Err = OperationParseError;

    /// Parses an identifier. Matching ignores case and treats `-` like `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        if normalized == "rename_files" {
            return Ok(OperationKind::RenameWeirdExtensions);
        }
        Self::ALL
            .into_iter()
            .find(|kind| kind.id() == normalized)
            .ok_or_else(|| OperationParseError(s.to_string()))
    }
}

/// One selected operation together with the run-wide dry-run flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSpec {
    pub kind: OperationKind,
    pub dry_run: bool,
}
