//! Per-operation and per-run result summaries.

use crate::executor::{ApplyResult, Outcome};
use crate::operation::OperationKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Totals for one operation of one run.
#[derive(Debug, Clone, Serialize)]
pub struct OperationSummary {
    /// Operation these totals belong to.
    pub kind: OperationKind,
    /// Files moved or renamed on disk.
    pub count_applied: usize,
    /// Files that a dry run would have moved or renamed.
    pub count_simulated: usize,
    /// Files left alone, each with a recorded reason.
    pub count_skipped: usize,
    /// Files that could not be probed, resolved or mutated.
    pub count_failed: usize,
    /// File name of the audit log, for display.
    pub log_file_name: String,
    /// Full path of the audit log.
    pub log_path: PathBuf,
    /// Every result in path order, as written to the log.
    #[serde(skip)]
    pub results: Vec<ApplyResult>,
}

impl OperationSummary {
    pub(crate) fn new(kind: OperationKind, log_path: PathBuf) -> Self {
        let log_file_name = log_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            kind,
            count_applied: 0,
            count_simulated: 0,
            count_skipped: 0,
            count_failed: 0,
            log_file_name,
            log_path,
            results: Vec::new(),
        }
    }

    pub(crate) fn tally(&mut self, result: ApplyResult) {
        match result.outcome {
            Outcome::Applied { .. } => self.count_applied += 1,
            Outcome::Simulated { .. } => self.count_simulated += 1,
            Outcome::Skipped { .. } => self.count_skipped += 1,
            Outcome::Failed { .. } => self.count_failed += 1,
        }
        self.results.push(result);
    }

    /// Number of files the operation saw.
    pub fn total(&self) -> usize {
        self.count_applied + self.count_simulated + self.count_skipped + self.count_failed
    }

    /// Result for the file scanned at `source`, if any.
    pub fn result_for(&self, source: &std::path::Path) -> Option<&ApplyResult> {
        self.results.iter().find(|r| r.source == source)
    }

    /// One-line message in the style of the old web form's flash message.
    pub fn message(&self, dry_run: bool) -> String {
        let verb = if dry_run { "would change" } else { "changed" };
        let changed = if dry_run {
            self.count_simulated
        } else {
            self.count_applied
        };
        format!(
            "{}: {verb} {changed} file(s), skipped {}, failed {}. Log: {}",
            self.kind.label(),
            self.count_skipped,
            self.count_failed,
            self.log_file_name
        )
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Identifier shared by every audit log of this run.
    pub run_id: String,
    /// Whether the run only simulated its mutations.
    pub dry_run: bool,
    /// Set when a cancel request stopped the run early.
    pub cancelled: bool,
    /// Summaries of the operations that ran, keyed by kind.
    pub operations: BTreeMap<OperationKind, OperationSummary>,
}

impl RunSummary {
    pub fn get(&self, kind: OperationKind) -> Option<&OperationSummary> {
        self.operations.get(&kind)
    }

    /// Failed files across every operation of the run.
    pub fn total_failed(&self) -> usize {
        self.operations.values().map(|s| s.count_failed).sum()
    }
}
