//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output, including colored output,
//! progress tracking, and formatted tables. The library never prints; only the
//! binary goes through this module.

use crate::engine::RunObserver;
use crate::executor::{ApplyResult, Outcome};
use crate::operation::OperationKind;
use crate::summary::{OperationSummary, RunSummary};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

/// Manages all CLI output with consistent styling and formatting.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use reshelf::output::OutputFormatter;
    /// OutputFormatter::success("Folder reorganized");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Creates a progress bar for one operation pass.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use reshelf::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(100, "segregate_by_year");
    /// pb.inc(1);
    /// pb.finish_with_message("done");
    /// ```
    pub fn create_progress_bar(total: u64, prefix: &str) -> ProgressBar {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} {prefix:<24} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map(|style| style.progress_chars("█▓░"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        let pb = ProgressBar::new(total);
        pb.set_style(style);
        pb.set_prefix(prefix.to_string());
        pb
    }

    /// Prints the per-operation table of a finished run.
    pub fn summary_table(summary: &RunSummary) {
        Self::header("SUMMARY");

        let width = summary
            .operations
            .keys()
            .map(|kind| kind.id().len())
            .max()
            .unwrap_or(0)
            .max("Operation".len());
        let changed_header = if summary.dry_run { "Would move" } else { "Moved" };

        println!(
            "{:<width$} | {:>10} | {:>7} | {:>6} | {}",
            "Operation".bold(),
            changed_header.bold(),
            "Skipped".bold(),
            "Failed".bold(),
            "Log".bold(),
        );
        println!("{}", "-".repeat(width + 45));

        for op in summary.operations.values() {
            let changed = if summary.dry_run {
                op.count_simulated
            } else {
                op.count_applied
            };
            let failed = if op.count_failed > 0 {
                format!("{:>6}", op.count_failed).red()
            } else {
                format!("{:>6}", op.count_failed).normal()
            };
            println!(
                "{:<width$} | {} | {:>7} | {} | {}",
                op.kind.id(),
                format!("{changed:>10}").green(),
                op.count_skipped,
                failed,
                op.log_file_name,
            );
        }
        println!("{}", "-".repeat(width + 45));

        if let Some(first) = summary.operations.values().next() {
            if let Some(dir) = first.log_path.parent() {
                Self::info(&format!("Logs written to {}", dir.display()));
            }
        }
    }

    /// Prints each operation's one-line message.
    pub fn operation_messages(summary: &RunSummary) {
        for op in summary.operations.values() {
            let message = op.message(summary.dry_run);
            if op.count_failed > 0 {
                Self::warning(&message);
            } else {
                Self::success(&message);
            }
        }
    }
}

/// Drives one progress bar per operation.
pub struct ProgressObserver {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(bar) = guard.as_ref() {
                f(bar);
            }
        }
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl RunObserver for ProgressObserver {
    fn scan_complete(&self, files: usize) {
        OutputFormatter::info(&format!("Found {files} file(s)"));
    }

    fn operation_started(&self, kind: OperationKind, files: usize) {
        let pb = OutputFormatter::create_progress_bar(files as u64, kind.id());
        if let Ok(mut guard) = self.bar.lock() {
            *guard = Some(pb);
        }
    }

    fn file_done(&self, _kind: OperationKind, result: &ApplyResult) {
        self.with_bar(|bar| {
            if let Outcome::Failed { error_kind, .. } = &result.outcome {
                bar.set_message(format!("{error_kind}: {}", result.location.display()));
            }
            bar.inc(1);
        });
    }

    fn operation_finished(&self, summary: &OperationSummary) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(bar) = guard.take() {
                bar.finish_with_message(format!("{} failed", summary.count_failed));
            }
        }
    }
}
