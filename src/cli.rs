//! Command-line interface for reshelf.
//!
//! This module handles:
//! - Argument parsing with `clap`
//! - Configuration loading and command-line overrides
//! - Running the engine with a progress display
//! - Printing the run summary as a table or as JSON

use crate::config::Config;
use crate::engine::{NoopObserver, ReorganizationEngine, RunObserver, RunRequest};
use crate::operation::OperationKind;
use crate::output::{OutputFormatter, ProgressObserver};
use crate::summary::RunSummary;
use clap::Parser;
use std::path::PathBuf;

const OPERATIONS_HELP: &str = "\
Operation to run. Repeat the flag or separate with commas; operations run in the given order.

  segregate_by_year         move files into <folder>/<year modified>
  segregate_by_size         move files into <folder>/<size bucket>
  move_long_videos          move long videos into <folder>/LongVideos
  rename_weird_extensions   fix extensions that do not match the content (alias: rename_files)
  smart_rename              clean up file names";

/// Batch folder reorganization.
#[derive(Debug, Parser)]
#[command(name = "reshelf", version, about)]
pub struct Cli {
    /// Folder to reorganize.
    pub folder: PathBuf,

    #[arg(
        short = 'o',
        long = "operation",
        value_name = "OP",
        required = true,
        value_delimiter = ',',
        help = "Operation to run (repeatable or comma-separated)",
        long_help = OPERATIONS_HELP
    )]
    pub operations: Vec<OperationKind>,

    /// Show what would change without touching any file.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Configuration file (default: ./.reshelfrc.toml, then ~/.config/reshelf/config.toml).
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory for audit logs, overriding the configuration.
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Print the summary as JSON instead of a table.
    #[arg(long)]
    pub json: bool,

    /// Print debug diagnostics to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Loads the configuration and applies command-line overrides.
    pub fn config(&self) -> Result<Config, String> {
        let mut config = Config::load(self.config.as_deref())
            .map_err(|e| format!("Error loading configuration: {e}"))?;
        if let Some(log_dir) = &self.log_dir {
            config.log_dir = log_dir.clone();
        }
        Ok(config)
    }

    pub fn request(&self) -> RunRequest {
        RunRequest::new(&self.folder, self.operations.iter().copied()).dry_run(self.dry_run)
    }
}

/// Runs the command described by `cli` and prints the outcome.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use reshelf::cli::{Cli, run_cli};
///
/// let cli = Cli::parse_from([
///     "reshelf",
///     "/path/to/folder",
///     "-o",
///     "segregate_by_year",
///     "--dry-run",
/// ]);
/// match run_cli(&cli) {
///     Ok(summary) => println!("run {} finished", summary.run_id),
///     Err(e) => eprintln!("Error: {e}"),
/// }
/// ```
pub fn run_cli(cli: &Cli) -> Result<RunSummary, String> {
    let engine = ReorganizationEngine::new(cli.config()?).map_err(|e| e.to_string())?;
    let request = cli.request();

    let progress = ProgressObserver::new();
    let observer: &dyn RunObserver = if cli.json { &NoopObserver } else { &progress };

    if !cli.json {
        OutputFormatter::header(&format!("Reorganizing {}", cli.folder.display()));
        if cli.dry_run {
            OutputFormatter::dry_run_notice("No files will be moved or renamed");
        }
    }

    let summary = engine
        .run_observed(&request, observer)
        .map_err(|e| e.to_string())?;

    if cli.json {
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| format!("Error serializing summary: {e}"))?;
        println!("{json}");
    } else {
        OutputFormatter::operation_messages(&summary);
        OutputFormatter::summary_table(&summary);
        if summary.cancelled {
            OutputFormatter::warning("Run was cancelled before all operations finished");
        }
        let failed = summary.total_failed();
        if failed > 0 {
            OutputFormatter::warning(&format!(
                "{failed} file(s) could not be processed, see the audit logs for details"
            ));
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_operations() {
        let cli = Cli::try_parse_from([
            "reshelf",
            "/data",
            "-o",
            "segregate_by_year,move_long_videos",
            "--operation",
            "rename_files",
            "-n",
        ])
        .unwrap();

        assert_eq!(cli.folder, PathBuf::from("/data"));
        assert_eq!(
            cli.operations,
            vec![
                OperationKind::SegregateByYear,
                OperationKind::MoveLongVideos,
                OperationKind::RenameWeirdExtensions,
            ]
        );
        assert!(cli.dry_run);
        assert!(cli.request().dry_run);
    }

    #[test]
    fn test_unknown_operation_is_rejected() {
        assert!(Cli::try_parse_from(["reshelf", "/data", "-o", "shuffle"]).is_err());
    }

    #[test]
    fn test_operation_is_required() {
        assert!(Cli::try_parse_from(["reshelf", "/data"]).is_err());
    }

    #[test]
    fn test_log_dir_override() {
        let cli = Cli::try_parse_from([
            "reshelf",
            "/data",
            "-o",
            "smart_rename",
            "--config",
            "/non/existent.toml",
        ])
        .unwrap();
        assert!(cli.config().is_err());

        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("reshelf.toml");
        std::fs::write(&config_path, "log_dir = \"from-file\"").unwrap();
        let config_arg = config_path.to_string_lossy().into_owned();
        let cli = Cli::try_parse_from([
            "reshelf",
            "/data",
            "-o",
            "smart_rename",
            "--config",
            config_arg.as_str(),
            "--log-dir",
            "/tmp/override",
        ])
        .unwrap();
        assert_eq!(cli.config().unwrap().log_dir, PathBuf::from("/tmp/override"));
    }
}
