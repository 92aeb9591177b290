//! Orchestration of a reorganization run.
//!
//! A run scans the root once, probes every file on a bounded worker pool and
//! then executes the selected operations one after another. Each operation
//! classifies every file, resolves collisions serially in path order,
//! executes the mutations in parallel and writes the results to its audit log
//! in path order.
//!
//! Operations share the scan snapshot. When an earlier operation moves a file
//! (or simulates the move in a dry run) later operations see the file at its
//! new location, so a preview reports the same paths an apply would produce.

use crate::audit::{AuditError, AuditLogger};
use crate::classifier::{ClassifierRegistry, Decision, SkipReason};
use crate::collision::{CollisionResolver, PathOverlay};
use crate::config::{CompiledFilters, Config, ConfigError};
use crate::executor::{ApplyResult, FailureKind, MutationExecutor, Outcome};
use crate::operation::{OperationKind, OperationParseError, OperationSpec};
use crate::probe::{FileMetadataProbe, FileRecord};
use crate::scan::Scanner;
use crate::summary::{OperationSummary, RunSummary};
use chrono::Local;
use rayon::prelude::*;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use uuid::Uuid;

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid folder {}: {reason}", .path.display())]
    InvalidRoot { path: PathBuf, reason: String },
    #[error("no operations selected")]
    NoOperations,
    #[error(transparent)]
    UnknownOperation(#[from] OperationParseError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("audit log unavailable: {0}")]
    Audit(#[from] AuditError),
    #[error("cannot resolve log directory {}: {source}", .path.display())]
    LogDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Shared flag for stopping a run between files.
///
/// # Examples
///
/// ```
/// use reshelf::{CancelToken, OperationKind, RunRequest};
///
/// let token = CancelToken::new();
/// let request =
///     RunRequest::new("/data", [OperationKind::SmartRename]).cancel_token(token.clone());
/// token.cancel();
/// assert!(request.cancel.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Files already being moved finish first.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Inputs of one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Folder to reorganize.
    pub root: PathBuf,
    /// Operations in execution order. Repeats run once.
    pub operations: Vec<OperationKind>,
    /// Simulate every mutation instead of touching the disk.
    pub dry_run: bool,
    /// Token checked between files.
    pub cancel: CancelToken,
}

impl RunRequest {
    pub fn new(
        root: impl Into<PathBuf>,
        operations: impl IntoIterator<Item = OperationKind>,
    ) -> Self {
        Self {
            root: root.into(),
            operations: operations.into_iter().collect(),
            dry_run: false,
            cancel: CancelToken::default(),
        }
    }

    /// Builds a request from operation identifiers such as `"smart_rename"`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownOperation`] for the first identifier that
    /// does not name an operation.
    pub fn from_identifiers<S: AsRef<str>>(
        root: impl Into<PathBuf>,
        identifiers: &[S],
    ) -> Result<Self, EngineError> {
        let operations = identifiers
            .iter()
            .map(|id| id.as_ref().parse::<OperationKind>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(root, operations))
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Selected operations in order, without duplicates.
    pub fn specs(&self) -> Vec<OperationSpec> {
        let mut specs: Vec<OperationSpec> = Vec::with_capacity(self.operations.len());
        for &kind in &self.operations {
            if !specs.iter().any(|spec| spec.kind == kind) {
                specs.push(OperationSpec {
                    kind,
                    dry_run: self.dry_run,
                });
            }
        }
        specs
    }
}

/// Run-scoped state passed to every stage.
#[derive(Debug)]
pub struct RunContext<'a> {
    pub root: PathBuf,
    pub run_id: String,
    pub dry_run: bool,
    pub log_dir: PathBuf,
    pub config: &'a Config,
    pub cancel: CancelToken,
}

/// Progress callbacks. `file_done` is called from worker threads.
pub trait RunObserver: Sync {
    fn scan_complete(&self, _files: usize) {}
    fn operation_started(&self, _kind: OperationKind, _files: usize) {}
    fn file_done(&self, _kind: OperationKind, _result: &ApplyResult) {}
    fn operation_finished(&self, _summary: &OperationSummary) {}
}

/// Observer that ignores every event.
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

struct ScannedFile {
    source: PathBuf,
    probed: Result<FileRecord, String>,
}

enum Step {
    Settled(Outcome),
    Mutate { to: PathBuf },
}

struct PlannedFile {
    source: PathBuf,
    location: PathBuf,
    step: Step,
}

/// Where files are after the operations executed so far.
#[derive(Default)]
struct Ledger {
    locations: HashMap<PathBuf, PathBuf>,
    overlay: PathOverlay,
}

impl Ledger {
    fn location<'a>(&'a self, source: &'a Path) -> &'a Path {
        self.locations.get(source).map_or(source, PathBuf::as_path)
    }

    fn update(&mut self, result: &ApplyResult, dry_run: bool) {
        if let Some(new_location) = result.outcome.new_location() {
            if dry_run {
                self.overlay.record_move(&result.location, new_location);
            }
            self.locations
                .insert(result.source.clone(), new_location.to_path_buf());
        }
    }
}

/// Runs reorganization requests against one configuration.
pub struct ReorganizationEngine {
    config: Config,
    filters: CompiledFilters,
    registry: ClassifierRegistry,
    probe: FileMetadataProbe,
    pool: rayon::ThreadPool,
}

impl ReorganizationEngine {
    /// Validates the configuration and prepares the worker pool.
    pub fn new(config: Config) -> Result<Self, EngineError> {
        config.validate()?;
        let filters = config.compile_filters()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_count())
            .thread_name(|i| format!("reshelf-worker-{i}"))
            .build()?;

        Ok(Self {
            registry: ClassifierRegistry::from_config(&config),
            probe: FileMetadataProbe::new(config.probe.signature_bytes),
            filters,
            pool,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs a request without progress reporting.
    pub fn run(&self, request: &RunRequest) -> Result<RunSummary, EngineError> {
        self.run_observed(request, &NoopObserver)
    }

    /// Runs a request, reporting progress to `observer`.
    ///
    /// # Errors
    ///
    /// Fails before touching anything when the root or the operation list is
    /// invalid, and aborts when an audit log cannot be written. Per-file
    /// problems are reported in the summary instead.
    pub fn run_observed(
        &self,
        request: &RunRequest,
        observer: &dyn RunObserver,
    ) -> Result<RunSummary, EngineError> {
        let specs = request.specs();
        if specs.is_empty() {
            return Err(EngineError::NoOperations);
        }

        let ctx = RunContext {
            root: resolve_root(&request.root)?,
            run_id: new_run_id(),
            dry_run: request.dry_run,
            log_dir: self.resolve_log_dir()?,
            config: &self.config,
            cancel: request.cancel.clone(),
        };
        tracing::info!(
            root = %ctx.root.display(),
            run_id = %ctx.run_id,
            dry_run = ctx.dry_run,
            operations = ?specs.iter().map(|s| s.kind.id()).collect::<Vec<_>>(),
            "starting run"
        );

        let snapshot = self.scan(&ctx);
        observer.scan_complete(snapshot.len());

        let mut ledger = Ledger::default();
        let mut operations = BTreeMap::new();
        let mut cancelled = false;

        for spec in specs {
            if ctx.cancel.is_cancelled() {
                cancelled = true;
                tracing::info!(
                    operation = %spec.kind,
                    "run cancelled, skipping remaining operations"
                );
                break;
            }
            let summary = self.run_operation(&ctx, spec, &snapshot, &mut ledger, observer)?;
            observer.operation_finished(&summary);
            operations.insert(spec.kind, summary);
        }
        cancelled |= ctx.cancel.is_cancelled();

        Ok(RunSummary {
            run_id: ctx.run_id,
            dry_run: ctx.dry_run,
            cancelled,
            operations,
        })
    }

    fn resolve_log_dir(&self) -> Result<PathBuf, EngineError> {
        let configured = &self.config.log_dir;
        let absolute = if configured.is_absolute() {
            configured.clone()
        } else {
            std::env::current_dir()
                .map_err(|e| EngineError::LogDir {
                    path: configured.clone(),
                    source: e,
                })?
                .join(configured)
        };
        Ok(fs::canonicalize(&absolute).unwrap_or(absolute))
    }

    fn scan(&self, ctx: &RunContext<'_>) -> Vec<ScannedFile> {
        let paths = Scanner::new(&self.filters)
            .exclude_dir(&ctx.log_dir)
            .scan(&ctx.root);

        self.pool.install(|| {
            paths
                .into_par_iter()
                .map(|source| {
                    let probed = self.probe.probe(&source).map_err(|e| {
                        tracing::warn!(path = %source.display(), error = %e, "probe failed");
                        e.to_string()
                    });
                    ScannedFile { source, probed }
                })
                .collect()
        })
    }

    fn run_operation(
        &self,
        ctx: &RunContext<'_>,
        spec: OperationSpec,
        snapshot: &[ScannedFile],
        ledger: &mut Ledger,
        observer: &dyn RunObserver,
    ) -> Result<OperationSummary, EngineError> {
        let kind = spec.kind;
        let mut logger = AuditLogger::open(&ctx.log_dir, &ctx.run_id, kind, spec.dry_run)?;
        observer.operation_started(kind, snapshot.len());

        let planned = self.plan(ctx, kind, snapshot, ledger);

        let executor = MutationExecutor::new(spec.dry_run);
        let results: Vec<ApplyResult> = self.pool.install(|| {
            planned
                .into_par_iter()
                .map(|file| {
                    let outcome = match file.step {
                        Step::Settled(outcome) => outcome,
                        Step::Mutate { .. } if ctx.cancel.is_cancelled() => Outcome::Skipped {
                            reason: SkipReason::Cancelled,
                        },
                        Step::Mutate { to } => executor.execute(&file.location, &to),
                    };
                    let result = ApplyResult {
                        source: file.source,
                        location: file.location,
                        outcome,
                    };
                    observer.file_done(kind, &result);
                    result
                })
                .collect()
        });

        let mut summary = OperationSummary::new(kind, logger.path().to_path_buf());
        for result in results {
            logger.record(&result)?;
            if let Outcome::Failed { error_kind, detail } = &result.outcome {
                tracing::warn!(
                    operation = %kind,
                    path = %result.location.display(),
                    error_kind = %error_kind,
                    detail = %detail,
                    "file failed"
                );
            }
            ledger.update(&result, spec.dry_run);
            summary.tally(result);
        }
        logger.finish()?;

        tracing::info!(
            operation = %kind,
            applied = summary.count_applied,
            simulated = summary.count_simulated,
            skipped = summary.count_skipped,
            failed = summary.count_failed,
            log = %summary.log_file_name,
            "operation finished"
        );
        Ok(summary)
    }

    /// Classifies and resolves every file, in snapshot (path) order.
    fn plan(
        &self,
        ctx: &RunContext<'_>,
        kind: OperationKind,
        snapshot: &[ScannedFile],
        ledger: &Ledger,
    ) -> Vec<PlannedFile> {
        let mut resolver =
            CollisionResolver::new(ctx.config.collisions.max_attempts, &ledger.overlay);

        snapshot
            .iter()
            .map(|file| {
                let location = ledger.location(&file.source).to_path_buf();
                let step = match &file.probed {
                    Err(detail) => Step::Settled(Outcome::Failed {
                        error_kind: FailureKind::Probe,
                        detail: detail.clone(),
                    }),
                    Ok(record) => {
                        let record = if location == record.path {
                            Cow::Borrowed(record)
                        } else {
                            Cow::Owned(record.relocated(location.clone()))
                        };
                        let decision = self.registry.decide(kind, &record, &ctx.root);
                        tracing::debug!(
                            operation = %kind,
                            path = %location.display(),
                            ?decision,
                            "classified"
                        );
                        resolve(&mut resolver, &decision, &location)
                    }
                };
                PlannedFile {
                    source: file.source.clone(),
                    location,
                    step,
                }
            })
            .collect()
    }
}

fn resolve(resolver: &mut CollisionResolver<'_>, decision: &Decision, location: &Path) -> Step {
    if let Decision::Skip { reason } = decision {
        return Step::Settled(Outcome::Skipped { reason: *reason });
    }
    let Some(proposed) = decision.destination(location) else {
        return Step::Settled(Outcome::Skipped {
            reason: SkipReason::UnsafeDestination,
        });
    };
    match resolver.resolve(&proposed) {
        Ok(to) => Step::Mutate { to },
        Err(e) => Step::Settled(Outcome::Failed {
            error_kind: FailureKind::CollisionExhausted,
            detail: e.to_string(),
        }),
    }
}

fn resolve_root(root: &Path) -> Result<PathBuf, EngineError> {
    let invalid = |reason: String| EngineError::InvalidRoot {
        path: root.to_path_buf(),
        reason,
    };
    let canonical = fs::canonicalize(root).map_err(|e| invalid(e.to_string()))?;
    if !canonical.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }
    fs::read_dir(&canonical).map_err(|e| invalid(e.to_string()))?;
    Ok(canonical)
}

fn new_run_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Local::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
}
