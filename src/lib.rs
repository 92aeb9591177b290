//! reshelf - batch folder reorganization
//!
//! This library walks a folder, classifies every file under one or more
//! operations (segregate by year or size, move long videos, fix weird
//! extensions, clean up names) and moves or renames files accordingly. Every
//! run can be previewed with a dry run, and every operation writes a JSON-lines
//! audit log.
//!
//! ```no_run
//! use reshelf::{Config, OperationKind, ReorganizationEngine, RunRequest};
//!
//! let engine = ReorganizationEngine::new(Config::default())?;
//! let request =
//!     RunRequest::new("/path/to/folder", [OperationKind::SegregateByYear]).dry_run(true);
//! let summary = engine.run(&request)?;
//! for op in summary.operations.values() {
//!     println!("{}", op.message(summary.dry_run));
//! }
//! # Ok::<(), reshelf::EngineError>(())
//! ```

pub mod audit;
pub mod classifier;
pub mod cli;
pub mod collision;
pub mod config;
pub mod engine;
pub mod executor;
pub mod file_family;
pub mod logging;
pub mod media;
pub mod operation;
pub mod output;
pub mod probe;
pub mod scan;
pub mod summary;

pub use audit::{AuditError, AuditLogger, AuditRecord, read_log};
pub use classifier::{ClassifierRegistry, Decision, SkipReason};
pub use collision::CollisionResolver;
pub use config::{CompiledFilters, Config, ConfigError};
pub use engine::{CancelToken, EngineError, ReorganizationEngine, RunObserver, RunRequest};
pub use executor::{ApplyResult, FailureKind, MutationExecutor, Outcome};
pub use file_family::{Family, FileMapper};
pub use operation::{OperationKind, OperationSpec};
pub use probe::{FileMetadataProbe, FileRecord, ProbeError};
pub use summary::{OperationSummary, RunSummary};
