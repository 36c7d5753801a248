pub mod archive;
pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod grammar;
pub mod guard;
pub mod hasher;
pub mod model;
pub mod progress;
pub mod reconcile;
pub mod scanner;
pub mod storage;
pub mod testdata;

pub use archive::{Archive, ArchiveSummary, IngestReport};
pub use backend::{BackendKind, StorageBackend};
pub use config::{AppConfig, RunConfig, RunFlags};
pub use engine::{ArchiveEngine, Outcome, RunSummary, VerificationFailure};
pub use error::Error;
pub use progress::{ProgressReporter, SilentReporter};
pub use reconcile::{IndexReconciler, ReconcileSummary};
pub use storage::Index;
