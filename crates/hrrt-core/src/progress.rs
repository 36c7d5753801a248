/// Trait for reporting run progress.
///
/// The CLI implements it with indicatif bars. All methods default to no-ops.
pub trait ProgressReporter: Send + Sync {
    fn on_ingest_start(&self, _backend: &str) {}
    fn on_ingest_complete(&self, _backend: &str, _files: usize, _duration_secs: f64) {}
    fn on_propagate_start(&self, _dest: &str, _total_files: usize) {}
    fn on_propagate_progress(&self, _files_done: usize, _total_files: usize) {}
    fn on_propagate_complete(&self, _dest: &str, _copied: usize, _duration_secs: f64) {}
    fn on_reconcile_start(&self, _backend: &str) {}
    fn on_reconcile_complete(&self, _backend: &str, _added: usize, _pruned: usize) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
