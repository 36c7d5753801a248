use hrrt_core::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Ingest: spinner (entry count unknown until listing finishes)
/// - Propagate: progress bar over the source files
/// - Reconcile: spinner
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.lock();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.lock().take() {
            pb.finish_and_clear();
        }
    }

    fn spinner(&self, message: String) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_chars(TICK_CHARS));
        }
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }
}

impl ProgressReporter for CliReporter {
    fn on_ingest_start(&self, backend: &str) {
        self.spinner(format!("Reading {} archive...", backend));
    }

    fn on_ingest_complete(&self, backend: &str, files: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m {} archive read: {} files in {:.2}s",
            backend, files, duration_secs
        );
    }

    fn on_propagate_start(&self, dest: &str, total_files: usize) {
        let pb = ProgressBar::new(total_files as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "  {spinner:.cyan} {msg} [{bar:30.cyan/dim}] {pos}/{len} files ({eta} remaining)",
        ) {
            pb.set_style(style.progress_chars("━╸─").tick_chars(TICK_CHARS));
        }
        pb.set_message(format!("Copying to {}", dest));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_propagate_progress(&self, files_done: usize, total_files: usize) {
        if let Some(pb) = self.lock().as_ref() {
            if pb.length() != Some(total_files as u64) {
                pb.set_length(total_files as u64);
            }
            pb.set_position(files_done as u64);
        }
    }

    fn on_propagate_complete(&self, dest: &str, copied: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Copy to {} complete: {} files copied in {:.2}s",
            dest, copied, duration_secs
        );
    }

    fn on_reconcile_start(&self, backend: &str) {
        self.spinner(format!("Reconciling index with {} archive...", backend));
    }

    fn on_reconcile_complete(&self, backend: &str, added: usize, pruned: usize) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m {} reconciled: {} records added, {} removed",
            backend, added, pruned
        );
    }
}
