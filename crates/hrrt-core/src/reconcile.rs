//! Bring the index in line with what a backend physically holds. Only the
//! index is ever modified here.

use std::fmt;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::archive::Archive;
use crate::backend::StorageBackend;
use crate::error::Error;
use crate::hasher::ChecksumService;
use crate::model::Location;
use crate::progress::ProgressReporter;
use crate::storage::Index;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub records_added: usize,
    pub records_existing: usize,
    pub records_pruned: usize,
    pub scans_removed: usize,
    pub subjects_removed: usize,
    pub errors: usize,
}

impl ReconcileSummary {
    pub fn absorb(&mut self, other: &ReconcileSummary) {
        self.records_added += other.records_added;
        self.records_existing += other.records_existing;
        self.records_pruned += other.records_pruned;
        self.scans_removed += other.scans_removed;
        self.subjects_removed += other.subjects_removed;
        self.errors += other.errors;
    }

    pub fn is_noop(&self) -> bool {
        self.records_added == 0
            && self.records_pruned == 0
            && self.scans_removed == 0
            && self.subjects_removed == 0
    }
}

impl fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} already indexed, {} stale removed, {} scans and {} subjects orphaned, {} errors",
            self.records_added,
            self.records_existing,
            self.records_pruned,
            self.scans_removed,
            self.subjects_removed,
            self.errors
        )
    }
}

pub struct IndexReconciler<'a> {
    index: &'a Index,
    compute_md5: bool,
}

impl<'a> IndexReconciler<'a> {
    pub fn new(index: &'a Index, compute_md5: bool) -> Self {
        Self { index, compute_md5 }
    }

    /// All three steps for one backend, in order.
    pub fn reconcile(
        &self,
        archive: &Archive,
        reporter: &dyn ProgressReporter,
    ) -> Result<ReconcileSummary, Error> {
        let backend = archive.backend().as_ref();
        reporter.on_reconcile_start(backend.kind().as_str());
        let start = Instant::now();

        let mut summary = self.archive_to_index(archive);
        summary.absorb(&self.index_to_archive(backend)?);
        summary.absorb(&self.prune_orphans()?);

        info!(
            "Reconciled {} ({}) in {:.2}s: {}",
            backend.root(),
            backend.kind(),
            start.elapsed().as_secs_f64(),
            summary
        );
        reporter.on_reconcile_complete(
            backend.kind().as_str(),
            summary.records_added,
            summary.records_pruned,
        );
        Ok(summary)
    }

    /// Index every registered file that has no record yet, creating its
    /// scan and subject as needed. A failing file is logged and skipped.
    pub fn archive_to_index(&self, archive: &Archive) -> ReconcileSummary {
        let backend = archive.backend().as_ref();
        let checksums = ChecksumService::new(self.index, self.compute_md5);
        let mut summary = ReconcileSummary::default();

        for registered in archive.files() {
            let mut file = registered.clone();
            let result = (|| -> Result<bool, Error> {
                let Some(required) = file.required_fields() else {
                    debug!("{} is absent, not indexing", file.full_path().display());
                    return Ok(false);
                };
                if self.index.find_file(&required)?.is_some() {
                    return Ok(false);
                }
                checksums.ensure_checksums(backend, &mut file)?;
                self.index.record_file(&file)
            })();
            match result {
                Ok(true) => summary.records_added += 1,
                Ok(false) => summary.records_existing += 1,
                Err(e) => {
                    error!(
                        "Indexing {} on {} failed: {}",
                        registered.full_path().display(),
                        backend.kind(),
                        e
                    );
                    summary.errors += 1;
                }
            }
        }
        summary
    }

    /// Remove records of this host under this backend's root whose file is
    /// gone or no longer matches in size or modification time.
    pub fn index_to_archive(&self, backend: &dyn StorageBackend) -> Result<ReconcileSummary, Error> {
        let root = Path::new(backend.root());
        let mut summary = ReconcileSummary::default();

        for record in self.index.files_for_host(backend.hostname())? {
            if !Path::new(&record.file_path).starts_with(root) {
                continue;
            }
            let location = Location::new(record.file_path.clone(), record.file_name.clone());
            let current = match backend.stat(&location) {
                Ok(stat) => stat,
                Err(e) => {
                    error!(
                        "Checking {} on {} failed: {}",
                        location.full_path().display(),
                        backend.kind(),
                        e
                    );
                    summary.errors += 1;
                    continue;
                }
            };
            let matches = current.is_some_and(|stat| {
                stat.size as i64 == record.file_size && stat.modified == record.file_modified
            });
            if !matches {
                debug!(
                    "Removing stale record {} for {}",
                    record.id,
                    location.full_path().display()
                );
                self.index.delete_file(record.id)?;
                summary.records_pruned += 1;
            }
        }
        Ok(summary)
    }

    /// Scans with no files go first, then subjects with no scans.
    pub fn prune_orphans(&self) -> Result<ReconcileSummary, Error> {
        let scans_removed = self.index.delete_orphan_scans()?;
        let subjects_removed = self.index.delete_orphan_subjects()?;
        Ok(ReconcileSummary {
            scans_removed,
            subjects_removed,
            ..Default::default()
        })
    }
}
