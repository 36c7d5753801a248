use dashmap::DashMap;
use rayon::prelude::*;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info};

use crate::archive::{Archive, IngestReport};
use crate::backend::{BackendKind, StorageBackend};
use crate::config::RunConfig;
use crate::error::Error;
use crate::hasher::ChecksumService;
use crate::model::ScanFile;
use crate::progress::ProgressReporter;
use crate::storage::Index;

/// What one propagation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Copied,
    AlreadyPresent,
    /// Dummy mode: a copy was needed but not made.
    WouldCopy,
}

#[derive(Debug, Clone)]
pub struct Propagated {
    pub outcome: Outcome,
    /// The destination file, with physical attributes and, once copied,
    /// checksums.
    pub file: ScanFile,
}

/// Batch-level counts printed at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files_seen: usize,
    pub copied: usize,
    pub skipped: usize,
    pub would_copy: usize,
    pub errors: usize,
}

impl RunSummary {
    pub fn absorb(&mut self, other: &RunSummary) {
        self.files_seen += other.files_seen;
        self.copied += other.copied;
        self.skipped += other.skipped;
        self.would_copy += other.would_copy;
        self.errors += other.errors;
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} seen, {} copied, {} skipped, {} errors",
            self.files_seen, self.copied, self.skipped, self.errors
        )?;
        if self.would_copy > 0 {
            write!(f, ", {} would copy", self.would_copy)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No file for this scan and class on the destination.
    Missing,
    /// Present, but not a copy of the source.
    NotCopy,
    /// The copy check itself failed.
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationFailure {
    pub source: String,
    pub expected: String,
    pub reason: FailureReason,
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            FailureReason::Missing => write!(f, "{}: missing {}", self.source, self.expected),
            FailureReason::NotCopy => write!(f, "{}: {} is not a copy", self.source, self.expected),
            FailureReason::Unreadable(e) => {
                write!(f, "{}: cannot check {}: {}", self.source, self.expected, e)
            }
        }
    }
}

/// Moves scanner files between backends and keeps the index in step.
pub struct ArchiveEngine<'a> {
    index: &'a Index,
    config: &'a RunConfig,
    /// One lock per destination path, so a file is transferred at most once
    /// however many workers reach it.
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl<'a> ArchiveEngine<'a> {
    pub fn new(index: &'a Index, config: &'a RunConfig) -> Self {
        Self {
            index,
            config,
            inflight: DashMap::new(),
        }
    }

    pub fn index(&self) -> &Index {
        self.index
    }

    /// Enumerate a backend and build its registry.
    pub fn ingest(
        &self,
        backend: Arc<dyn StorageBackend>,
        reporter: &dyn ProgressReporter,
    ) -> Result<(Archive, IngestReport), Error> {
        let mut archive = Archive::new(backend);
        let report = archive.ingest(reporter)?;
        Ok((archive, report))
    }

    /// Ensure `file`, held by `source`, has a verified copy on `dest`.
    ///
    /// Presence is checked once cheaply and again under the per-path lock
    /// immediately before any transfer. A copy is indexed only after it
    /// re-reads as a copy of the source.
    pub fn propagate(
        &self,
        source: &dyn StorageBackend,
        dest: &dyn StorageBackend,
        file: &ScanFile,
    ) -> Result<Propagated, Error> {
        let mut origin = file.clone();
        if !origin.is_present() {
            source.read_physical(&mut origin)?;
        }

        let mut copy = origin.archive_copy(dest);
        dest.read_physical(&mut copy)?;
        if dest.is_copy_of(&copy, &origin)? {
            debug!("{} already on {}", copy.full_path().display(), dest.kind());
            return Ok(Propagated {
                outcome: Outcome::AlreadyPresent,
                file: copy,
            });
        }

        if self.config.dummy {
            info!(
                "Would copy {} -> {} ({})",
                origin.full_path().display(),
                copy.full_path().display(),
                dest.kind()
            );
            return Ok(Propagated {
                outcome: Outcome::WouldCopy,
                file: copy,
            });
        }

        let lock_key = format!("{}:{}", dest.kind(), copy.full_path().display());
        let lock = Arc::clone(self.inflight.entry(lock_key).or_default().value());
        let _held = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        dest.read_physical(&mut copy)?;
        if dest.is_copy_of(&copy, &origin)? {
            debug!("{} was copied meanwhile", copy.full_path().display());
            return Ok(Propagated {
                outcome: Outcome::AlreadyPresent,
                file: copy,
            });
        }

        if dest.kind() == BackendKind::Cloud {
            // Uploads carry both digests as metadata.
            ChecksumService::new(self.index, true).ensure_checksums(source, &mut origin)?;
        }

        dest.store_copy(&origin, &copy)?;
        dest.read_physical(&mut copy)?;
        if !dest.is_copy_of(&copy, &origin)? {
            return Err(Error::Verification(format!(
                "{} does not match {} after copy",
                copy.full_path().display(),
                origin.full_path().display()
            )));
        }

        ChecksumService::new(self.index, self.config.compute_md5).ensure_checksums(dest, &mut copy)?;
        self.index.record_file(&copy)?;
        info!(
            "Copied {} -> {} ({})",
            origin.full_path().display(),
            copy.full_path().display(),
            dest.kind()
        );
        Ok(Propagated {
            outcome: Outcome::Copied,
            file: copy,
        })
    }

    /// Propagate every file of `source` to `dest` on a bounded worker pool,
    /// then register the new copies with `dest`. Per-file failures are
    /// logged and counted; the batch carries on.
    pub fn propagate_all(
        &self,
        source: &Archive,
        dest: &mut Archive,
        reporter: &dyn ProgressReporter,
    ) -> Result<RunSummary, Error> {
        let files: Vec<&ScanFile> = source.files().collect();
        let total = files.len();
        let dest_label = dest.backend().kind().as_str();
        reporter.on_propagate_start(dest_label, total);
        let start = Instant::now();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()
            .map_err(|e| Error::Other(format!("worker pool: {}", e)))?;

        let source_backend = source.backend().as_ref();
        let dest_backend = dest.backend().as_ref();
        let done = AtomicUsize::new(0);

        let results: Vec<(&ScanFile, Result<Propagated, Error>)> = pool.install(|| {
            files
                .par_iter()
                .map(|file| {
                    let result = self.propagate(source_backend, dest_backend, file);
                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    reporter.on_propagate_progress(n, total);
                    (*file, result)
                })
                .collect()
        });

        let mut summary = RunSummary {
            files_seen: total,
            ..Default::default()
        };
        let mut copies = Vec::new();
        for (file, result) in results {
            match result {
                Ok(Propagated {
                    outcome: Outcome::Copied,
                    file: copy,
                }) => {
                    summary.copied += 1;
                    copies.push(copy);
                }
                Ok(Propagated {
                    outcome: Outcome::AlreadyPresent,
                    ..
                }) => summary.skipped += 1,
                Ok(Propagated {
                    outcome: Outcome::WouldCopy,
                    ..
                }) => summary.would_copy += 1,
                Err(e) => {
                    error!(
                        "Propagating {} from {} to {} failed: {}",
                        file.full_path().display(),
                        file.backend,
                        dest_label,
                        e
                    );
                    summary.errors += 1;
                }
            }
        }
        dest.attach(copies);

        let duration = start.elapsed();
        info!(
            "Propagation to {} finished in {:.2}s: {}",
            dest_label,
            duration.as_secs_f64(),
            summary
        );
        reporter.on_propagate_complete(dest_label, summary.copied, duration.as_secs_f64());
        Ok(summary)
    }

    /// Audit that every file of `source` has a verified copy in `dest`'s
    /// registry. Collects every failure rather than stopping at the first.
    pub fn all_files_verified_in(&self, source: &Archive, dest: &Archive) -> Vec<VerificationFailure> {
        let dest_backend = dest.backend().as_ref();
        let mut failures = Vec::new();
        for file in source.files() {
            let expected = file.archive_copy(dest_backend);
            let failure = |reason| VerificationFailure {
                source: file.full_path().display().to_string(),
                expected: expected.full_path().display().to_string(),
                reason,
            };
            match dest.file_for(&file.scan_key(), file.class) {
                None => failures.push(failure(FailureReason::Missing)),
                Some(candidate) => match dest_backend.is_copy_of(candidate, file) {
                    Ok(true) => {}
                    Ok(false) => failures.push(failure(FailureReason::NotCopy)),
                    Err(e) => failures.push(failure(FailureReason::Unreadable(e.to_string()))),
                },
            }
        }
        if failures.is_empty() {
            debug!("All {} files verified on {}", source.file_count(), dest_backend.kind());
        }
        failures
    }
}
