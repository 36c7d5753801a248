//! The registry of what one backend currently holds, and its construction
//! from raw entries.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backend::StorageBackend;
use crate::error::Error;
use crate::grammar::{parse_name, ParsedName};
use crate::model::{FileClass, Scan, ScanFile, ScanKey, Subject, SubjectKey};
use crate::progress::ProgressReporter;

/// Counts of one ingest pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub entries: usize,
    pub files: usize,
    /// Names neither grammar matched, or with no known file class.
    pub unparsed: usize,
    /// A second file for an already filled class slot.
    pub duplicates: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub subjects: usize,
    pub scans: usize,
    pub complete_scans: usize,
    pub files: usize,
    pub total_bytes: u64,
}

impl fmt::Display for ArchiveSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} subjects, {} scans ({} complete), {} files, {} bytes",
            self.subjects, self.scans, self.complete_scans, self.files, self.total_bytes
        )
    }
}

pub struct Archive {
    backend: Arc<dyn StorageBackend>,
    subjects: BTreeMap<SubjectKey, Arc<Subject>>,
    scans: BTreeMap<ScanKey, Scan>,
}

type Staged = BTreeMap<ScanKey, BTreeMap<FileClass, ScanFile>>;

impl Archive {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            subjects: BTreeMap::new(),
            scans: BTreeMap::new(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Rebuild the registry from everything the backend currently stores.
    ///
    /// Files are staged per scan and each scan's file set is assigned in one
    /// step once every entry has been seen; a scan is never read half-filled.
    pub fn ingest(&mut self, reporter: &dyn ProgressReporter) -> Result<IngestReport, Error> {
        let label = self.backend.kind().as_str();
        reporter.on_ingest_start(label);
        let start = Instant::now();

        self.subjects.clear();
        self.scans.clear();

        let entries = self.backend.all_entries()?;
        let mut report = IngestReport {
            entries: entries.len(),
            ..Default::default()
        };
        let mut staged = Staged::new();

        for address in &entries {
            match self.stage(address, &mut staged, &mut report) {
                Ok(()) => {}
                Err(Error::NameParse(name)) => {
                    warn!("Skipping {} on {}: unrecognized file name {}", address, label, name);
                    report.unparsed += 1;
                }
                Err(e) => {
                    error!("Error ingesting {} on {}: {}", address, label, e);
                    report.errors += 1;
                }
            }
        }

        for (key, files) in staged {
            report.files += files.len();
            if let Some(scan) = self.scans.get_mut(&key) {
                scan.set_files(files);
            }
        }

        let duration = start.elapsed();
        info!(
            "Ingested {} on {}: {} files in {} scans ({} unparsed, {} errors) in {:.2}s",
            self.backend.root(),
            label,
            report.files,
            self.scans.len(),
            report.unparsed,
            report.errors,
            duration.as_secs_f64()
        );
        reporter.on_ingest_complete(label, report.files, duration.as_secs_f64());
        Ok(report)
    }

    fn stage(
        &mut self,
        address: &str,
        staged: &mut Staged,
        report: &mut IngestReport,
    ) -> Result<(), Error> {
        let Some(found) = self.backend.discover(address)? else {
            debug!("{} vanished before it could be read", address);
            return Ok(());
        };
        let parsed = parse_name(&found.name)?;
        let (class, format) = FileClass::match_extension(&parsed.extension)
            .ok_or_else(|| Error::NameParse(found.name.clone()))?;

        let mut file = ScanFile::new(
            class,
            format,
            self.backend.kind(),
            Arc::new(Subject::from_parsed(&parsed)),
            parsed.datetime,
            parsed.scan_type,
            found.location,
        );
        // Nothing is registered for a file that cannot be read.
        self.backend.read_physical(&mut file)?;

        let subject = self.find_or_create_subject(Subject::from_parsed(&parsed));
        let key = self.find_or_create_scan(&subject, &parsed).key();
        file.subject = subject;

        let slots = staged.entry(key).or_default();
        if let Some(existing) = slots.get(&class) {
            warn!(
                "Duplicate {} file for scan {}: keeping {}, ignoring {}",
                class,
                file.scan_key(),
                existing.full_path().display(),
                file.full_path().display()
            );
            report.duplicates += 1;
            return Ok(());
        }
        slots.insert(class, file);
        Ok(())
    }

    fn find_or_create_subject(&mut self, subject: Subject) -> Arc<Subject> {
        Arc::clone(
            self.subjects
                .entry(subject.key())
                .or_insert_with(|| Arc::new(subject)),
        )
    }

    fn find_or_create_scan(
        &mut self,
        subject: &Arc<Subject>,
        parsed: &ParsedName,
    ) -> &mut Scan {
        let key = ScanKey {
            datetime: parsed.datetime,
            scan_type: parsed.scan_type,
            subject: subject.key(),
        };
        self.scans
            .entry(key)
            .or_insert_with(|| Scan::new(Arc::clone(subject), parsed.datetime, parsed.scan_type))
    }

    /// Register files that were just materialized on this backend.
    pub fn attach(&mut self, files: Vec<ScanFile>) {
        for file in files {
            let subject = self.find_or_create_subject(file.subject.as_ref().clone());
            let key = file.scan_key();
            let scan = self
                .scans
                .entry(key)
                .or_insert_with(|| Scan::new(subject, file.datetime, file.scan_type));
            scan.insert_file(file);
        }
    }

    pub fn subjects(&self) -> impl Iterator<Item = &Arc<Subject>> {
        self.subjects.values()
    }

    /// Scans in acquisition order.
    pub fn scans(&self) -> impl Iterator<Item = &Scan> {
        self.scans.values()
    }

    pub fn scan(&self, key: &ScanKey) -> Option<&Scan> {
        self.scans.get(key)
    }

    pub fn files(&self) -> impl Iterator<Item = &ScanFile> {
        self.scans.values().flat_map(|scan| scan.files().values())
    }

    pub fn file_for(&self, key: &ScanKey, class: FileClass) -> Option<&ScanFile> {
        self.scans.get(key).and_then(|scan| scan.file(class))
    }

    pub fn file_count(&self) -> usize {
        self.scans.values().map(|scan| scan.files().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.file_count() == 0
    }

    pub fn summary(&self) -> ArchiveSummary {
        ArchiveSummary {
            subjects: self.subjects.len(),
            scans: self.scans.len(),
            complete_scans: self.scans.values().filter(|s| s.has_all_files()).count(),
            files: self.file_count(),
            total_bytes: self.scans.values().map(|s| s.total_size()).sum(),
        }
    }
}
