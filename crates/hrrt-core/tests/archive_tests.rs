use filetime::FileTime;
use rayon::prelude::*;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

use hrrt_core::backend::{Discovered, LocalBackend, PhysicalStat, SourceBackend};
use hrrt_core::model::{ArchiveFormat, Checksums, FileClass, Location, ScanFile};
use hrrt_core::{
    AppConfig, Archive, ArchiveEngine, BackendKind, Error, Index, Outcome, RunConfig, RunFlags,
    SilentReporter, StorageBackend,
};

const SCAN_EPOCH: i64 = 1_440_145_779;
const ACS_PREFIX: &str = "SMITH-JOHN-1234567-2015.8.21.8.29.39_EM";
const STD_PREFIX: &str = "SMITH_JOHN_1234567_PET_150821_082939_EM";

/// Forwards to a real backend and counts writes.
struct CountingBackend<B> {
    inner: B,
    stores: AtomicUsize,
    fail_stat: bool,
}

impl<B: StorageBackend> CountingBackend<B> {
    fn new(inner: B) -> Self {
        Self {
            inner,
            stores: AtomicUsize::new(0),
            fail_stat: false,
        }
    }

    /// Every `stat` fails, as on an unreadable mount.
    fn failing_stat(mut self) -> Self {
        self.fail_stat = true;
        self
    }

    fn stores(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }
}

impl<B: StorageBackend> StorageBackend for CountingBackend<B> {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }
    fn root(&self) -> &str {
        self.inner.root()
    }
    fn hostname(&self) -> &str {
        self.inner.hostname()
    }
    fn all_entries(&self) -> Result<Vec<String>, Error> {
        self.inner.all_entries()
    }
    fn discover(&self, address: &str) -> Result<Option<Discovered>, Error> {
        self.inner.discover(address)
    }
    fn path_for(&self, file: &ScanFile) -> String {
        self.inner.path_for(file)
    }
    fn name_for(&self, file: &ScanFile) -> String {
        self.inner.name_for(file)
    }
    fn archive_format_for(&self, source: &ScanFile) -> ArchiveFormat {
        self.inner.archive_format_for(source)
    }
    fn stat(&self, location: &Location) -> Result<Option<PhysicalStat>, Error> {
        if self.fail_stat {
            return Err(Error::Other(format!("cannot stat {}", location.name)));
        }
        self.inner.stat(location)
    }
    fn is_copy_of(&self, candidate: &ScanFile, source: &ScanFile) -> Result<bool, Error> {
        self.inner.is_copy_of(candidate, source)
    }
    fn store_copy(&self, source: &ScanFile, dest: &ScanFile) -> Result<(), Error> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.inner.store_copy(source, dest)
    }
    fn open(&self, file: &ScanFile) -> Result<Box<dyn Read + Send>, Error> {
        self.inner.open(file)
    }
    fn stored_checksums(&self, file: &ScanFile) -> Result<Option<Checksums>, Error> {
        self.inner.stored_checksums(file)
    }
    fn delete(&self, file: &ScanFile) -> Result<(), Error> {
        self.inner.delete(file)
    }
    fn delete_entry(&self, address: &str) -> Result<(), Error> {
        self.inner.delete_entry(address)
    }
    fn prune_empty_directories(&self) -> Result<usize, Error> {
        self.inner.prune_empty_directories()
    }
}

fn write_scan_file(dir: &Path, name: &str, bytes: &[u8], mtime: i64) {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    filetime::set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
}

/// One complete emission scan for SMITH JOHN in ACS layout.
fn create_acs_scan(root: &Path) {
    let dir = root.join("SMITH_JOHN_1234567");
    write_scan_file(&dir, &format!("{}.l64", ACS_PREFIX), &vec![3u8; 8192], SCAN_EPOCH);
    write_scan_file(&dir, &format!("{}.l64.hdr", ACS_PREFIX), b"!INTERFILE\n", SCAN_EPOCH);
    write_scan_file(&dir, &format!("{}.hc", ACS_PREFIX), &[1u8; 256], SCAN_EPOCH);
}

fn run_config(dummy: bool) -> RunConfig {
    let mut run = RunConfig::resolve(&AppConfig::default(), &RunFlags::default());
    run.workers = 2;
    run.dummy = dummy;
    run
}

fn source(root: &Path) -> Arc<dyn StorageBackend> {
    Arc::new(SourceBackend::new(root.to_string_lossy(), "console"))
}

#[test]
fn test_ingest_groups_files_into_one_scan() {
    let tmp = tempdir().unwrap();
    create_acs_scan(tmp.path());
    fs::write(tmp.path().join("SMITH_JOHN_1234567/notes.txt"), b"x").unwrap();

    let mut archive = Archive::new(source(tmp.path()));
    let report = archive.ingest(&SilentReporter).unwrap();

    assert_eq!(report.entries, 4);
    assert_eq!(report.files, 3);
    assert_eq!(report.unparsed, 1);
    assert_eq!(report.errors, 0);

    let summary = archive.summary();
    assert_eq!(summary.subjects, 1);
    assert_eq!(summary.scans, 1);
    assert_eq!(summary.complete_scans, 1);
    assert_eq!(summary.total_bytes, 8192 + 11 + 256);

    let scan = archive.scans().next().unwrap();
    assert!(scan.has_all_files());
    let hdr = scan.file(FileClass::L64Hdr).unwrap();
    assert_eq!(hdr.physical.modified, Some(SCAN_EPOCH));
    assert_eq!(hdr.physical.hostname.as_deref(), Some("console"));
}

#[test]
fn test_ingest_standard_names() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("2015/08");
    write_scan_file(&dir, &format!("{}.l64", STD_PREFIX), &vec![3u8; 4096], SCAN_EPOCH);
    write_scan_file(&dir, &format!("{}.l64.hdr", STD_PREFIX), b"!INTERFILE\n", SCAN_EPOCH);
    write_scan_file(&dir, &format!("{}.hc", STD_PREFIX), &[1u8; 128], SCAN_EPOCH);

    let backend: Arc<dyn StorageBackend> =
        Arc::new(LocalBackend::new(tmp.path().to_string_lossy(), "backup"));
    let mut archive = Archive::new(backend);
    let report = archive.ingest(&SilentReporter).unwrap();
    assert_eq!(report.files, 3);
    assert_eq!(report.unparsed, 0);

    let summary = archive.summary();
    assert_eq!((summary.subjects, summary.scans, summary.files), (1, 1, 3));
    assert_eq!(summary.complete_scans, 1);

    let subject = archive.subjects().next().unwrap();
    assert_eq!(subject.name_last(), "SMITH");
    assert_eq!(subject.name_first(), "JOHN");
    assert_eq!(subject.history(), "1234567");

    let scan = archive.scans().next().unwrap();
    let raw = scan.file(FileClass::L64).unwrap();
    assert_eq!(raw.archive_format, ArchiveFormat::Native);
    assert_eq!(raw.physical.size, Some(4096));
}

#[test]
fn test_unreadable_files_leave_no_empty_scan() {
    let tmp = tempdir().unwrap();
    create_acs_scan(tmp.path());
    let backend: Arc<dyn StorageBackend> = Arc::new(
        CountingBackend::new(SourceBackend::new(tmp.path().to_string_lossy(), "console"))
            .failing_stat(),
    );

    let mut archive = Archive::new(backend);
    let report = archive.ingest(&SilentReporter).unwrap();
    assert_eq!(report.errors, 3);
    assert_eq!(report.files, 0);

    let summary = archive.summary();
    assert_eq!(summary.subjects, 0);
    assert_eq!(summary.scans, 0);
    assert!(archive.is_empty());
}

#[test]
fn test_ingest_reports_missing_classes() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("SMITH_JOHN_1234567");
    write_scan_file(&dir, &format!("{}.hc", ACS_PREFIX), b"hc", SCAN_EPOCH);

    let mut archive = Archive::new(source(tmp.path()));
    archive.ingest(&SilentReporter).unwrap();

    let scan = archive.scans().next().unwrap();
    assert!(!scan.has_all_files());
    assert_eq!(
        scan.missing_classes(),
        vec![FileClass::L64, FileClass::L64Hdr]
    );
    assert_eq!(archive.summary().complete_scans, 0);
}

#[test]
fn test_reingest_replaces_registry() {
    let tmp = tempdir().unwrap();
    create_acs_scan(tmp.path());
    let mut archive = Archive::new(source(tmp.path()));
    archive.ingest(&SilentReporter).unwrap();
    assert_eq!(archive.file_count(), 3);

    fs::remove_dir_all(tmp.path().join("SMITH_JOHN_1234567")).unwrap();
    archive.ingest(&SilentReporter).unwrap();
    assert!(archive.is_empty());
    assert_eq!(archive.subjects().count(), 0);
}

#[test]
fn test_propagate_to_local_compresses_raw_data() {
    let acs_dir = tempdir().unwrap();
    let local_dir = tempdir().unwrap();
    create_acs_scan(acs_dir.path());

    let index = Index::open_in_memory().unwrap();
    let run = run_config(false);
    let engine = ArchiveEngine::new(&index, &run);

    let (acs, _) = engine.ingest(source(acs_dir.path()), &SilentReporter).unwrap();
    let local_backend: Arc<dyn StorageBackend> =
        Arc::new(LocalBackend::new(local_dir.path().to_string_lossy(), "backup"));
    let (mut local, _) = engine.ingest(local_backend, &SilentReporter).unwrap();

    let summary = engine
        .propagate_all(&acs, &mut local, &SilentReporter)
        .unwrap();
    assert_eq!(summary.files_seen, 3);
    assert_eq!(summary.copied, 3);
    assert_eq!(summary.errors, 0);

    let month = local_dir.path().join("2015/08");
    assert!(month
        .join("SMITH_JOHN_1234567_PET_150821_082939_EM.l64.7z")
        .is_file());
    let hdr = month.join("SMITH_JOHN_1234567_PET_150821_082939_EM.l64.hdr");
    assert_eq!(
        FileTime::from_last_modification_time(&fs::metadata(&hdr).unwrap()).unix_seconds(),
        SCAN_EPOCH
    );

    // New copies are registered with the destination and indexed.
    assert_eq!(local.file_count(), 3);
    assert!(engine.all_files_verified_in(&acs, &local).is_empty());
    let counts = index.counts().unwrap();
    assert_eq!((counts.subjects, counts.scans, counts.files), (1, 1, 3));

    let raw = local
        .scans()
        .next()
        .and_then(|scan| scan.file(FileClass::L64))
        .unwrap();
    assert_eq!(raw.archive_format, ArchiveFormat::Compressed);
    assert_eq!(raw.checksums.crc32.as_ref().map(String::len), Some(8));
}

#[test]
fn test_second_run_writes_nothing() {
    let acs_dir = tempdir().unwrap();
    let local_dir = tempdir().unwrap();
    create_acs_scan(acs_dir.path());

    let index = Index::open_in_memory().unwrap();
    let run = run_config(false);
    let engine = ArchiveEngine::new(&index, &run);
    let counting = Arc::new(CountingBackend::new(LocalBackend::new(
        local_dir.path().to_string_lossy(),
        "backup",
    )));

    let (acs, _) = engine.ingest(source(acs_dir.path()), &SilentReporter).unwrap();
    let (mut local, _) = engine
        .ingest(counting.clone(), &SilentReporter)
        .unwrap();
    engine
        .propagate_all(&acs, &mut local, &SilentReporter)
        .unwrap();
    assert_eq!(counting.stores(), 3);
    let files_after_first = index.counts().unwrap().files;

    let (mut local, _) = engine
        .ingest(counting.clone(), &SilentReporter)
        .unwrap();
    let summary = engine
        .propagate_all(&acs, &mut local, &SilentReporter)
        .unwrap();
    assert_eq!(summary.copied, 0);
    assert_eq!(summary.skipped, 3);
    assert_eq!(counting.stores(), 3);
    assert_eq!(index.counts().unwrap().files, files_after_first);
}

#[test]
fn test_concurrent_propagation_copies_once() {
    let acs_dir = tempdir().unwrap();
    let local_dir = tempdir().unwrap();
    create_acs_scan(acs_dir.path());

    let index = Index::open_in_memory().unwrap();
    let run = run_config(false);
    let engine = ArchiveEngine::new(&index, &run);
    let counting = CountingBackend::new(LocalBackend::new(
        local_dir.path().to_string_lossy(),
        "backup",
    ));

    let (acs, _) = engine.ingest(source(acs_dir.path()), &SilentReporter).unwrap();
    let raw = acs
        .files()
        .find(|f| f.class == FileClass::L64)
        .unwrap()
        .clone();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(8)
        .build()
        .unwrap();
    let outcomes: Vec<Outcome> = pool.install(|| {
        (0..8)
            .into_par_iter()
            .map(|_| {
                engine
                    .propagate(acs.backend().as_ref(), &counting, &raw)
                    .unwrap()
                    .outcome
            })
            .collect()
    });

    assert_eq!(counting.stores(), 1);
    assert_eq!(outcomes.iter().filter(|o| **o == Outcome::Copied).count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == Outcome::AlreadyPresent)
            .count(),
        7
    );
    assert_eq!(index.counts().unwrap().files, 1);
}

#[test]
fn test_compressed_copy_ignores_mtime_but_not_size() {
    let acs_dir = tempdir().unwrap();
    let local_dir = tempdir().unwrap();
    create_acs_scan(acs_dir.path());

    let index = Index::open_in_memory().unwrap();
    let run = run_config(false);
    let engine = ArchiveEngine::new(&index, &run);
    let local_backend = LocalBackend::new(local_dir.path().to_string_lossy(), "backup");

    let (acs, _) = engine.ingest(source(acs_dir.path()), &SilentReporter).unwrap();
    let raw = acs
        .files()
        .find(|f| f.class == FileClass::L64)
        .unwrap()
        .clone();
    let first = engine.propagate(acs.backend().as_ref(), &local_backend, &raw).unwrap();
    assert_eq!(first.outcome, Outcome::Copied);

    let mut touched = raw.clone();
    touched.physical.modified = Some(SCAN_EPOCH + 3600);
    let again = engine
        .propagate(acs.backend().as_ref(), &local_backend, &touched)
        .unwrap();
    assert_eq!(again.outcome, Outcome::AlreadyPresent);

    let raw_path = raw.full_path();
    write_scan_file(
        raw_path.parent().unwrap(),
        &raw.location.name,
        &vec![3u8; 9000],
        SCAN_EPOCH,
    );
    let mut grown = raw.clone();
    grown.physical.size = None;
    let recopied = engine
        .propagate(acs.backend().as_ref(), &local_backend, &grown)
        .unwrap();
    assert_eq!(recopied.outcome, Outcome::Copied);
}

#[test]
fn test_native_copy_with_different_mtime_is_replaced() {
    let acs_dir = tempdir().unwrap();
    let local_dir = tempdir().unwrap();
    create_acs_scan(acs_dir.path());

    let index = Index::open_in_memory().unwrap();
    let run = run_config(false);
    let engine = ArchiveEngine::new(&index, &run);
    let local_backend = LocalBackend::new(local_dir.path().to_string_lossy(), "backup");

    let (acs, _) = engine.ingest(source(acs_dir.path()), &SilentReporter).unwrap();
    let hc = acs
        .files()
        .find(|f| f.class == FileClass::Hc)
        .unwrap()
        .clone();
    let copied = engine.propagate(acs.backend().as_ref(), &local_backend, &hc).unwrap();
    filetime::set_file_mtime(
        copied.file.full_path(),
        FileTime::from_unix_time(SCAN_EPOCH - 60, 0),
    )
    .unwrap();

    let again = engine.propagate(acs.backend().as_ref(), &local_backend, &hc).unwrap();
    assert_eq!(again.outcome, Outcome::Copied);
    assert_eq!(again.file.physical.modified, Some(SCAN_EPOCH));
}

#[test]
fn test_dummy_run_reports_without_writing() {
    let acs_dir = tempdir().unwrap();
    let local_dir = tempdir().unwrap();
    create_acs_scan(acs_dir.path());

    let index = Index::open_in_memory().unwrap();
    let run = run_config(true);
    let engine = ArchiveEngine::new(&index, &run);

    let (acs, _) = engine.ingest(source(acs_dir.path()), &SilentReporter).unwrap();
    let local_backend: Arc<dyn StorageBackend> =
        Arc::new(LocalBackend::new(local_dir.path().to_string_lossy(), "backup"));
    let (mut local, _) = engine.ingest(local_backend, &SilentReporter).unwrap();

    let summary = engine
        .propagate_all(&acs, &mut local, &SilentReporter)
        .unwrap();
    assert_eq!(summary.would_copy, 3);
    assert_eq!(summary.copied, 0);
    assert_eq!(fs::read_dir(local_dir.path()).unwrap().count(), 0);
    assert!(index.is_empty().unwrap());
    assert_eq!(engine.all_files_verified_in(&acs, &local).len(), 3);
}
