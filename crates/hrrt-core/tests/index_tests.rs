use std::sync::Arc;

use hrrt_core::backend::BackendKind;
use hrrt_core::grammar::{ScanDateTime, ScanType};
use hrrt_core::model::{ArchiveFormat, Checksums, FileClass, Location, ScanFile, Subject};
use hrrt_core::storage::{Index, RequiredFields};
use hrrt_core::Error;

fn smith() -> Subject {
    Subject::new("Smith", "John", "1234567")
}

fn scan_time() -> ScanDateTime {
    ScanDateTime::from_components(2015, 8, 21, 8, 29, 39).unwrap()
}

fn indexed_file(class: FileClass, name: &str, size: u64) -> ScanFile {
    let mut file = ScanFile::new(
        class,
        ArchiveFormat::Native,
        BackendKind::Local,
        Arc::new(smith()),
        scan_time(),
        ScanType::Em,
        Location::new("/data/archive/2015/08", name),
    );
    file.physical.size = Some(size);
    file.physical.modified = Some(1_440_145_779);
    file.physical.hostname = Some("backup".to_string());
    file
}

#[test]
fn test_find_or_create_subject_is_idempotent() {
    let index = Index::open_in_memory().unwrap();
    let first = index.find_or_create_subject(&smith()).unwrap();
    let again = index.find_or_create_subject(&smith()).unwrap();
    assert_eq!(first, again);

    // Cleaning folds punctuation and case into the same subject.
    let punctuated = index
        .find_or_create_subject(&Subject::new("smith", "jo-hn", "1234567"))
        .unwrap();
    assert_eq!(first, punctuated);

    let record = index.find_subject(&smith()).unwrap().unwrap();
    assert_eq!(record.name_last, "SMITH");
    assert_eq!(index.counts().unwrap().subjects, 1);
}

#[test]
fn test_find_or_create_scan_is_idempotent() {
    let index = Index::open_in_memory().unwrap();
    let subject_id = index.find_or_create_subject(&smith()).unwrap();
    let em = index
        .find_or_create_scan(subject_id, scan_time(), ScanType::Em)
        .unwrap();
    assert_eq!(
        em,
        index
            .find_or_create_scan(subject_id, scan_time(), ScanType::Em)
            .unwrap()
    );
    let tx = index
        .find_or_create_scan(subject_id, scan_time(), ScanType::Tx)
        .unwrap();
    assert_ne!(em, tx);

    let scans = index.scans_for_subject(subject_id).unwrap();
    assert_eq!(scans.len(), 2);
    assert_eq!(scans[0].scan_datetime, "2015-08-21 08:29:39");
}

#[test]
fn test_record_file_creates_parents_once() {
    let index = Index::open_in_memory().unwrap();
    let hdr = indexed_file(
        FileClass::L64Hdr,
        "SMITH_JOHN_1234567_PET_150821_082939_EM.l64.hdr",
        512,
    );
    let hc = indexed_file(
        FileClass::Hc,
        "SMITH_JOHN_1234567_PET_150821_082939_EM.hc",
        4096,
    );

    assert!(index.record_file(&hdr).unwrap());
    assert!(index.record_file(&hc).unwrap());
    assert!(!index.record_file(&hdr).unwrap());

    let counts = index.counts().unwrap();
    assert_eq!((counts.subjects, counts.scans, counts.files), (1, 1, 2));

    let record = index
        .find_file(&hdr.required_fields().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(record.file_class, "L64Hdr");
    assert_eq!(record.archive_class, "native");
    assert_eq!(index.files_for_scan(record.scan_id).unwrap().len(), 2);
}

#[test]
fn test_file_without_physical_attributes_is_not_indexed() {
    let index = Index::open_in_memory().unwrap();
    let mut file = indexed_file(FileClass::Hc, "x.hc", 1);
    file.physical.size = None;
    assert!(file.required_fields().is_none());
    assert!(index.record_file(&file).is_err());
    assert!(index.is_empty().unwrap());
}

#[test]
fn test_find_file_misses_on_changed_mtime() {
    let index = Index::open_in_memory().unwrap();
    let file = indexed_file(FileClass::Hc, "a.hc", 10);
    index.record_file(&file).unwrap();

    let mut required = file.required_fields().unwrap();
    required.file_modified += 1;
    assert!(index.find_file(&required).unwrap().is_none());
}

#[test]
fn test_find_file_with_two_matches_is_consistency_error() {
    let index = Index::open_in_memory().unwrap();
    let file = indexed_file(FileClass::Hc, "a.hc", 10);
    index.record_file(&file).unwrap();

    // Simulate a database that lost its unique constraint.
    {
        let conn = index.connection();
        conn.execute_batch(
            "CREATE TABLE file_copy AS SELECT * FROM file;
             DROP TABLE file;
             CREATE TABLE file AS SELECT * FROM file_copy;
             INSERT INTO file SELECT id + 100, scan_id, file_path, file_name, file_size,
                 file_modified, hostname, file_crc32, file_md5, file_class, archive_class
                 FROM file_copy;
             DROP TABLE file_copy;",
        )
        .unwrap();
    }

    let required = RequiredFields {
        file_path: "/data/archive/2015/08".to_string(),
        file_name: "a.hc".to_string(),
        file_size: 10,
        file_modified: 1_440_145_779,
        hostname: "backup".to_string(),
    };
    assert!(matches!(
        index.find_file(&required),
        Err(Error::Consistency(_))
    ));
}

#[test]
fn test_update_checksums_fills_only_missing() {
    let index = Index::open_in_memory().unwrap();
    let file = indexed_file(FileClass::Hc, "a.hc", 10);
    index.record_file(&file).unwrap();
    let record = index
        .find_file(&file.required_fields().unwrap())
        .unwrap()
        .unwrap();
    assert!(record.file_crc32.is_none());

    index
        .update_file_checksums(
            record.id,
            &Checksums {
                crc32: Some("CBF43926".to_string()),
                md5: None,
            },
        )
        .unwrap();
    let record = index
        .find_file(&file.required_fields().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(record.file_crc32.as_deref(), Some("CBF43926"));
    assert!(record.file_md5.is_none());
}

#[test]
fn test_orphans_cascade_scan_then_subject() {
    let index = Index::open_in_memory().unwrap();
    let file = indexed_file(FileClass::Hc, "a.hc", 10);
    index.record_file(&file).unwrap();
    let record = index
        .find_file(&file.required_fields().unwrap())
        .unwrap()
        .unwrap();

    assert_eq!(index.delete_orphan_scans().unwrap(), 0);
    index.delete_file(record.id).unwrap();
    assert_eq!(index.delete_orphan_scans().unwrap(), 1);
    assert_eq!(index.delete_orphan_subjects().unwrap(), 1);
    assert!(index.is_empty().unwrap());
}

#[test]
fn test_truncate_all_empties_index() {
    let index = Index::open_in_memory().unwrap();
    index
        .record_file(&indexed_file(FileClass::Hc, "a.hc", 10))
        .unwrap();
    assert!(!index.is_empty().unwrap());
    index.truncate_all().unwrap();
    assert!(index.is_empty().unwrap());
}
