//! Synthetic scanner output for exercising a test deployment.
//!
//! Each test subject gets an emission and a transmission scan, each with all
//! three file classes, laid out exactly as the scanner console writes them.

use filetime::FileTime;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::{BackendKind, SourceBackend, StorageBackend};
use crate::config::RootPair;
use crate::error::Error;
use crate::grammar::{ScanDateTime, ScanType};
use crate::model::{ArchiveFormat, FileClass, Location, ScanFile, Subject};

/// Raw name triplets, deliberately including characters that cleaning strips.
pub const TEST_SUBJECTS: [(&str, &str, &str); 3] = [
    ("Test", "Alpha", "1000001"),
    ("O'Test", "Beta Gamma", "1000002"),
    ("TEST", "DELTA", "1000003"),
];

/// 2017-03-04 09:05:00 UTC. A fixed start keeps repeated runs idempotent.
pub const DEFAULT_FIRST_SCAN_EPOCH: i64 = 1_488_618_300;

const RAW_PLACEHOLDER_BYTES: usize = 64 * 1024;
const HC_PLACEHOLDER_BYTES: usize = 4 * 1024;

/// Seconds between the emission and transmission scans of one subject.
const TX_OFFSET_SECS: i64 = 45 * 60;
/// Seconds between consecutive subjects.
const SUBJECT_SPACING_SECS: i64 = 24 * 60 * 60;

fn placeholder(file: &ScanFile) -> Vec<u8> {
    match file.class {
        FileClass::L64 => (0..RAW_PLACEHOLDER_BYTES).map(|i| (i % 251) as u8).collect(),
        FileClass::L64Hdr => format!(
            "!INTERFILE\n%patient name:={}, {}\n%patient ID:={}\n%study date (dd:mm:yryr):={:02}:{:02}:{:04}\n%study time (hh:mm:ss GMT+00:00):={:02}:{:02}:{:02}\n%PET data type:={}\n",
            file.subject.name_last(),
            file.subject.name_first(),
            file.subject.history(),
            file.datetime.day(),
            file.datetime.month(),
            file.datetime.year(),
            file.datetime.hour(),
            file.datetime.minute(),
            file.datetime.second(),
            match file.scan_type {
                ScanType::Em => "emission",
                ScanType::Tx => "transmission",
            }
        )
        .into_bytes(),
        FileClass::Hc => vec![0x48; HC_PLACEHOLDER_BYTES],
    }
}

/// Write the test subjects' scans into the ACS test root. The file
/// modification time is pinned to the scan time.
///
/// Refuses any root other than the configured test root.
pub fn make_test_data(
    backend: &SourceBackend,
    roots: &RootPair,
    first_scan: ScanDateTime,
) -> Result<Vec<ScanFile>, Error> {
    if backend.root() != roots.test || roots.test == roots.production {
        return Err(Error::Guard {
            root: backend.root().to_string(),
            reason: format!("test data may only be written to '{}'", roots.test),
        });
    }

    let mut written = Vec::new();
    for (i, (last, first, history)) in TEST_SUBJECTS.iter().enumerate() {
        let subject = Arc::new(Subject::new(last, first, history));
        let subject_start = first_scan.epoch() + i as i64 * SUBJECT_SPACING_SECS;

        for (scan_type, offset) in [(ScanType::Em, 0), (ScanType::Tx, TX_OFFSET_SECS)] {
            let datetime = ScanDateTime::from_epoch(subject_start + offset).ok_or_else(|| {
                Error::Other(format!("test scan time out of range: {}", subject_start + offset))
            })?;
            for class in FileClass::ALL {
                let mut file = ScanFile::new(
                    class,
                    ArchiveFormat::Native,
                    BackendKind::Source,
                    Arc::clone(&subject),
                    datetime,
                    scan_type,
                    Location::default(),
                );
                file.location = Location::new(backend.path_for(&file), backend.name_for(&file));

                let path = file.full_path();
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&path, placeholder(&file))?;
                filetime::set_file_mtime(&path, FileTime::from_unix_time(datetime.epoch(), 0))?;
                backend.read_physical(&mut file)?;
                debug!("Wrote test file {}", path.display());
                written.push(file);
            }
        }
    }

    info!(
        "Wrote {} test files for {} subjects under {}",
        written.len(),
        TEST_SUBJECTS.len(),
        Path::new(backend.root()).display()
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::parse_name;
    use tempfile::tempdir;

    #[test]
    fn test_makes_three_files_per_scan_that_parse_back() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let backend = SourceBackend::new(root.clone(), "console");
        let roots = RootPair {
            production: "/mnt/hrrt/SCS_SCANS".to_string(),
            test: root,
        };
        let start = ScanDateTime::from_epoch(DEFAULT_FIRST_SCAN_EPOCH).unwrap();
        assert_eq!(start, ScanDateTime::from_components(2017, 3, 4, 9, 5, 0).unwrap());

        let files = make_test_data(&backend, &roots, start).unwrap();
        assert_eq!(files.len(), TEST_SUBJECTS.len() * 2 * 3);

        let tx = files.iter().find(|f| f.scan_type == ScanType::Tx).unwrap();
        assert!(tx.location.path.ends_with("TEST_ALPHA_1000001/Transmission"));
        for file in &files {
            assert!(file.is_present());
            assert_eq!(file.physical.modified, Some(file.datetime.epoch()));
            let parsed = parse_name(&file.location.name).unwrap();
            assert_eq!(parsed.datetime, file.datetime);
        }
    }

    #[test]
    fn test_refuses_production_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let backend = SourceBackend::new(root.clone(), "console");
        let roots = RootPair {
            production: root,
            test: "/home/me/data/hrrt_acs".to_string(),
        };
        let start = ScanDateTime::from_components(2017, 3, 4, 9, 5, 0).unwrap();

        assert!(matches!(
            make_test_data(&backend, &roots, start),
            Err(Error::Guard { .. })
        ));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
