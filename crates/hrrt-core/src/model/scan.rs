use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::class::FileClass;
use super::file::ScanFile;
use super::subject::{Subject, SubjectKey};
use crate::grammar::{ScanDateTime, ScanType};

/// Identity of a scan. Ordered by acquisition time first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScanKey {
    pub datetime: ScanDateTime,
    pub scan_type: ScanType,
    pub subject: SubjectKey,
}

impl fmt::Display for ScanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.datetime, self.scan_type, self.subject)
    }
}

/// One acquisition: a subject, a time and a type, owning up to one file per class.
#[derive(Debug, Clone)]
pub struct Scan {
    subject: Arc<Subject>,
    datetime: ScanDateTime,
    scan_type: ScanType,
    files: BTreeMap<FileClass, ScanFile>,
}

impl Scan {
    pub fn new(subject: Arc<Subject>, datetime: ScanDateTime, scan_type: ScanType) -> Self {
        Self {
            subject,
            datetime,
            scan_type,
            files: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> ScanKey {
        ScanKey {
            datetime: self.datetime,
            scan_type: self.scan_type,
            subject: self.subject.key(),
        }
    }

    pub fn subject(&self) -> &Arc<Subject> {
        &self.subject
    }

    pub fn datetime(&self) -> ScanDateTime {
        self.datetime
    }

    pub fn scan_type(&self) -> ScanType {
        self.scan_type
    }

    pub fn files(&self) -> &BTreeMap<FileClass, ScanFile> {
        &self.files
    }

    pub fn file(&self, class: FileClass) -> Option<&ScanFile> {
        self.files.get(&class)
    }

    /// Replace the whole file set at once; the set is never populated piecemeal.
    pub(crate) fn set_files(&mut self, files: BTreeMap<FileClass, ScanFile>) {
        self.files = files;
    }

    pub(crate) fn insert_file(&mut self, file: ScanFile) -> Option<ScanFile> {
        self.files.insert(file.class, file)
    }

    pub fn has_all_files(&self) -> bool {
        FileClass::ALL.iter().all(|class| self.files.contains_key(class))
    }

    pub fn missing_classes(&self) -> Vec<FileClass> {
        FileClass::ALL
            .into_iter()
            .filter(|class| !self.files.contains_key(class))
            .collect()
    }

    /// Total bytes of all files making up this scan.
    pub fn total_size(&self) -> u64 {
        self.files.values().filter_map(|f| f.physical.size).sum()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} {} {} {} files {} bytes",
            self.datetime,
            self.scan_type,
            self.subject.summary(),
            self.files.len(),
            self.total_size()
        )
    }
}
