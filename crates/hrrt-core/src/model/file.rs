use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::class::{ArchiveFormat, FileClass};
use super::scan::ScanKey;
use super::subject::Subject;
use crate::backend::{BackendKind, StorageBackend};
use crate::grammar::{ScanDateTime, ScanType};
use crate::storage::models::RequiredFields;

/// Where a file lives, meaningful only within its backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    /// Directory for filesystem backends, bucket for object storage.
    pub path: String,
    /// File name, or object key.
    pub name: String,
}

impl Location {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }

    pub fn from_path(path: &Path) -> Self {
        Self {
            path: path
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    pub fn full_path(&self) -> PathBuf {
        Path::new(&self.path).join(&self.name)
    }
}

/// Attributes read from storage. `None` when the file is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhysicalAttrs {
    pub size: Option<u64>,
    /// Seconds since the epoch.
    pub modified: Option<i64>,
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checksums {
    /// Uppercase hex.
    pub crc32: Option<String>,
    /// Lowercase hex.
    pub md5: Option<String>,
}

/// One scanner artifact as seen by one backend. An archive copy on another
/// backend is a separate `ScanFile`.
#[derive(Debug, Clone)]
pub struct ScanFile {
    pub class: FileClass,
    pub archive_format: ArchiveFormat,
    pub backend: BackendKind,
    pub subject: Arc<Subject>,
    pub datetime: ScanDateTime,
    pub scan_type: ScanType,
    pub location: Location,
    pub physical: PhysicalAttrs,
    pub checksums: Checksums,
}

impl ScanFile {
    pub fn new(
        class: FileClass,
        archive_format: ArchiveFormat,
        backend: BackendKind,
        subject: Arc<Subject>,
        datetime: ScanDateTime,
        scan_type: ScanType,
        location: Location,
    ) -> Self {
        Self {
            class,
            archive_format,
            backend,
            subject,
            datetime,
            scan_type,
            location,
            physical: PhysicalAttrs::default(),
            checksums: Checksums::default(),
        }
    }

    pub fn scan_key(&self) -> ScanKey {
        ScanKey {
            datetime: self.datetime,
            scan_type: self.scan_type,
            subject: self.subject.key(),
        }
    }

    /// Extension including any archive suffix for this file's format.
    pub fn extension(&self) -> String {
        self.class.extension(self.archive_format)
    }

    /// `LAST_FIRST_HISTORY_PET_YYMMDD_HHMMSS_TYPE.EXT`, without archive suffix.
    pub fn standard_name(&self) -> String {
        format!(
            "{}_PET_{}_{}.{}",
            self.subject.file_name_part(),
            self.datetime.datetime_code(),
            self.scan_type,
            self.class.suffix()
        )
    }

    pub fn full_path(&self) -> PathBuf {
        self.location.full_path()
    }

    pub fn is_present(&self) -> bool {
        self.physical.size.is_some()
    }

    /// A new, not yet materialized, file describing this artifact on `dest`.
    pub fn archive_copy(&self, dest: &dyn StorageBackend) -> ScanFile {
        let mut copy = ScanFile::new(
            self.class,
            dest.archive_format_for(self),
            dest.kind(),
            Arc::clone(&self.subject),
            self.datetime,
            self.scan_type,
            Location::default(),
        );
        copy.location = Location::new(dest.path_for(&copy), dest.name_for(&copy));
        copy
    }

    /// Natural key of the index row, available once physical attributes are read.
    pub fn required_fields(&self) -> Option<RequiredFields> {
        Some(RequiredFields {
            file_path: self.location.path.clone(),
            file_name: self.location.name.clone(),
            file_size: self.physical.size? as i64,
            file_modified: self.physical.modified?,
            hostname: self.physical.hostname.clone()?,
        })
    }

    pub fn summary(&self) -> String {
        format!(
            "{} {} {:<7} {:>12} {}",
            self.datetime,
            self.scan_type,
            self.class,
            self.physical
                .size
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.full_path().display()
        )
    }
}
