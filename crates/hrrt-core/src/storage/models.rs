/// A scanned person, as stored in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectRecord {
    pub id: i64,
    pub name_last: String,
    pub name_first: String,
    pub history: String,
}

/// One acquisition, as stored in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    pub id: i64,
    pub subject_id: i64,
    /// `YYYY-MM-DD HH:MM:SS`
    pub scan_datetime: String,
    pub scan_type: String,
}

/// One physical file on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: i64,
    pub scan_id: i64,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub file_modified: i64,
    pub hostname: String,
    pub file_crc32: Option<String>,
    pub file_md5: Option<String>,
    pub file_class: String,
    pub archive_class: String,
}

/// The natural key of a file record: the columns of its unique constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequiredFields {
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub file_modified: i64,
    pub hostname: String,
}

impl FileRecord {
    pub fn required_fields(&self) -> RequiredFields {
        RequiredFields {
            file_path: self.file_path.clone(),
            file_name: self.file_name.clone(),
            file_size: self.file_size,
            file_modified: self.file_modified,
            hostname: self.hostname.clone(),
        }
    }
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexCounts {
    pub subjects: i64,
    pub scans: i64,
    pub files: i64,
}
