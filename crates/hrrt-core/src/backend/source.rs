use std::io::Read;
use std::path::Path;

use super::physical;
use super::{BackendKind, Discovered, PhysicalStat, StorageBackend};
use crate::error::Error;
use crate::grammar::ScanType;
use crate::model::{ArchiveFormat, Location, ScanFile};

/// Transmission scans sit one level below the subject directory.
pub const TRANSMISSION_DIR: &str = "Transmission";

/// The scanner console output area. Files are grouped in one directory per
/// subject and named in the console's own dotted-date form.
pub struct SourceBackend {
    root: String,
    hostname: String,
    ignore_patterns: Vec<String>,
}

impl SourceBackend {
    pub fn new(root: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            hostname: hostname.into(),
            ignore_patterns: Vec::new(),
        }
    }

    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }
}

impl StorageBackend for SourceBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Source
    }

    fn root(&self) -> &str {
        &self.root
    }

    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn all_entries(&self) -> Result<Vec<String>, Error> {
        physical::list_files(&self.root, &self.ignore_patterns)
    }

    fn discover(&self, address: &str) -> Result<Option<Discovered>, Error> {
        let location = Location::from_path(Path::new(address));
        Ok(Some(Discovered {
            name: location.name.clone(),
            location,
        }))
    }

    /// `<root>/<LAST_FIRST_HISTORY>[/Transmission]`
    fn path_for(&self, file: &ScanFile) -> String {
        let mut dir = Path::new(&self.root).join(file.subject.file_name_part());
        if file.scan_type == ScanType::Tx {
            dir = dir.join(TRANSMISSION_DIR);
        }
        dir.to_string_lossy().into_owned()
    }

    /// `LAST-FIRST-HISTORY-YYYY.M.D.H.M.S_TYPE.EXT`
    fn name_for(&self, file: &ScanFile) -> String {
        format!(
            "{}-{}_{}.{}",
            file.subject.acs_name_part(),
            file.datetime.acs_code(),
            file.scan_type,
            file.class.suffix()
        )
    }

    fn archive_format_for(&self, _source: &ScanFile) -> ArchiveFormat {
        ArchiveFormat::Native
    }

    fn stat(&self, location: &Location) -> Result<Option<PhysicalStat>, Error> {
        physical::stat_path(&location.full_path())
    }

    fn is_copy_of(&self, candidate: &ScanFile, source: &ScanFile) -> Result<bool, Error> {
        physical::is_copy_on_disk(candidate, source)
    }

    fn store_copy(&self, source: &ScanFile, dest: &ScanFile) -> Result<(), Error> {
        physical::store_on_disk(source, dest)
    }

    fn open(&self, file: &ScanFile) -> Result<Box<dyn Read + Send>, Error> {
        physical::open_stored(file)
    }

    fn delete(&self, file: &ScanFile) -> Result<(), Error> {
        physical::remove(&file.location)
    }

    fn delete_entry(&self, address: &str) -> Result<(), Error> {
        physical::remove_path(Path::new(address))
    }

    fn prune_empty_directories(&self) -> Result<usize, Error> {
        physical::prune_empty_dirs(Path::new(&self.root))
    }
}
