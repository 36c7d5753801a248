use std::io::Read;
use std::path::Path;

use super::physical;
use super::{BackendKind, Discovered, PhysicalStat, StorageBackend};
use crate::error::Error;
use crate::model::{ArchiveFormat, Location, ScanFile, COMPRESSED_SUFFIX};

/// The on-premises backup tree, bucketed by scan year and month. Raw
/// list-mode data is stored compressed, everything else as-is.
pub struct LocalBackend {
    root: String,
    hostname: String,
    ignore_patterns: Vec<String>,
}

impl LocalBackend {
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

impl StorageBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
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

    /// `<root>/<YYYY>/<MM>`
    fn path_for(&self, file: &ScanFile) -> String {
        Path::new(&self.root)
            .join(format!("{:04}", file.datetime.year()))
            .join(format!("{:02}", file.datetime.month()))
            .to_string_lossy()
            .into_owned()
    }

    /// Standard name, with the container suffix when compressed.
    fn name_for(&self, file: &ScanFile) -> String {
        match file.archive_format {
            ArchiveFormat::Native => file.standard_name(),
            ArchiveFormat::Compressed => format!("{}.{}", file.standard_name(), COMPRESSED_SUFFIX),
        }
    }

    fn archive_format_for(&self, source: &ScanFile) -> ArchiveFormat {
        source.class.archive_format()
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
