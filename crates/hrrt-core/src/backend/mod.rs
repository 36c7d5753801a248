//! Storage backends: the scanner console output area (ACS), the on-premises
//! backup tree, and cloud object storage.
//!
//! Each backend owns its naming and placement policy and its own notion of
//! "this file is already a copy of that one".

pub mod cloud;
pub mod local;
pub mod object_store;
pub mod physical;
pub mod s3;
pub mod source;

use std::fmt;
use std::io::Read;

use crate::error::Error;
use crate::model::{ArchiveFormat, Checksums, Location, ScanFile};

pub use cloud::CloudBackend;
pub use local::LocalBackend;
pub use object_store::{MemoryObjectStore, ObjectMeta, ObjectStore};
pub use s3::S3ObjectStore;
pub use source::SourceBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Source,
    Local,
    Cloud,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Source => "acs",
            BackendKind::Local => "local",
            BackendKind::Cloud => "cloud",
        }
    }

    pub fn is_filesystem(&self) -> bool {
        !matches!(self, BackendKind::Cloud)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size and modification time of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalStat {
    pub size: u64,
    pub modified: i64,
}

/// A raw entry resolved to the name the grammar should parse and its location.
#[derive(Debug, Clone)]
pub struct Discovered {
    pub name: String,
    pub location: Location,
}

pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Root directory, or bucket name for object storage.
    fn root(&self) -> &str;

    /// Host recorded against files observed through this backend.
    fn hostname(&self) -> &str;

    /// Raw addresses of everything stored: file paths or object keys.
    fn all_entries(&self) -> Result<Vec<String>, Error>;

    /// Resolve a raw address. `None` when the entry has vanished meanwhile.
    fn discover(&self, address: &str) -> Result<Option<Discovered>, Error>;

    fn path_for(&self, file: &ScanFile) -> String;

    fn name_for(&self, file: &ScanFile) -> String;

    /// Format a copy of `source` takes when stored here.
    fn archive_format_for(&self, source: &ScanFile) -> ArchiveFormat;

    /// `None` when nothing is stored at `location`.
    fn stat(&self, location: &Location) -> Result<Option<PhysicalStat>, Error>;

    /// Fill in size, modification time and host. An absent file leaves size
    /// and modification time unset rather than failing.
    fn read_physical(&self, file: &mut ScanFile) -> Result<(), Error> {
        let stat = self.stat(&file.location)?;
        file.physical.size = stat.map(|s| s.size);
        file.physical.modified = stat.map(|s| s.modified);
        file.physical.hostname = Some(self.hostname().to_string());
        Ok(())
    }

    /// Whether `candidate`, stored on this backend, is a complete copy of `source`.
    fn is_copy_of(&self, candidate: &ScanFile, source: &ScanFile) -> Result<bool, Error>;

    /// Materialize `dest` on this backend from the bytes of `source`.
    fn store_copy(&self, source: &ScanFile, dest: &ScanFile) -> Result<(), Error>;

    fn open(&self, file: &ScanFile) -> Result<Box<dyn Read + Send>, Error>;

    /// Checksums recorded alongside the stored bytes, if the backend keeps any.
    fn stored_checksums(&self, _file: &ScanFile) -> Result<Option<Checksums>, Error> {
        Ok(None)
    }

    fn delete(&self, file: &ScanFile) -> Result<(), Error>;

    fn delete_entry(&self, address: &str) -> Result<(), Error>;

    /// Remove directories left empty under the root. Returns how many went.
    fn prune_empty_directories(&self) -> Result<usize, Error>;
}
