use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;
use tracing::{debug, warn};

use super::object_store::ObjectStore;
use super::{BackendKind, Discovered, PhysicalStat, StorageBackend};
use crate::error::Error;
use crate::hasher::digest_file;
use crate::model::{ArchiveFormat, Checksums, Location, ScanFile, COMPRESSED_SUFFIX};

pub const META_STANDARD_NAME: &str = "standard-name";
pub const META_NAME_LAST: &str = "name-last";
pub const META_NAME_FIRST: &str = "name-first";
pub const META_HISTORY: &str = "history";
pub const META_SCAN_DATETIME: &str = "scan-datetime";
pub const META_SCAN_TYPE: &str = "scan-type";
pub const META_FILE_CLASS: &str = "file-class";
pub const META_FILE_MODIFIED: &str = "file-modified";
pub const META_CRC32: &str = "crc32";
pub const META_MD5: &str = "md5";

/// Object storage. Keys carry only date, time and extension; subject and
/// scan identity travel as object metadata.
pub struct CloudBackend {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    hostname: String,
}

impl CloudBackend {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            hostname: hostname.into(),
        }
    }

    /// The standard name including any container suffix.
    fn stored_name(file: &ScanFile) -> String {
        match file.archive_format {
            ArchiveFormat::Native => file.standard_name(),
            ArchiveFormat::Compressed => format!("{}.{}", file.standard_name(), COMPRESSED_SUFFIX),
        }
    }

    fn object_metadata(source: &ScanFile, dest: &ScanFile, checksums: &Checksums) -> HashMap<String, String> {
        let subject = &dest.subject;
        let mut metadata = HashMap::from([
            (META_STANDARD_NAME.to_string(), Self::stored_name(dest)),
            (META_NAME_LAST.to_string(), subject.name_last().to_string()),
            (META_NAME_FIRST.to_string(), subject.name_first().to_string()),
            (META_HISTORY.to_string(), subject.history().to_string()),
            (META_SCAN_DATETIME.to_string(), dest.datetime.index_value()),
            (META_SCAN_TYPE.to_string(), dest.scan_type.to_string()),
            (META_FILE_CLASS.to_string(), dest.class.to_string()),
        ]);
        if let Some(modified) = source.physical.modified {
            metadata.insert(META_FILE_MODIFIED.to_string(), modified.to_string());
        }
        if let Some(crc32) = &checksums.crc32 {
            metadata.insert(META_CRC32.to_string(), crc32.clone());
        }
        if let Some(md5) = &checksums.md5 {
            metadata.insert(META_MD5.to_string(), md5.clone());
        }
        metadata
    }
}

impl StorageBackend for CloudBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cloud
    }

    fn root(&self) -> &str {
        &self.bucket
    }

    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn all_entries(&self) -> Result<Vec<String>, Error> {
        self.store.list_keys()
    }

    fn discover(&self, address: &str) -> Result<Option<Discovered>, Error> {
        let Some(head) = self.store.head(address)? else {
            return Ok(None);
        };
        let name = match head.metadata.get(META_STANDARD_NAME) {
            Some(name) => name.clone(),
            None => {
                warn!("Object {} carries no {} metadata", address, META_STANDARD_NAME);
                address.to_string()
            }
        };
        Ok(Some(Discovered {
            name,
            location: Location::new(self.bucket.clone(), address),
        }))
    }

    fn path_for(&self, _file: &ScanFile) -> String {
        self.bucket.clone()
    }

    /// `YYMMDD_HHMMSS.EXT`
    fn name_for(&self, file: &ScanFile) -> String {
        format!("{}.{}", file.datetime.datetime_code(), file.extension())
    }

    fn archive_format_for(&self, source: &ScanFile) -> ArchiveFormat {
        source.archive_format
    }

    /// Object stores do not keep the source mtime, so it is read back from
    /// metadata, falling back to the upload time.
    fn stat(&self, location: &Location) -> Result<Option<PhysicalStat>, Error> {
        Ok(self.store.head(&location.name)?.map(|head| {
            let modified = head
                .metadata
                .get(META_FILE_MODIFIED)
                .and_then(|m| m.parse::<i64>().ok())
                .or(head.last_modified)
                .unwrap_or(0);
            PhysicalStat {
                size: head.size,
                modified,
            }
        }))
    }

    fn is_copy_of(&self, candidate: &ScanFile, source: &ScanFile) -> Result<bool, Error> {
        let Some(stat) = self.stat(&candidate.location)? else {
            return Ok(false);
        };
        let same_size = Some(stat.size) == source.physical.size;
        Ok(match candidate.archive_format {
            ArchiveFormat::Native => same_size && Some(stat.modified) == source.physical.modified,
            // Containers are compared by size alone.
            ArchiveFormat::Compressed => same_size,
        })
    }

    fn store_copy(&self, source: &ScanFile, dest: &ScanFile) -> Result<(), Error> {
        if !source.backend.is_filesystem() {
            return Err(Error::Unsupported(format!(
                "copy to {} from object storage",
                dest.location.name
            )));
        }
        let path = source.full_path();
        let checksums = if source.checksums.crc32.is_some() && source.checksums.md5.is_some() {
            source.checksums.clone()
        } else {
            digest_file(&path, true)?
        };
        let metadata = Self::object_metadata(source, dest, &checksums);
        self.store.put_file(&dest.location.name, &path, metadata)?;
        debug!("Uploaded {} -> {}/{}", path.display(), self.bucket, dest.location.name);
        Ok(())
    }

    fn open(&self, file: &ScanFile) -> Result<Box<dyn Read + Send>, Error> {
        Ok(Box::new(Cursor::new(self.store.get(&file.location.name)?)))
    }

    fn stored_checksums(&self, file: &ScanFile) -> Result<Option<Checksums>, Error> {
        Ok(self.store.head(&file.location.name)?.map(|head| Checksums {
            crc32: head.metadata.get(META_CRC32).cloned(),
            md5: head.metadata.get(META_MD5).cloned(),
        }))
    }

    fn delete(&self, file: &ScanFile) -> Result<(), Error> {
        self.store.delete(&file.location.name)
    }

    fn delete_entry(&self, address: &str) -> Result<(), Error> {
        self.store.delete(address)
    }

    fn prune_empty_directories(&self) -> Result<usize, Error> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryObjectStore;
    use crate::grammar::{ScanDateTime, ScanType};
    use crate::model::{FileClass, Subject};
    use std::fs;
    use tempfile::tempdir;

    fn local_file(dir: &std::path::Path) -> ScanFile {
        let path = dir.join("SMITH_JOHN_1234567_PET_150821_082939_EM.l64.7z");
        fs::write(&path, b"container bytes").unwrap();
        let mut file = ScanFile::new(
            FileClass::L64,
            ArchiveFormat::Compressed,
            BackendKind::Local,
            Arc::new(Subject::new("SMITH", "JOHN", "1234567")),
            ScanDateTime::from_components(2015, 8, 21, 8, 29, 39).unwrap(),
            ScanType::Em,
            Location::from_path(&path),
        );
        file.physical.size = Some(15);
        file.physical.modified = Some(1_440_145_779);
        file
    }

    #[test]
    fn test_upload_carries_identity_in_metadata() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let cloud = CloudBackend::new(store.clone(), "hrrt-recon-test", "backup");
        let source = local_file(dir.path());

        let dest = source.archive_copy(&cloud);
        assert_eq!(dest.location.path, "hrrt-recon-test");
        assert_eq!(dest.location.name, "150821_082939.l64.7z");
        assert!(!cloud.is_copy_of(&dest, &source).unwrap());

        cloud.store_copy(&source, &dest).unwrap();
        assert!(cloud.is_copy_of(&dest, &source).unwrap());

        let found = cloud.discover("150821_082939.l64.7z").unwrap().unwrap();
        assert_eq!(found.name, "SMITH_JOHN_1234567_PET_150821_082939_EM.l64.7z");
        let sums = cloud.stored_checksums(&dest).unwrap().unwrap();
        assert_eq!(sums.crc32.unwrap().len(), 8);
        assert_eq!(sums.md5.unwrap().len(), 32);
    }

    #[test]
    fn test_compressed_copy_ignores_mtime_but_not_size() {
        let dir = tempdir().unwrap();
        let cloud = CloudBackend::new(Arc::new(MemoryObjectStore::new()), "b", "backup");
        let mut source = local_file(dir.path());
        let dest = source.archive_copy(&cloud);
        assert_eq!(dest.archive_format, ArchiveFormat::Compressed);
        cloud.store_copy(&source, &dest).unwrap();

        source.physical.modified = Some(1_440_145_780);
        assert!(cloud.is_copy_of(&dest, &source).unwrap());

        source.physical.size = Some(16);
        assert!(!cloud.is_copy_of(&dest, &source).unwrap());
    }

    #[test]
    fn test_native_copy_compares_mtime() {
        let dir = tempdir().unwrap();
        let cloud = CloudBackend::new(Arc::new(MemoryObjectStore::new()), "b", "backup");
        let path = dir.path().join("SMITH_JOHN_1234567_PET_150821_082939_EM.hc");
        fs::write(&path, b"hc counts").unwrap();
        let mut source = ScanFile::new(
            FileClass::Hc,
            ArchiveFormat::Native,
            BackendKind::Local,
            Arc::new(Subject::new("SMITH", "JOHN", "1234567")),
            ScanDateTime::from_components(2015, 8, 21, 8, 29, 39).unwrap(),
            ScanType::Em,
            Location::from_path(&path),
        );
        source.physical.size = Some(9);
        source.physical.modified = Some(1_440_145_779);
        let dest = source.archive_copy(&cloud);
        cloud.store_copy(&source, &dest).unwrap();
        assert!(cloud.is_copy_of(&dest, &source).unwrap());

        source.physical.modified = Some(1_440_145_780);
        assert!(!cloud.is_copy_of(&dest, &source).unwrap());
    }

    #[test]
    fn test_absent_object_reads_as_absent() {
        let cloud = CloudBackend::new(Arc::new(MemoryObjectStore::new()), "b", "backup");
        assert!(cloud.discover("missing.hc").unwrap().is_none());
        assert!(cloud.stat(&Location::new("b", "missing.hc")).unwrap().is_none());
    }
}
