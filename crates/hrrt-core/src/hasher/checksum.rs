use tracing::{debug, trace};

use super::digest::digest_reader;
use crate::backend::StorageBackend;
use crate::error::Error;
use crate::model::ScanFile;
use crate::storage::Index;

/// Where a file's checksums came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumSource {
    /// Already set on the file.
    Present,
    /// Reused from a matching index record.
    Index,
    /// Read back from metadata the backend stored with the bytes.
    Stored,
    /// Computed by reading the whole file.
    Computed,
}

/// Fills in file checksums, reading file content only when neither the index
/// nor the backend already knows them.
pub struct ChecksumService<'a> {
    index: &'a Index,
    compute_md5: bool,
}

impl<'a> ChecksumService<'a> {
    pub fn new(index: &'a Index, compute_md5: bool) -> Self {
        Self { index, compute_md5 }
    }

    pub fn ensure_checksums(
        &self,
        backend: &dyn StorageBackend,
        file: &mut ScanFile,
    ) -> Result<ChecksumSource, Error> {
        if file.checksums.crc32.is_some() && (!self.compute_md5 || file.checksums.md5.is_some()) {
            return Ok(ChecksumSource::Present);
        }

        let record = match file.required_fields() {
            Some(required) => self.index.find_file(&required)?,
            None => None,
        };
        if let Some(record) = &record {
            if record.file_crc32.is_some() {
                trace!("Found checksums for {} in index", file.full_path().display());
                file.checksums.crc32 = record.file_crc32.clone();
                file.checksums.md5 = record.file_md5.clone();
                return Ok(ChecksumSource::Index);
            }
        }

        if let Some(stored) = backend.stored_checksums(file)? {
            if stored.crc32.is_some() {
                trace!("Using stored checksums for {}", file.full_path().display());
                file.checksums = stored;
                return Ok(ChecksumSource::Stored);
            }
        }

        debug!(
            "Computing checksums for {} on {}",
            file.full_path().display(),
            backend.kind()
        );
        let reader = backend.open(file)?;
        file.checksums = digest_reader(reader, self.compute_md5)?;

        // An indexed record that predates checksumming gets them now.
        if let Some(record) = record {
            self.index.update_file_checksums(record.id, &file.checksums)?;
        }
        Ok(ChecksumSource::Computed)
    }
}
