//! Filesystem primitives shared by the ACS and local backends.

use filetime::FileTime;
use sevenz_rust::{Password, SevenZArchiveEntry, SevenZReader, SevenZWriter};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{BackendKind, PhysicalStat};
use crate::error::Error;
use crate::model::{ArchiveFormat, Location, ScanFile};
use crate::scanner;

/// Size and modification time, or `None` if nothing is there.
pub fn stat_path(path: &Path) -> Result<Option<PhysicalStat>, Error> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => Ok(Some(PhysicalStat {
            size: metadata.len(),
            modified: FileTime::from_last_modification_time(&metadata).unix_seconds(),
        })),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Every file under `root`, as strings.
pub fn list_files(root: &str, ignore_patterns: &[String]) -> Result<Vec<String>, Error> {
    Ok(scanner::collect_files(Path::new(root), ignore_patterns)?
        .into_iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect())
}

/// Write into a hidden sibling first so a crash never leaves a truncated
/// file under the final name.
fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}.partial", name))
}

fn prepare_parent(dest: &Path) -> Result<(), Error> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Byte-for-byte copy that carries the source modification time across.
pub fn copy_preserving_mtime(src: &Path, dest: &Path) -> Result<(), Error> {
    prepare_parent(dest)?;
    let partial = partial_path(dest);
    let result = (|| -> Result<(), Error> {
        fs::copy(src, &partial)?;
        let mtime = FileTime::from_last_modification_time(&fs::metadata(src)?);
        filetime::set_file_mtime(&partial, mtime)?;
        fs::rename(&partial, dest)?;
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}

/// Wrap `src` in a 7z container holding one entry named `entry_name`.
pub fn compress_into(src: &Path, dest: &Path, entry_name: &str) -> Result<(), Error> {
    prepare_parent(dest)?;
    let partial = partial_path(dest);
    let result = (|| -> Result<(), Error> {
        let mut writer = SevenZWriter::create(&partial)?;
        writer.push_archive_entry(
            SevenZArchiveEntry::from_path(src, entry_name.to_string()),
            Some(File::open(src)?),
        )?;
        writer.finish()?;
        fs::rename(&partial, dest)?;
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}

/// Uncompressed size of the first file entry in a 7z container.
pub fn compressed_entry_size(path: &Path) -> Result<Option<u64>, Error> {
    if !path.is_file() {
        return Ok(None);
    }
    let mut reader = SevenZReader::open(path, Password::empty())?;
    let mut size = None;
    reader.for_each_entries(|entry, _| {
        if entry.is_directory() {
            return Ok(true);
        }
        size = Some(entry.size());
        Ok(false)
    })?;
    Ok(size)
}

/// Open the stored bytes. For compressed files that is the container itself.
pub fn open_stored(file: &ScanFile) -> Result<Box<dyn Read + Send>, Error> {
    Ok(Box::new(File::open(file.full_path())?))
}

/// Copy test for filesystem backends. Native copies match on size and
/// modification time. Compressed copies match on the entry size alone, since
/// compression does not carry the modification time.
pub fn is_copy_on_disk(candidate: &ScanFile, source: &ScanFile) -> Result<bool, Error> {
    let Some(source_size) = source.physical.size else {
        return Ok(false);
    };
    match candidate.archive_format {
        ArchiveFormat::Native => {
            let Some(stat) = stat_path(&candidate.full_path())? else {
                return Ok(false);
            };
            Ok(stat.size == source_size && Some(stat.modified) == source.physical.modified)
        }
        ArchiveFormat::Compressed => {
            match compressed_entry_size(&candidate.full_path()) {
                Ok(size) => Ok(size == Some(source_size)),
                // A damaged container is simply not a copy; it gets rewritten.
                Err(Error::Compression(e)) => {
                    warn!(
                        "Unreadable container {}: {}",
                        candidate.full_path().display(),
                        e
                    );
                    Ok(false)
                }
                Err(e) => Err(e),
            }
        }
    }
}

/// Materialize `dest` from a file that lives on a filesystem backend.
pub fn store_on_disk(source: &ScanFile, dest: &ScanFile) -> Result<(), Error> {
    if source.backend == BackendKind::Cloud {
        return Err(Error::Unsupported(format!(
            "copy to {} from object storage",
            dest.full_path().display()
        )));
    }
    let src = source.full_path();
    let target = dest.full_path();
    match dest.archive_format {
        ArchiveFormat::Native => copy_preserving_mtime(&src, &target)?,
        ArchiveFormat::Compressed => compress_into(&src, &target, &dest.standard_name())?,
    }
    debug!("Stored {} -> {}", src.display(), target.display());
    Ok(())
}

pub fn remove(location: &Location) -> Result<(), Error> {
    remove_path(&location.full_path())
}

pub fn remove_path(path: &Path) -> Result<(), Error> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Remove empty directories beneath `root`, deepest first. The root stays.
pub fn prune_empty_dirs(root: &Path) -> Result<usize, Error> {
    if !root.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let is_empty = fs::read_dir(entry.path())?.next().is_none();
        if is_empty {
            fs::remove_dir(entry.path())?;
            debug!("Removed empty directory {}", entry.path().display());
            removed += 1;
        }
    }
    Ok(removed)
}
