use glob::Pattern;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::error;

/// Compile ignore globs, logging and dropping any that are invalid.
pub fn compile_patterns(ignore_globs: &[String]) -> Vec<Pattern> {
    ignore_globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect()
}

/// Parallel directory traversal returning every regular file under `root`,
/// sorted. Skips symlinks and anything matching an ignore pattern. A missing
/// root yields an empty list.
pub fn collect_files(root: &Path, ignore_globs: &[String]) -> io::Result<Vec<PathBuf>> {
    let ignore_patterns = compile_patterns(ignore_globs);
    let found = Mutex::new(Vec::new());
    visit_dirs(root, &found, &ignore_patterns)?;
    let mut files = found
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    files.sort();
    Ok(files)
}

fn visit_dirs(dir: &Path, found: &Mutex<Vec<PathBuf>>, ignore_patterns: &[Pattern]) -> io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    if ignore_patterns
        .iter()
        .any(|pattern| pattern.matches_path(dir))
    {
        return Ok(());
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            if err.kind() == io::ErrorKind::PermissionDenied {
                error!(
                    "Access denied reading directory {}: {}",
                    dir.display(),
                    err
                );
                return Ok(());
            } else {
                return Err(io::Error::new(
                    err.kind(),
                    format!("Error reading directory {}: {}", dir.display(), err),
                ));
            }
        }
    };

    entries.par_bridge().try_for_each(|entry_result| {
        let entry = entry_result.map_err(|err| {
            io::Error::new(
                err.kind(),
                format!("Error reading entry in directory {}: {}", dir.display(), err),
            )
        })?;

        let path = entry.path();
        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            // Removed between listing and stat.
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(io::Error::new(
                    err.kind(),
                    format!("Error getting metadata for {}: {}", path.display(), err),
                ));
            }
        };

        if metadata.file_type().is_symlink() {
            return Ok(());
        }
        if metadata.is_dir() {
            visit_dirs(&path, found, ignore_patterns)?;
        } else if !ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(&path))
        {
            found
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(path);
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_collects_nested_files_sorted() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b/Transmission")).unwrap();
        fs::write(dir.path().join("b/Transmission/two.hc"), b"2").unwrap();
        fs::write(dir.path().join("a.hc"), b"1").unwrap();

        let files = collect_files(dir.path(), &[]).unwrap();
        assert_eq!(
            files,
            vec![
                dir.path().join("a.hc"),
                dir.path().join("b/Transmission/two.hc")
            ]
        );
    }

    #[test]
    fn test_ignore_patterns_skip_matches() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("keep.l64"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let files = collect_files(dir.path(), &["*.txt".to_string()]).unwrap();
        assert_eq!(files, vec![dir.path().join("keep.l64")]);
    }

    #[test]
    fn test_missing_root_is_empty() {
        let dir = tempdir().unwrap();
        let files = collect_files(&dir.path().join("absent"), &[]).unwrap();
        assert!(files.is_empty());
    }
}
