//! Guard for destructive bulk clears. Only the configured test root may be
//! wiped, and only while it holds few enough files to plausibly be test data.

use tracing::{info, warn};

use crate::backend::StorageBackend;
use crate::config::RootPair;
use crate::error::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub files_deleted: usize,
    pub directories_pruned: usize,
}

/// Check that `root` may be cleared. Returns the entries it holds.
///
/// The root comparison happens before anything is listed, so a production
/// root is refused whatever it contains, even nothing.
pub fn check_clear_allowed(
    backend: &dyn StorageBackend,
    roots: &RootPair,
    max_files: usize,
) -> Result<Vec<String>, Error> {
    let root = backend.root();
    let refuse = |reason: String| Error::Guard {
        root: root.to_string(),
        reason,
    };

    if root != roots.test {
        return Err(refuse(format!(
            "not the configured test root '{}'",
            roots.test
        )));
    }
    if root == roots.production {
        return Err(refuse("test root is also the production root".to_string()));
    }

    let entries = backend.all_entries()?;
    if entries.len() > max_files {
        return Err(refuse(format!(
            "holds {} files, more than the {} allowed for test data",
            entries.len(),
            max_files
        )));
    }
    Ok(entries)
}

/// Delete everything under a test root, through [`check_clear_allowed`].
pub fn clear_test_archive(
    backend: &dyn StorageBackend,
    roots: &RootPair,
    max_files: usize,
) -> Result<ClearReport, Error> {
    let entries = check_clear_allowed(backend, roots, max_files)?;
    warn!(
        "Clearing {} files from test root {} ({})",
        entries.len(),
        backend.root(),
        backend.kind()
    );

    let mut report = ClearReport::default();
    for entry in &entries {
        backend.delete_entry(entry)?;
        report.files_deleted += 1;
    }
    report.directories_pruned = backend.prune_empty_directories()?;
    info!(
        "Cleared {}: {} files, {} directories",
        backend.root(),
        report.files_deleted,
        report.directories_pruned
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use std::fs;
    use tempfile::tempdir;

    fn roots(production: &str, test: &str) -> RootPair {
        RootPair {
            production: production.to_string(),
            test: test.to_string(),
        }
    }

    #[test]
    fn test_refuses_production_root_when_empty() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let backend = LocalBackend::new(root.clone(), "host");

        let err = clear_test_archive(&backend, &roots(&root, "/data/archive_test"), 100).unwrap_err();
        assert!(matches!(err, Error::Guard { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_refuses_when_test_equals_production() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let backend = LocalBackend::new(root.clone(), "host");

        let err = clear_test_archive(&backend, &roots(&root, &root), 100).unwrap_err();
        assert!(matches!(err, Error::Guard { .. }));
    }

    #[test]
    fn test_refuses_over_ceiling_without_deleting() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        for i in 0..4 {
            fs::write(dir.path().join(format!("f{}.hc", i)), b"x").unwrap();
        }
        let backend = LocalBackend::new(root.clone(), "host");

        let err = clear_test_archive(&backend, &roots("/data/archive", &root), 3).unwrap_err();
        assert!(matches!(err, Error::Guard { .. }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 4);
    }

    #[test]
    fn test_clears_test_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        fs::create_dir_all(dir.path().join("2015/08")).unwrap();
        fs::write(dir.path().join("2015/08/a.hc"), b"x").unwrap();
        let backend = LocalBackend::new(root.clone(), "host");

        let report = clear_test_archive(&backend, &roots("/data/archive", &root), 100).unwrap();
        assert_eq!(report.files_deleted, 1);
        assert_eq!(report.directories_pruned, 2);
        assert!(dir.path().is_dir());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
