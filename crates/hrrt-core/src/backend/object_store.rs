use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use crate::error::Error;

/// What a HEAD request reports about one object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
    /// Upload time, seconds since the epoch.
    pub last_modified: Option<i64>,
    pub metadata: HashMap<String, String>,
}

/// The handful of object storage calls the cloud backend makes.
pub trait ObjectStore: Send + Sync {
    fn list_keys(&self) -> Result<Vec<String>, Error>;

    /// `None` when the key does not exist.
    fn head(&self, key: &str) -> Result<Option<ObjectMeta>, Error>;

    fn put_file(
        &self,
        key: &str,
        path: &Path,
        metadata: HashMap<String, String>,
    ) -> Result<(), Error>;

    fn get(&self, key: &str) -> Result<Vec<u8>, Error>;

    fn delete(&self, key: &str) -> Result<(), Error>;
}

struct StoredObject {
    bytes: Vec<u8>,
    meta: ObjectMeta,
}

/// In-process store for tests and dry runs.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ObjectStore for MemoryObjectStore {
    fn list_keys(&self) -> Result<Vec<String>, Error> {
        Ok(self.lock().keys().cloned().collect())
    }

    fn head(&self, key: &str) -> Result<Option<ObjectMeta>, Error> {
        Ok(self.lock().get(key).map(|object| object.meta.clone()))
    }

    fn put_file(
        &self,
        key: &str,
        path: &Path,
        metadata: HashMap<String, String>,
    ) -> Result<(), Error> {
        let bytes = fs::read(path)?;
        let meta = ObjectMeta {
            size: bytes.len() as u64,
            last_modified: Some(chrono::Utc::now().timestamp()),
            metadata,
        };
        self.lock()
            .insert(key.to_string(), StoredObject { bytes, meta });
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, Error> {
        self.lock()
            .get(key)
            .map(|object| object.bytes.clone())
            .ok_or_else(|| Error::Cloud(format!("no such key: {}", key)))
    }

    fn delete(&self, key: &str) -> Result<(), Error> {
        self.lock().remove(key);
        Ok(())
    }
}
