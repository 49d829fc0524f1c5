/*!
Storage adapters for checkpoint persistence.

The checkpoint engine only sees the [`StorageAdapter`] port; where the bytes
end up is decided by the adapter it is built with.
*/

pub mod local;

pub use local::LocalFileStorage;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{PersistError, Result};

/// Storage abstraction for saving and loading checkpoint containers
pub trait StorageAdapter {
    /// Save checkpoint data to the specified location
    ///
    /// # Arguments
    /// * `data` - The compressed checkpoint container
    /// * `path` - The storage location (interpretation depends on implementation)
    fn save(&self, data: &[u8], path: &str) -> Result<()>;

    /// Load checkpoint data from the specified location
    fn load(&self, path: &str) -> Result<Vec<u8>>;

    /// Check if a checkpoint exists at the specified location
    fn exists(&self, path: &str) -> bool;

    /// Delete a checkpoint; deleting a missing checkpoint is not an error
    fn delete(&self, path: &str) -> Result<()>;

    /// Paths of the stored checkpoints whose path starts with `prefix`, sorted
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// In-memory storage adapter
///
/// Clones share the same map, so one instance can be handed to several
/// engines or threads.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.data
            .lock()
            .map_err(|_| PersistError::storage("Memory storage lock poisoned"))
    }
}

impl StorageAdapter for MemoryStorage {
    fn save(&self, data: &[u8], path: &str) -> Result<()> {
        self.entries()?.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn load(&self, path: &str) -> Result<Vec<u8>> {
        self.entries()?
            .get(path)
            .cloned()
            .ok_or_else(|| PersistError::storage(format!("Checkpoint not found: {path}")))
    }

    fn exists(&self, path: &str) -> bool {
        self.entries()
            .map(|entries| entries.contains_key(path))
            .unwrap_or(false)
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.entries()?.remove(path);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut paths: Vec<String> = self
            .entries()?
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect();
        paths.sort();
        Ok(paths)
    }
}
