/*!
Local filesystem storage adapter.
*/

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::StorageAdapter;
use crate::{PersistError, Result};

/// Stores checkpoints as files on the local filesystem
///
/// Missing parent directories are created on save.
///
/// # Example
/// ```rust
/// use modelstate_core::storage::{LocalFileStorage, StorageAdapter};
///
/// let dir = tempfile::tempdir()?;
/// let storage = LocalFileStorage::with_base_dir(dir.path());
/// storage.save(b"compressed checkpoint", "jobs/forecast/0.json.gz")?;
/// assert!(storage.exists("jobs/forecast/0.json.gz"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct LocalFileStorage {
    base_dir: Option<PathBuf>,
}

impl LocalFileStorage {
    /// Paths given to the adapter are used as-is
    pub fn new() -> Self {
        Self { base_dir: None }
    }

    /// Paths given to the adapter are resolved against `base_dir`
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: Some(base_dir.as_ref().to_path_buf()),
        }
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        match &self.base_dir {
            Some(base) => base.join(path),
            None => PathBuf::from(path),
        }
    }

    fn ensure_parent_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    PersistError::storage(format!(
                        "Failed to create directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }
        Ok(())
    }

    fn collect_files(dir: &Path, root: &Path, found: &mut Vec<String>) -> Result<()> {
        let entries = fs::read_dir(dir).map_err(|e| {
            PersistError::storage(format!("Failed to read directory {}: {e}", dir.display()))
        })?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                Self::collect_files(&path, root, found)?;
            } else if let Ok(relative) = path.strip_prefix(root) {
                found.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(())
    }
}

impl StorageAdapter for LocalFileStorage {
    fn save(&self, data: &[u8], path: &str) -> Result<()> {
        let full_path = self.resolve_path(path);
        self.ensure_parent_dir(&full_path)?;
        fs::write(&full_path, data).map_err(|e| {
            PersistError::storage(format!(
                "Failed to write checkpoint to {}: {e}",
                full_path.display()
            ))
        })?;
        debug!(path = %full_path.display(), bytes = data.len(), "Wrote checkpoint file");
        Ok(())
    }

    fn load(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.resolve_path(path);
        fs::read(&full_path).map_err(|e| {
            PersistError::storage(format!(
                "Failed to read checkpoint from {}: {e}",
                full_path.display()
            ))
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve_path(path).is_file()
    }

    fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.resolve_path(path);
        if full_path.exists() {
            fs::remove_file(&full_path).map_err(|e| {
                PersistError::storage(format!(
                    "Failed to delete checkpoint {}: {e}",
                    full_path.display()
                ))
            })?;
        }
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = self.resolve_path("");
        let root = if root.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            root
        };
        if !root.is_dir() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        Self::collect_files(&root, &root, &mut found)?;
        found.retain(|path| path.starts_with(prefix));
        found.sort();
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_file_storage_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::with_base_dir(temp_dir.path());

        let path = "checkpoint_0.json.gz";
        storage.save(b"checkpoint bytes", path).unwrap();
        assert!(storage.exists(path));
        assert_eq!(storage.load(path).unwrap(), b"checkpoint bytes");

        storage.delete(path).unwrap();
        assert!(!storage.exists(path));
        assert!(storage.delete(path).is_ok());
    }

    #[test]
    fn test_local_file_storage_nested_directories() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::with_base_dir(temp_dir.path());

        let path = "jobs/forecast/partition_3/state_7.xml.gz";
        storage.save(b"nested", path).unwrap();
        assert!(storage.exists(path));
        assert!(!storage.exists("jobs/forecast"));
    }

    #[test]
    fn test_list_recurses_and_filters() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::with_base_dir(temp_dir.path());
        storage.save(b"a", "jobs/b/1.json.gz").unwrap();
        storage.save(b"b", "jobs/a/0.json.gz").unwrap();
        storage.save(b"c", "other/0.json.gz").unwrap();

        assert_eq!(
            storage.list("jobs/").unwrap(),
            vec!["jobs/a/0.json.gz", "jobs/b/1.json.gz"]
        );
        assert_eq!(storage.list("").unwrap().len(), 3);

        let missing = LocalFileStorage::with_base_dir(temp_dir.path().join("absent"));
        assert!(missing.list("").unwrap().is_empty());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::with_base_dir(temp_dir.path());
        assert!(matches!(
            storage.load("nonexistent.json.gz"),
            Err(PersistError::Storage(_))
        ));
    }
}
