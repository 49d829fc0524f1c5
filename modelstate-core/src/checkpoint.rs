/*!
Checkpoint engine: persists state documents with metadata, compression and
integrity checking.

A checkpoint is a compressed JSON container holding the
[`CheckpointMetadata`] and the state document serialized by the configured
[`StateFormat`]. Loading reads the document back with the backend recorded in
the metadata, so an engine configured for one backend can still restore
checkpoints written with the other.
*/

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compression::{CompressionAdapter, GzipCompressor};
use crate::config::CheckpointConfig;
use crate::document::StateDocument;
use crate::formats::{AnyStateFormat, StateFormat};
use crate::inserter::{PersistState, StateInserter};
use crate::metadata::{CheckpointMetadata, METADATA_FORMAT_VERSION};
use crate::storage::{LocalFileStorage, StorageAdapter};
use crate::tag::TagMode;
use crate::traverser::{RestoreState, StateTraverser};
use crate::{PersistError, Result};

#[derive(Serialize, Deserialize, Debug)]
struct CheckpointContainer {
    metadata: CheckpointMetadata,
    state: String,
}

/// Saves, loads and verifies checkpoints
///
/// # Example
/// ```rust
/// use modelstate_core::{
///     CheckpointEngine, CheckpointMetadata, GzipCompressor, MemoryStorage, StateInserter, Tag,
/// };
///
/// const COUNT_TAG: Tag = Tag::new("a", "count");
///
/// let engine = CheckpointEngine::new(MemoryStorage::new(), GzipCompressor::new());
/// let mut inserter = engine.inserter("job_state");
/// inserter.insert_value(COUNT_TAG, 42);
///
/// let metadata = CheckpointMetadata::new("job_1", 0);
/// engine.save_document(&inserter.into_document(), &metadata, "job_1/0.json.gz")?;
///
/// let (metadata, document) = engine.load("job_1/0.json.gz")?;
/// assert_eq!(metadata.job_id, "job_1");
/// assert_eq!(document.children[0].value.as_deref(), Some("42"));
/// # Ok::<(), modelstate_core::PersistError>(())
/// ```
pub struct CheckpointEngine<S, C>
where
    S: StorageAdapter,
    C: CompressionAdapter,
{
    storage: S,
    compressor: C,
    state_format: AnyStateFormat,
    tag_mode: TagMode,
}

impl<S, C> CheckpointEngine<S, C>
where
    S: StorageAdapter,
    C: CompressionAdapter,
{
    /// Engine writing compact JSON state documents
    pub fn new(storage: S, compressor: C) -> Self {
        Self {
            storage,
            compressor,
            state_format: AnyStateFormat::of_kind(Default::default()),
            tag_mode: TagMode::Compact,
        }
    }

    pub fn with_state_format<F: Into<AnyStateFormat>>(mut self, state_format: F) -> Self {
        self.state_format = state_format.into();
        self
    }

    pub fn with_tag_mode(mut self, tag_mode: TagMode) -> Self {
        self.tag_mode = tag_mode;
        self
    }

    pub fn state_format(&self) -> &AnyStateFormat {
        &self.state_format
    }

    pub fn tag_mode(&self) -> TagMode {
        self.tag_mode
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// An inserter writing tags in this engine's mode
    pub fn inserter<R: Into<String>>(&self, root_name: R) -> StateInserter {
        StateInserter::with_mode(root_name, self.tag_mode)
    }

    /// Save a state document
    ///
    /// The document is serialized with the engine's backend, hashed and
    /// wrapped with the metadata, then compressed and stored at `path`.
    ///
    /// # Returns
    /// The metadata as stored, plus the compressed size
    ///
    /// # Errors
    /// * `PersistError::MissingMetadata` - If the metadata has no job id
    /// * `PersistError::Compression` - If compression fails
    /// * `PersistError::Storage` - If saving to storage fails
    pub fn save_document(
        &self,
        document: &StateDocument,
        metadata: &CheckpointMetadata,
        path: &str,
    ) -> Result<CheckpointMetadata> {
        let state_bytes = self.state_format.write(document)?;
        let state = String::from_utf8(state_bytes).map_err(|e| {
            PersistError::invalid_format(format!("State document is not UTF-8: {e}"))
        })?;

        let mut updated_metadata = metadata
            .clone()
            .with_encoding(self.state_format.kind(), self.tag_mode)
            .with_content_hash(state.as_bytes())
            .with_compression_algorithm(self.compressor.algorithm_name());
        updated_metadata.validate()?;

        let container = CheckpointContainer {
            metadata: updated_metadata.clone(),
            state,
        };
        let container_json = serde_json::to_vec(&container)?;
        let compressed_data = self.compressor.compress(&container_json)?;
        updated_metadata = updated_metadata.with_compressed_size(compressed_data.len());

        self.storage
            .save(&compressed_data, path)
            .map_err(|e| PersistError::storage(format!("Failed to save checkpoint: {e}")))?;

        info!(
            job_id = %updated_metadata.job_id,
            checkpoint_index = updated_metadata.checkpoint_index,
            format = self.state_format.name(),
            state_bytes = updated_metadata.uncompressed_size,
            compressed_bytes = compressed_data.len(),
            path,
            "Saved checkpoint"
        );
        #[cfg(feature = "metrics")]
        if let Some(metrics) = crate::observability::ModelStateMetrics::global() {
            metrics.record_checkpoint_saved(updated_metadata.uncompressed_size, compressed_data.len());
        }

        Ok(updated_metadata)
    }

    /// Persist `state` under a root named `root_name` and save it
    pub fn save_state<P: PersistState + ?Sized>(
        &self,
        root_name: &str,
        state: &P,
        metadata: &CheckpointMetadata,
        path: &str,
    ) -> Result<CheckpointMetadata> {
        let mut inserter = self.inserter(root_name);
        state.accept_persist_inserter(&mut inserter);
        self.save_document(&inserter.into_document(), metadata, path)
    }

    /// Load a checkpoint and parse its state document
    ///
    /// # Errors
    /// * `PersistError::Storage` - If loading from storage fails
    /// * `PersistError::Compression` - If decompression fails
    /// * `PersistError::InvalidFormat` - If the metadata format version is newer than supported
    /// * `PersistError::IntegrityCheckFailed` - If the content hash doesn't match
    pub fn load(&self, path: &str) -> Result<(CheckpointMetadata, StateDocument)> {
        let container = self.load_container(path)?;
        let document =
            AnyStateFormat::of_kind(container.metadata.state_format).read(container.state.as_bytes())?;
        debug!(
            path,
            nodes = document.node_count(),
            "Parsed checkpoint state document"
        );
        #[cfg(feature = "metrics")]
        if let Some(metrics) = crate::observability::ModelStateMetrics::global() {
            metrics.record_checkpoint_loaded();
        }
        Ok((container.metadata, document))
    }

    /// Load a checkpoint and restore an object from its top level
    pub fn load_state<T: RestoreState>(&self, path: &str) -> Result<(CheckpointMetadata, T)> {
        self.load_with(path, T::accept_restore_traverser)
    }

    /// Load a checkpoint and restore it with a caller-supplied function,
    /// for state that needs restore parameters
    pub fn load_with<T, F>(&self, path: &str, restore: F) -> Result<(CheckpointMetadata, T)>
    where
        F: FnOnce(&mut StateTraverser<'_>) -> Result<T>,
    {
        let (metadata, document) = self.load(path)?;
        let mut traverser = StateTraverser::new(&document);
        let state = restore(&mut traverser)?;
        Ok((metadata, state))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.storage.exists(path)
    }

    pub fn delete(&self, path: &str) -> Result<()> {
        self.storage
            .delete(path)
            .map_err(|e| PersistError::storage(format!("Failed to delete checkpoint: {e}")))
    }

    /// Metadata of a checkpoint, without parsing its state document
    pub fn metadata(&self, path: &str) -> Result<CheckpointMetadata> {
        Ok(self.load_container(path)?.metadata)
    }

    /// Check that a checkpoint decompresses, hashes correctly and parses
    pub fn verify(&self, path: &str) -> Result<()> {
        self.load(path).map(|_| ())
    }

    /// Stored checkpoint paths starting with `prefix`
    pub fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.storage.list(prefix)
    }

    fn load_container(&self, path: &str) -> Result<CheckpointContainer> {
        let compressed_data = self
            .storage
            .load(path)
            .map_err(|e| PersistError::storage(format!("Failed to load checkpoint: {e}")))?;
        let container_json = self.compressor.decompress(&compressed_data)?;
        let container: CheckpointContainer = serde_json::from_slice(&container_json)?;

        if !container.metadata.is_compatible() {
            return Err(PersistError::invalid_format(format!(
                "Incompatible checkpoint format version: {} (current: {METADATA_FORMAT_VERSION})",
                container.metadata.format_version
            )));
        }
        container
            .metadata
            .verify_integrity(container.state.as_bytes())?;
        Ok(container)
    }
}

/// Engine with local file storage, gzip and compact JSON
pub fn create_default_engine() -> CheckpointEngine<LocalFileStorage, GzipCompressor> {
    CheckpointEngine::new(LocalFileStorage::new(), GzipCompressor::new())
}

/// Build a local-storage engine from a validated [`CheckpointConfig`]
///
/// # Example
/// ```rust
/// use modelstate_core::{create_engine_from_config, CheckpointConfig, TagMode};
///
/// let engine = create_engine_from_config(&CheckpointConfig::readable_xml())?;
/// assert_eq!(engine.tag_mode(), TagMode::Readable);
/// # Ok::<(), modelstate_core::PersistError>(())
/// ```
pub fn create_engine_from_config(
    config: &CheckpointConfig,
) -> Result<CheckpointEngine<LocalFileStorage, GzipCompressor>> {
    config.validate()?;
    let storage = match &config.local_base_path {
        Some(base_path) => LocalFileStorage::with_base_dir(base_path),
        None => LocalFileStorage::new(),
    };
    Ok(
        CheckpointEngine::new(storage, GzipCompressor::with_level(config.compression_level))
            .with_state_format(config.state_format())
            .with_tag_mode(config.tag_mode()),
    )
}
