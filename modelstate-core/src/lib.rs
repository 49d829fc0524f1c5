/*!
# modelstate core

State persistence for long-running analytics jobs and compressed export of
trained models.

- A persist/restore facade ([`StateInserter`], [`StateTraverser`]) that turns
  stateful objects into a backend-agnostic [`StateDocument`]
- JSON and XML [`formats`] for those documents, with compact or readable tags
- Tag-based [`dispatch`] for restoring polymorphic members
- A [`CheckpointEngine`] adding metadata, integrity hashing, compression and
  pluggable storage
- A trained [`model`] object model (trees, ensembles, encoders, aggregators)
  that streams itself as JSON and reports its structural size
- A [`ChunkedExporter`] that gzips, base64-encodes and splits a model
  definition into bounded, numbered documents

## Usage

```rust
use modelstate_core::{
    CheckpointEngine, CheckpointMetadata, GzipCompressor, MemoryStorage, StateTraverser, Tag,
};

const COUNT_TAG: Tag = Tag::new("a", "count");
const WINDOW_TAG: Tag = Tag::new("b", "window");

let engine = CheckpointEngine::new(MemoryStorage::new(), GzipCompressor::new());

let mut inserter = engine.inserter("job_state");
inserter.insert_value(COUNT_TAG, 25);
inserter.insert_level(WINDOW_TAG, |inserter| inserter.insert_value(COUNT_TAG, 3));
engine.save_document(
    &inserter.into_document(),
    &CheckpointMetadata::new("job_1", 0),
    "job_1/0.json.gz",
)?;

let (_, document) = engine.load("job_1/0.json.gz")?;
let mut traverser = StateTraverser::new(&document);
assert_eq!(traverser.value_as::<u32>()?, 25);
assert!(traverser.next());
let inner: u32 = traverser.traverse_sub_level(|traverser| traverser.value_as())?;
assert_eq!(inner, 3);
# Ok::<(), modelstate_core::PersistError>(())
```
*/

pub mod checkpoint;
pub mod codec;
pub mod compression;
pub mod config;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod export;
pub mod formats;
pub mod inserter;
pub mod metadata;
pub mod model;
pub mod observability;
pub mod state;
pub mod storage;
pub mod tag;
pub mod traverser;

#[cfg(test)]
mod error_tests;
#[cfg(test)]
mod metadata_tests;

pub use checkpoint::{create_default_engine, create_engine_from_config, CheckpointEngine};
pub use codec::{Precision, StateValue};
pub use compression::{CompressionAdapter, GzipCompressor, NoCompression};
pub use config::{CheckpointConfig, ExportConfig};
pub use dispatch::{persist_tagged, restore_tagged, TagDispatch};
pub use document::{StateDocument, StateNode};
pub use error::{PersistError, Result};
pub use export::{ChunkedExporter, CompressedDocument, ExportSummary, MAX_DOCUMENT_SIZE};
pub use formats::{AnyStateFormat, JsonStateFormat, StateFormat, StateFormatKind, XmlStateFormat};
pub use inserter::{PersistState, StateInserter};
pub use metadata::CheckpointMetadata;
pub use model::{ModelDefinition, ModelSizeInfo};
pub use storage::{LocalFileStorage, MemoryStorage, StorageAdapter};
pub use tag::{validate_registry, Tag, TagMode};
pub use traverser::{RestoreState, StateTraverser};
