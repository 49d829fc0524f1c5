/*!
Compressed, chunked export of trained model definitions.

A definition is streamed as JSON through gzip and base64 straight into a
chunk sink that cuts the encoded text into documents of at most
`max_document_size` bytes:

```text
{"compressed_definition":{"doc_num":0,"definition":"H4sI..."}}
{"compressed_definition":{"doc_num":1,"definition":"...","eos":true}}
```

Consumers concatenate `definition` in `doc_num` order until the document
carrying `eos`, then base64-decode and gunzip. Neither the uncompressed JSON
nor the full encoded text is ever held in memory.
*/

use std::io::{self, BufRead, Write};

use base64::engine::general_purpose::STANDARD;
use base64::write::EncoderWriter;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::compression::{CompressionAdapter, GzipCompressor};
use crate::config::ExportConfig;
use crate::model::{JsonStreamWriter, ModelDefinition};
use crate::{PersistError, Result};

/// Default upper bound on the encoded text carried by one document.
pub const MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024;

/// One numbered piece of an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedDocument {
    pub doc_num: usize,
    pub definition: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub eos: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    compressed_definition: T,
}

impl CompressedDocument {
    /// `{"compressed_definition": {...}}`
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&Envelope {
            compressed_definition: self,
        })?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let envelope: Envelope<CompressedDocument> = serde_json::from_str(json)?;
        Ok(envelope.compressed_definition)
    }
}

/// Totals of a finished export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportSummary {
    pub documents: usize,
    pub encoded_bytes: u64,
}

/// Cuts the encoded stream into documents.
///
/// A full buffer is only emitted once more bytes arrive, so the final
/// document can always carry `eos`.
struct ChunkSink<F> {
    max_document_size: usize,
    buffer: Vec<u8>,
    doc_num: usize,
    encoded_bytes: u64,
    emit: F,
}

impl<F> ChunkSink<F>
where
    F: FnMut(CompressedDocument) -> Result<()>,
{
    fn new(max_document_size: usize, emit: F) -> Self {
        Self {
            max_document_size,
            buffer: Vec::new(),
            doc_num: 0,
            encoded_bytes: 0,
            emit,
        }
    }

    fn emit_buffer(&mut self, eos: bool) -> Result<()> {
        let bytes = std::mem::take(&mut self.buffer);
        // base64 output is ASCII
        let definition = String::from_utf8(bytes)
            .map_err(|e| PersistError::format(format!("Encoded export is not text: {e}")))?;
        let document = CompressedDocument {
            doc_num: self.doc_num,
            definition,
            eos,
        };
        self.doc_num += 1;
        (self.emit)(document)
    }

    fn finish(mut self) -> Result<ExportSummary> {
        self.emit_buffer(true)?;
        Ok(ExportSummary {
            documents: self.doc_num,
            encoded_bytes: self.encoded_bytes,
        })
    }
}

impl<F> Write for ChunkSink<F>
where
    F: FnMut(CompressedDocument) -> Result<()>,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut remaining = buf;
        while !remaining.is_empty() {
            if self.buffer.len() == self.max_document_size {
                self.emit_buffer(false).map_err(io::Error::other)?;
            }
            let take = remaining
                .len()
                .min(self.max_document_size - self.buffer.len());
            self.buffer.extend_from_slice(&remaining[..take]);
            remaining = &remaining[take..];
        }
        self.encoded_bytes += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Recover an error raised by a document sink from the `io::Error` it was
/// tunnelled through.
fn sink_error(error: PersistError) -> PersistError {
    let io_error = match error {
        PersistError::Io(io_error) => io_error,
        PersistError::Json(json_error) if json_error.is_io() => io::Error::from(json_error),
        other => return other,
    };
    if !io_error
        .get_ref()
        .is_some_and(|inner| inner.is::<PersistError>())
    {
        return PersistError::Io(io_error);
    }
    match io_error.into_inner().map(|inner| inner.downcast::<PersistError>()) {
        Some(Ok(inner)) => *inner,
        Some(Err(other)) => PersistError::Io(io::Error::other(other)),
        None => PersistError::storage("Export sink failed"),
    }
}

/// Streams model definitions into bounded, numbered documents.
///
/// # Example
/// ```rust
/// use modelstate_core::export::ChunkedExporter;
/// use modelstate_core::model::{ModelDefinition, TargetType, Tree, TreeNode};
///
/// let tree = Tree::new(vec![], TargetType::Regression, vec![TreeNode::leaf(0, 1, vec![2.0])])?;
/// let definition = ModelDefinition::new(tree.into());
///
/// let exporter = ChunkedExporter::new().with_max_document_size(16)?;
/// let documents = exporter.export_documents(&definition)?;
/// assert!(documents.len() > 1);
/// assert!(documents.last().map_or(false, |document| document.eos));
/// assert_eq!(exporter.reassemble_definition(documents)?, definition);
/// # Ok::<(), modelstate_core::PersistError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ChunkedExporter<C: CompressionAdapter = GzipCompressor> {
    compressor: C,
    max_document_size: usize,
}

impl ChunkedExporter<GzipCompressor> {
    pub fn new() -> Self {
        Self::with_compressor(GzipCompressor::new())
    }

    /// Exporter using the configured gzip level and document size.
    pub fn from_config(config: &ExportConfig) -> Result<Self> {
        config.validate()?;
        Self::with_compressor(GzipCompressor::with_level(config.compression_level))
            .with_max_document_size(config.max_document_size)
    }
}

impl Default for ChunkedExporter<GzipCompressor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: CompressionAdapter> ChunkedExporter<C> {
    pub fn with_compressor(compressor: C) -> Self {
        Self {
            compressor,
            max_document_size: MAX_DOCUMENT_SIZE,
        }
    }

    /// Set the document size bound. Zero cannot hold any text and is
    /// rejected.
    pub fn with_max_document_size(mut self, max_document_size: usize) -> Result<Self> {
        if max_document_size == 0 {
            return Err(PersistError::SizeBoundViolation {
                size: 1,
                max: max_document_size,
            });
        }
        self.max_document_size = max_document_size;
        Ok(self)
    }

    pub fn max_document_size(&self) -> usize {
        self.max_document_size
    }

    /// Stream `definition` and hand each document to `emit` as soon as it
    /// is complete.
    pub fn export<F>(&self, definition: &ModelDefinition, emit: F) -> Result<ExportSummary>
    where
        F: FnMut(CompressedDocument) -> Result<()>,
    {
        let chunks = ChunkSink::new(self.max_document_size, emit);
        let encoder = EncoderWriter::new(chunks, &STANDARD);
        let compressor = self.compressor.compress_to(encoder);
        let mut writer = JsonStreamWriter::new(compressor);

        let summary = (|| {
            definition.write_to(&mut writer)?;
            let mut encoder = writer.finish()?.finish()?;
            let chunks = encoder.finish()?;
            chunks.finish()
        })()
        .map_err(sink_error)?;

        tracing::debug!(
            "Exported model definition as {} document(s), {} encoded bytes",
            summary.documents,
            summary.encoded_bytes
        );
        #[cfg(feature = "metrics")]
        if let Some(metrics) = crate::observability::ModelStateMetrics::global() {
            metrics.record_export(&summary);
        }
        Ok(summary)
    }

    pub fn export_documents(&self, definition: &ModelDefinition) -> Result<Vec<CompressedDocument>> {
        let mut documents = Vec::new();
        self.export(definition, |document| {
            documents.push(document);
            Ok(())
        })?;
        Ok(documents)
    }

    /// Write one document per line to `out`.
    pub fn export_json_lines<W: Write>(&self, definition: &ModelDefinition, mut out: W) -> Result<W> {
        self.export(definition, |document| {
            out.write_all(document.to_json_string()?.as_bytes())?;
            out.write_all(b"\n")?;
            Ok(())
        })?;
        out.flush()?;
        Ok(out)
    }

    /// Join, decode and decompress a complete document sequence, returning
    /// the model definition JSON.
    ///
    /// `doc_num` must run from 0 without gaps and exactly the last document
    /// must carry `eos`.
    pub fn reassemble<I>(&self, documents: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = CompressedDocument>,
    {
        let mut encoded = String::new();
        let mut expected = 0;
        let mut finished = false;
        for document in documents {
            if finished {
                return Err(PersistError::format(format!(
                    "Document {} follows the end of stream",
                    document.doc_num
                )));
            }
            if document.doc_num != expected {
                return Err(PersistError::format(format!(
                    "Expected document {expected}, found {}",
                    document.doc_num
                )));
            }
            encoded.push_str(&document.definition);
            finished = document.eos;
            expected += 1;
        }
        if !finished {
            return Err(PersistError::format(format!(
                "Export ended after {expected} document(s) without an end of stream marker"
            )));
        }
        let compressed = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| PersistError::format(format!("Invalid base64 in export: {e}")))?;
        self.compressor.decompress(&compressed)
    }

    /// [`reassemble`](Self::reassemble) and parse the result.
    pub fn reassemble_definition<I>(&self, documents: I) -> Result<ModelDefinition>
    where
        I: IntoIterator<Item = CompressedDocument>,
    {
        ModelDefinition::from_json_slice(&self.reassemble(documents)?)
    }

    /// Reassemble from JSON lines as written by
    /// [`export_json_lines`](Self::export_json_lines). Blank lines are
    /// skipped.
    pub fn reassemble_json_lines<R: BufRead>(&self, reader: R) -> Result<Vec<u8>> {
        let mut documents = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            documents.push(CompressedDocument::from_json_str(&line)?);
        }
        self.reassemble(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::NoCompression;
    use crate::model::{TargetType, Tree, TreeNode};

    fn collect(max: usize, bytes: &[u8]) -> Vec<CompressedDocument> {
        let mut documents = Vec::new();
        let mut sink = ChunkSink::new(max, |document| {
            documents.push(document);
            Ok(())
        });
        for piece in bytes.chunks(3) {
            sink.write_all(piece).unwrap();
        }
        sink.finish().unwrap();
        documents
    }

    fn definition() -> ModelDefinition {
        let tree = Tree::new(
            vec!["f".to_string()],
            TargetType::Regression,
            vec![TreeNode::leaf(0, 3, vec![0.25])],
        )
        .unwrap();
        ModelDefinition::new(tree.into())
    }

    #[test]
    fn test_chunk_counts() {
        const MAX: usize = 10;
        for (length, expected) in [(25, 3), (30, 3), (10, 1), (1, 1), (0, 1)] {
            let bytes = vec![b'x'; length];
            let documents = collect(MAX, &bytes);
            assert_eq!(documents.len(), expected, "{length} bytes");
            for (index, document) in documents.iter().enumerate() {
                assert_eq!(document.doc_num, index);
                assert_eq!(document.eos, index + 1 == documents.len());
                assert!(document.definition.len() <= MAX);
            }
            let joined: String = documents.iter().map(|d| d.definition.as_str()).collect();
            assert_eq!(joined.len(), length);
        }
    }

    #[test]
    fn test_document_json_shape() {
        let last = CompressedDocument {
            doc_num: 2,
            definition: "abc".to_string(),
            eos: true,
        };
        assert_eq!(
            last.to_json_string().unwrap(),
            r#"{"compressed_definition":{"doc_num":2,"definition":"abc","eos":true}}"#
        );
        let middle = CompressedDocument {
            eos: false,
            ..last.clone()
        };
        assert_eq!(
            middle.to_json_string().unwrap(),
            r#"{"compressed_definition":{"doc_num":2,"definition":"abc"}}"#
        );
        assert_eq!(
            CompressedDocument::from_json_str(&last.to_json_string().unwrap()).unwrap(),
            last
        );
    }

    #[test]
    fn test_zero_document_size_is_rejected() {
        let error = ChunkedExporter::new().with_max_document_size(0).unwrap_err();
        assert!(matches!(error, PersistError::SizeBoundViolation { max: 0, .. }));
    }

    #[test]
    fn test_export_roundtrip_through_json_lines() {
        let exporter = ChunkedExporter::new().with_max_document_size(8).unwrap();
        let lines = exporter.export_json_lines(&definition(), Vec::new()).unwrap();
        let json = exporter.reassemble_json_lines(&lines[..]).unwrap();
        assert_eq!(json, definition().json_string().unwrap().into_bytes());
    }

    #[test]
    fn test_plain_encoding_is_base64_of_the_json() {
        let exporter = ChunkedExporter::with_compressor(NoCompression::new());
        let documents = exporter.export_documents(&definition()).unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(
            documents[0].definition,
            STANDARD.encode(definition().json_string().unwrap())
        );
    }

    #[test]
    fn test_reassemble_rejects_bad_sequences() {
        let exporter = ChunkedExporter::new().with_max_document_size(8).unwrap();
        let documents = exporter.export_documents(&definition()).unwrap();
        assert!(documents.len() > 2);

        let mut gap = documents.clone();
        gap.remove(1);
        assert!(exporter.reassemble(gap).is_err());

        let mut truncated = documents.clone();
        truncated.pop();
        assert!(exporter.reassemble(truncated).is_err());

        let mut trailing = documents.clone();
        trailing.push(CompressedDocument {
            doc_num: documents.len(),
            definition: String::new(),
            eos: false,
        });
        assert!(exporter.reassemble(trailing).is_err());

        assert!(exporter.reassemble(documents).is_ok());
    }

    #[test]
    fn test_sink_errors_surface_unchanged() {
        let exporter = ChunkedExporter::new().with_max_document_size(4).unwrap();
        let error = exporter
            .export(&definition(), |_| Err(PersistError::storage("disk full")))
            .unwrap_err();
        assert!(matches!(error, PersistError::Storage(message) if message == "disk full"));
    }
}
