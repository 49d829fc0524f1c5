/*!
Compression adapters for checkpoints and model exports.

Checkpoint containers are compressed in one piece; model exports compress a
stream through [`CompressionAdapter::compress_to`] so the uncompressed model
definition never has to be held in memory. Gzip is the default algorithm.
*/

use std::io::{self, Read, Write};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};

use crate::{PersistError, Result};

/// Compression abstraction used by the checkpoint engine and the exporter.
pub trait CompressionAdapter {
    /// Compress the input data in one piece
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress the input data in one piece
    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>>;

    /// Wrap `sink` so that everything written is compressed into it
    ///
    /// Call [`CompressingWriter::finish`] to write trailing bytes and get the
    /// sink back.
    fn compress_to<W: Write>(&self, sink: W) -> CompressingWriter<W>
    where
        Self: Sized;

    /// Get the name of the compression algorithm
    fn algorithm_name(&self) -> &str;
}

/// Streaming writer returned by [`CompressionAdapter::compress_to`].
#[derive(Debug)]
pub enum CompressingWriter<W: Write> {
    Gzip(GzEncoder<W>),
    Plain(W),
}

impl<W: Write> CompressingWriter<W> {
    /// Flush the compressor's trailer and return the sink.
    pub fn finish(self) -> Result<W> {
        match self {
            CompressingWriter::Gzip(encoder) => encoder
                .finish()
                .map_err(|e| PersistError::compression(format!("Failed to finish compression: {e}"))),
            CompressingWriter::Plain(mut sink) => {
                sink.flush()?;
                Ok(sink)
            }
        }
    }
}

impl<W: Write> Write for CompressingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            CompressingWriter::Gzip(encoder) => encoder.write(buf),
            CompressingWriter::Plain(sink) => sink.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            CompressingWriter::Gzip(encoder) => encoder.flush(),
            CompressingWriter::Plain(sink) => sink.flush(),
        }
    }
}

/// Gzip compression adapter
///
/// # Example
/// ```rust
/// use modelstate_core::{CompressionAdapter, GzipCompressor};
///
/// let compressor = GzipCompressor::new();
/// let data = b"<model_state><a>1</a></model_state>";
/// let compressed = compressor.compress(data)?;
/// let decompressed = compressor.decompress(&compressed)?;
/// assert_eq!(data, &decompressed[..]);
/// # Ok::<(), modelstate_core::PersistError>(())
/// ```
#[derive(Debug, Clone)]
pub struct GzipCompressor {
    compression_level: Compression,
}

impl GzipCompressor {
    /// Create a new gzip compressor with default compression level (6)
    pub fn new() -> Self {
        Self {
            compression_level: Compression::default(),
        }
    }

    /// Create a new gzip compressor with the specified compression level
    ///
    /// # Arguments
    /// * `level` - Compression level (0-9, where 0 is no compression and 9 is maximum)
    pub fn with_level(level: u32) -> Self {
        Self {
            compression_level: Compression::new(level),
        }
    }

    /// Create a compressor for fast compression (level 1)
    pub fn fast() -> Self {
        Self::with_level(1)
    }

    /// Create a compressor for maximum compression (level 9)
    pub fn max() -> Self {
        Self::with_level(9)
    }

    pub fn level(&self) -> u32 {
        self.compression_level.level()
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionAdapter for GzipCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = self.compress_to(Vec::new());
        encoder.write_all(data).map_err(|e| {
            PersistError::compression(format!("Failed to write data for compression: {e}"))
        })?;
        encoder.finish()
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(compressed_data);
        let mut decompressed = Vec::new();

        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| PersistError::compression(format!("Failed to decompress data: {e}")))?;

        Ok(decompressed)
    }

    fn compress_to<W: Write>(&self, sink: W) -> CompressingWriter<W> {
        CompressingWriter::Gzip(GzEncoder::new(sink, self.compression_level))
    }

    fn algorithm_name(&self) -> &str {
        "gzip"
    }
}

/// Pass-through adapter, useful in tests and for already-compressed payloads
#[derive(Debug, Clone, Default)]
pub struct NoCompression;

impl NoCompression {
    pub fn new() -> Self {
        Self
    }
}

impl CompressionAdapter for NoCompression {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        Ok(compressed_data.to_vec())
    }

    fn compress_to<W: Write>(&self, sink: W) -> CompressingWriter<W> {
        CompressingWriter::Plain(sink)
    }

    fn algorithm_name(&self) -> &str {
        "none"
    }
}
