/*!
Streaming structured writer used by the trained model object model.

Objects and arrays are opened and closed explicitly and every scalar is
written straight to the underlying sink, so a model definition never has to
exist as one in-memory document.
*/

use std::io::Write;

use crate::codec::{encode_f64, Precision};
use crate::{PersistError, Result};

/// Event-style sink for a JSON-shaped document.
pub trait StructuredWriter {
    fn start_object(&mut self) -> Result<()>;
    fn end_object(&mut self) -> Result<()>;
    fn start_array(&mut self) -> Result<()>;
    fn end_array(&mut self) -> Result<()>;
    /// Member name inside an object; the next call writes its value.
    fn key(&mut self, key: &str) -> Result<()>;
    fn string(&mut self, value: &str) -> Result<()>;
    /// Non-finite values are written as the codec tokens `"nan"`, `"inf"`
    /// and `"-inf"`.
    fn number(&mut self, value: f64) -> Result<()>;
    fn unsigned(&mut self, value: u64) -> Result<()>;
    fn boolean(&mut self, value: bool) -> Result<()>;
    /// Copy an already-built value verbatim.
    fn raw_value(&mut self, value: &serde_json::Value) -> Result<()>;

    /// `"key": [numbers...]`
    fn number_array(&mut self, key: &str, values: &[f64]) -> Result<()> {
        self.key(key)?;
        self.start_array()?;
        for value in values {
            self.number(*value)?;
        }
        self.end_array()
    }

    /// `"key": [strings...]`
    fn string_array(&mut self, key: &str, values: &[String]) -> Result<()> {
        self.key(key)?;
        self.start_array()?;
        for value in values {
            self.string(value)?;
        }
        self.end_array()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

#[derive(Debug)]
struct Frame {
    container: Container,
    members: usize,
}

/// [`StructuredWriter`] producing compact JSON on any `io::Write`.
///
/// # Example
/// ```rust
/// use modelstate_core::model::{JsonStreamWriter, StructuredWriter};
///
/// let mut writer = JsonStreamWriter::new(Vec::new());
/// writer.start_object()?;
/// writer.key("weights")?;
/// writer.start_array()?;
/// writer.number(0.5)?;
/// writer.end_array()?;
/// writer.end_object()?;
/// assert_eq!(writer.finish()?, br#"{"weights":[0.5]}"#);
/// # Ok::<(), modelstate_core::PersistError>(())
/// ```
#[derive(Debug)]
pub struct JsonStreamWriter<W: Write> {
    out: W,
    stack: Vec<Frame>,
    pending_key: bool,
    roots: usize,
}

impl<W: Write> JsonStreamWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            stack: Vec::new(),
            pending_key: false,
            roots: 0,
        }
    }

    /// Check that every container was closed and hand back the sink.
    pub fn finish(mut self) -> Result<W> {
        if !self.stack.is_empty() {
            return Err(PersistError::format(format!(
                "{} JSON container(s) left open",
                self.stack.len()
            )));
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn before_value(&mut self) -> Result<()> {
        if self.pending_key {
            self.pending_key = false;
            return Ok(());
        }
        match self.stack.last_mut() {
            Some(frame) if frame.container == Container::Object => Err(PersistError::format(
                "JSON object members need a key",
            )),
            Some(frame) => {
                if frame.members > 0 {
                    self.out.write_all(b",")?;
                }
                frame.members += 1;
                Ok(())
            }
            None => {
                // Consecutive top-level values form JSON lines.
                if self.roots > 0 {
                    self.out.write_all(b"\n")?;
                }
                self.roots += 1;
                Ok(())
            }
        }
    }

    fn close(&mut self, container: Container, token: &[u8]) -> Result<()> {
        match self.stack.pop() {
            Some(frame) if frame.container == container && !self.pending_key => {
                self.out.write_all(token)?;
                Ok(())
            }
            _ => Err(PersistError::format(format!(
                "Unbalanced JSON: cannot close {container:?} here"
            ))),
        }
    }

    fn scalar<T: serde::Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.before_value()?;
        serde_json::to_writer(&mut self.out, value)?;
        Ok(())
    }
}

impl<W: Write> StructuredWriter for JsonStreamWriter<W> {
    fn start_object(&mut self) -> Result<()> {
        self.before_value()?;
        self.out.write_all(b"{")?;
        self.stack.push(Frame {
            container: Container::Object,
            members: 0,
        });
        Ok(())
    }

    fn end_object(&mut self) -> Result<()> {
        self.close(Container::Object, b"}")
    }

    fn start_array(&mut self) -> Result<()> {
        self.before_value()?;
        self.out.write_all(b"[")?;
        self.stack.push(Frame {
            container: Container::Array,
            members: 0,
        });
        Ok(())
    }

    fn end_array(&mut self) -> Result<()> {
        self.close(Container::Array, b"]")
    }

    fn key(&mut self, key: &str) -> Result<()> {
        let Some(frame) = self.stack.last_mut() else {
            return Err(PersistError::format("JSON key outside of an object"));
        };
        if frame.container != Container::Object || self.pending_key {
            return Err(PersistError::format(format!("Misplaced JSON key '{key}'")));
        }
        if frame.members > 0 {
            self.out.write_all(b",")?;
        }
        frame.members += 1;
        serde_json::to_writer(&mut self.out, key)?;
        self.out.write_all(b":")?;
        self.pending_key = true;
        Ok(())
    }

    fn string(&mut self, value: &str) -> Result<()> {
        self.scalar(value)
    }

    fn number(&mut self, value: f64) -> Result<()> {
        if value.is_finite() {
            self.scalar(&value)
        } else {
            self.scalar(encode_f64(value, Precision::Full).as_str())
        }
    }

    fn unsigned(&mut self, value: u64) -> Result<()> {
        self.scalar(&value)
    }

    fn boolean(&mut self, value: bool) -> Result<()> {
        self.scalar(&value)
    }

    fn raw_value(&mut self, value: &serde_json::Value) -> Result<()> {
        self.scalar(value)
    }
}
