//! Framed primitive reads and writes over binlog byte streams.
//!
//! The codec moves fixed-width big-endian integers and raw byte runs; it never interprets
//! record magics or payload layout. Interpretation belongs to the replay handler.

use std::io::{BufRead, Write};

use thiserror::Error;

/// Read-side failure classification for framed binlog streams.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The stream ended before the requested bytes were available.
    #[error("unexpected end of stream")]
    Eof,
    /// The underlying reader failed for a reason other than end of stream.
    #[error("io error: {0}")]
    Io(std::io::Error),
}

/// Buffered reader with exact-read primitives and a consumed-byte counter.
///
/// The counter only advances on fully satisfied reads, so after a failed read it still points
/// at the last whole-item boundary. The replay scan uses this to find the last complete record.
#[derive(Debug)]
pub struct BinlogReader<R> {
    inner: R,
    consumed: u64,
}

impl<R: BufRead> BinlogReader<R> {
    /// Wraps a buffered byte source positioned at the start of the log.
    #[must_use]
    pub fn new(inner: R) -> Self {
        Self { inner, consumed: 0 }
    }

    /// Byte offset of the end of the last fully satisfied read.
    #[must_use]
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Reads exactly 4 bytes as a big-endian `u32`.
    ///
    /// # Errors
    ///
    /// `CodecError::Eof` when fewer than 4 bytes remain, `CodecError::Io` otherwise.
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let mut bytes = [0_u8; 4];
        self.fill(&mut bytes)?;
        Ok(u32::from_be_bytes(bytes))
    }

    /// Reads exactly 8 bytes as a big-endian `u64`.
    ///
    /// # Errors
    ///
    /// `CodecError::Eof` when fewer than 8 bytes remain, `CodecError::Io` otherwise.
    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        let mut bytes = [0_u8; 8];
        self.fill(&mut bytes)?;
        Ok(u64::from_be_bytes(bytes))
    }

    /// Reads exactly `len` bytes into a fresh buffer.
    ///
    /// # Errors
    ///
    /// `CodecError::Eof` when fewer than `len` bytes remain, `CodecError::Io` otherwise
    /// (including lengths that do not fit the platform's address space).
    pub fn read_exact(&mut self, len: u64) -> Result<Vec<u8>, CodecError> {
        let len = usize::try_from(len).map_err(|_| {
            CodecError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "record length exceeds platform limits",
            ))
        })?;
        let mut bytes = vec![0_u8; len];
        self.fill(&mut bytes)?;
        Ok(bytes)
    }

    fn fill(&mut self, bytes: &mut [u8]) -> Result<(), CodecError> {
        match self.inner.read_exact(bytes) {
            Ok(()) => {
                self.consumed = self.consumed.saturating_add(bytes.len() as u64);
                Ok(())
            }
            Err(error) if error.kind() == std::io::ErrorKind::UnexpectedEof => Err(CodecError::Eof),
            Err(error) => Err(CodecError::Io(error)),
        }
    }
}

/// Buffered writer with the matching append primitives.
#[derive(Debug)]
pub struct BinlogWriter<W> {
    inner: W,
}

impl<W: Write> BinlogWriter<W> {
    /// Wraps a buffered byte sink.
    #[must_use]
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Appends a big-endian `u32` to the buffer.
    ///
    /// # Errors
    ///
    /// Propagates the underlying write failure.
    pub fn write_u32(&mut self, value: u32) -> std::io::Result<()> {
        self.inner.write_all(&value.to_be_bytes())
    }

    /// Appends raw bytes to the buffer.
    ///
    /// # Errors
    ///
    /// Propagates the underlying write failure.
    pub fn write_bytes(&mut self, payload: &[u8]) -> std::io::Result<()> {
        self.inner.write_all(payload)
    }

    /// Pushes buffered bytes to the underlying sink.
    ///
    /// # Errors
    ///
    /// Propagates the underlying flush failure.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
