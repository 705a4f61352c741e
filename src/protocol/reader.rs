//! Async frame reader over a byte stream.
//!
//! Wraps any `AsyncRead` and yields one complete frame buffer per call,
//! regardless of how the source chunks its reads.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::wire_format::DEFAULT_MAX_PAYLOAD_SIZE;
use super::FrameBuffer;
use crate::error::{GearmanError, Result};

/// Default size of a single read from the source.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Reads whole frames from an `AsyncRead`.
///
/// The sequence is not restartable: once `next_frame` returns `Ok(None)`
/// or an error, the reader is finished.
pub struct FrameReader<R> {
    reader: R,
    buffer: FrameBuffer,
    read_buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a reader with default buffer and payload limits.
    pub fn new(reader: R) -> Self {
        Self::with_limits(reader, DEFAULT_READ_BUFFER_SIZE, DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a reader with a custom read size and max payload size.
    pub fn with_limits(reader: R, read_buffer_size: usize, max_payload_size: u32) -> Self {
        Self {
            reader,
            buffer: FrameBuffer::with_max_payload(max_payload_size),
            read_buf: vec![0u8; read_buffer_size.max(1)],
        }
    }

    /// Read the next complete frame.
    ///
    /// Returns `Ok(None)` when the source ends on a frame boundary.
    ///
    /// # Errors
    ///
    /// - `Framing` if the source ends with a partial frame buffered
    /// - `Decoding` if a header declares an impossible size
    /// - `Io` if the read fails
    ///
    /// Cancel safe: a partially received frame stays buffered.
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.buffer.next_frame()? {
                return Ok(Some(frame));
            }

            let n = self.reader.read(&mut self.read_buf).await?;
            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(GearmanError::Framing(format!(
                    "Stream ended with {} bytes of an incomplete frame",
                    self.buffer.len()
                )));
            }

            self.buffer.extend(&self.read_buf[..n]);
        }
    }

    /// Number of bytes buffered but not yet emitted.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
