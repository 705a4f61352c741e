//! Dedicated writer task for outbound frames.
//!
//! Submitters never touch the socket. They hand encoded frames to a single
//! writer task over an mpsc channel, which batches whatever is queued into
//! one vectored write and reports the outcome back to each sender.
//!
//! # Architecture
//!
//! ```text
//! Submit 1 ─┐
//! Submit 2 ─┼─► mpsc::Sender<WriterCommand> ─► Writer Task ─► Socket
//! Submit N ─┘                    ▲                  │
//!                                └── oneshot ack ◄──┘
//! ```
//!
//! Channel order is wire order: frames are written exactly in the order
//! they were accepted by [`WriterHandle::send`].

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{GearmanError, Result};

/// Default channel capacity.
pub(crate) const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// Completion of a queued write.
pub(crate) type WriteAck = oneshot::Receiver<Result<()>>;

/// An encoded frame waiting to be written.
#[derive(Debug)]
pub(crate) struct OutboundFrame {
    /// Complete wire bytes (header and arguments).
    bytes: Bytes,
    ack: Option<oneshot::Sender<Result<()>>>,
}

impl OutboundFrame {
    /// Create a frame without write acknowledgement.
    #[cfg(test)]
    fn new(bytes: Bytes) -> Self {
        Self { bytes, ack: None }
    }

    /// Create a frame and the receiver that reports its write result.
    pub(crate) fn acked(bytes: Bytes) -> (Self, WriteAck) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                bytes,
                ack: Some(tx),
            },
            rx,
        )
    }

    /// Size of this frame in bytes.
    #[inline]
    fn size(&self) -> usize {
        self.bytes.len()
    }

    fn complete(self, result: Result<()>) {
        if let Some(ack) = self.ack {
            let _ = ack.send(result);
        }
    }
}

enum WriterCommand {
    Frame(OutboundFrame),
    Shutdown,
}

/// Handle for sending frames to the writer task.
///
/// Cheaply cloneable.
#[derive(Clone)]
pub(crate) struct WriterHandle {
    tx: mpsc::Sender<WriterCommand>,
}

impl WriterHandle {
    /// Queue a frame for writing.
    ///
    /// Waits only for channel capacity, not for the write itself.
    pub(crate) async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .send(WriterCommand::Frame(frame))
            .await
            .map_err(|_| GearmanError::ConnectionClosed)
    }

    /// Queue a frame and wait until it has been written and flushed.
    #[cfg(test)]
    async fn write(&self, bytes: Bytes) -> Result<()> {
        let (frame, ack) = OutboundFrame::acked(bytes);
        self.send(frame).await?;
        wait_ack(ack).await
    }

    /// Ask the writer task to flush, shut down the stream, and exit.
    ///
    /// Frames queued before this call are still written.
    pub(crate) async fn shutdown(&self) {
        let _ = self.tx.send(WriterCommand::Shutdown).await;
    }

    /// Whether the writer task has exited.
    #[cfg(test)]
    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Wait for a write acknowledgement.
///
/// A dropped ack means the writer task went away before writing the frame.
pub(crate) async fn wait_ack(ack: WriteAck) -> Result<()> {
    ack.await.unwrap_or(Err(GearmanError::ConnectionClosed))
}

/// Spawn the writer task and return a handle for sending frames.
///
/// # Returns
///
/// A tuple of `(WriterHandle, JoinHandle)` where the JoinHandle can be used
/// to wait for the writer task to complete.
pub(crate) fn spawn_writer_task<W>(writer: W, channel_capacity: usize) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(channel_capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Main writer loop - receives frames and writes them in batches.
///
/// Exits on `Shutdown`, when every handle is dropped, or on the first
/// write error. In every case the stream is shut down.
async fn writer_loop<W>(mut rx: mpsc::Receiver<WriterCommand>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let result = loop {
        let first = match rx.recv().await {
            Some(WriterCommand::Frame(frame)) => frame,
            Some(WriterCommand::Shutdown) | None => break Ok(()),
        };

        // Collect additional ready frames (non-blocking)
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        let mut shutdown = false;

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(WriterCommand::Frame(frame)) => batch.push(frame),
                Ok(WriterCommand::Shutdown) => {
                    shutdown = true;
                    break;
                }
                Err(_) => break,
            }
        }

        match write_batch(&mut writer, &batch).await {
            Ok(()) => {
                for frame in batch {
                    frame.complete(Ok(()));
                }
            }
            Err(e) => {
                tracing::error!("Write to server failed: {}", e);
                for frame in batch {
                    frame.complete(Err(copy_error(&e)));
                }
                break Err(e);
            }
        }

        if shutdown {
            break Ok(());
        }
    };

    // Frames still queued will never be written.
    rx.close();
    while let Ok(command) = rx.try_recv() {
        if let WriterCommand::Frame(frame) = command {
            frame.complete(Err(GearmanError::ConnectionClosed));
        }
    }

    if let Err(e) = writer.shutdown().await {
        tracing::debug!("Stream shutdown failed: {}", e);
    }

    result
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(OutboundFrame::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(GearmanError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for remaining data after a partial write.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for frame in batch {
        let end = offset + frame.size();
        if skip_bytes < end && !frame.bytes.is_empty() {
            let start_in_frame = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&frame.bytes[start_in_frame..]));
        }
        offset = end;
    }

    slices
}

/// `std::io::Error` is not `Clone`; rebuild one per waiting sender.
fn copy_error(e: &GearmanError) -> GearmanError {
    match e {
        GearmanError::Io(io) => GearmanError::Io(std::io::Error::new(io.kind(), io.to_string())),
        _ => GearmanError::ConnectionClosed,
    }
}
