//! Frame dispatch - applies one decoded server frame to the job it addresses.
//!
//! | Frame            | Effect                                             |
//! |------------------|----------------------------------------------------|
//! | `JOB_CREATED`    | new job, registered, handed to a pending submitter |
//! | `WORK_STATUS`    | progress update                                    |
//! | `WORK_DATA`      | chunk pushed to the data stream                    |
//! | `WORK_WARNING`   | chunk pushed to the warnings stream                |
//! | `WORK_COMPLETE`  | Completed, streams closed, deregistered            |
//! | `WORK_FAIL`      | Failed, streams closed, deregistered               |
//! | `WORK_EXCEPTION` | warning chunk, then as `WORK_FAIL`                 |
//! | `ERROR`          | logged                                             |
//!
//! Anything else, and any frame naming an unknown handle, is logged and
//! skipped. Nothing here can fail the read loop.

use std::sync::Arc;

use bytes::Bytes;

use crate::job::{new_job, JobRegistry, JobState, PendingSubmits, Progress};
use crate::protocol::{packet_type, Frame, Magic};

/// Applies frames to the shared job state.
///
/// Owned by the read loop; frames are applied one at a time in arrival order.
pub(crate) struct Dispatcher {
    registry: Arc<JobRegistry>,
    pending: Arc<PendingSubmits>,
}

impl Dispatcher {
    pub(crate) fn new(registry: Arc<JobRegistry>, pending: Arc<PendingSubmits>) -> Self {
        Self { registry, pending }
    }

    /// Dispatch a single decoded frame.
    pub(crate) fn dispatch(&self, frame: Frame) {
        if frame.magic != Magic::Response {
            tracing::warn!(
                "Ignoring request frame of type {} sent by server",
                frame.packet_type
            );
            return;
        }

        match frame.packet_type {
            packet_type::JOB_CREATED => self.job_created(&frame),
            packet_type::WORK_STATUS => self.work_status(&frame),
            packet_type::WORK_DATA => self.work_chunk(&frame, ChunkKind::Data),
            packet_type::WORK_WARNING => self.work_chunk(&frame, ChunkKind::Warning),
            packet_type::WORK_COMPLETE => self.work_finished(&frame, JobState::Completed),
            packet_type::WORK_FAIL => self.work_finished(&frame, JobState::Failed),
            packet_type::WORK_EXCEPTION => self.work_exception(&frame),
            packet_type::ERROR => self.server_error(&frame),
            other => match packet_type::name(other) {
                Some(name) => tracing::debug!("Ignoring unhandled {} frame", name),
                None => tracing::warn!("Ignoring frame with unknown packet type {}", other),
            },
        }
    }

    /// Fail every registered job and release every pending submitter.
    ///
    /// Called once the connection can no longer deliver frames.
    pub(crate) fn shutdown(&self) {
        self.pending.close();

        let orphaned = self.registry.drain();
        if !orphaned.is_empty() {
            tracing::warn!(
                "Connection lost with {} jobs in flight; marking them failed",
                orphaned.len()
            );
        }
        for sink in orphaned {
            sink.finish(JobState::Failed);
        }
    }

    fn job_created(&self, frame: &Frame) {
        let Some(handle) = handle_of(frame) else {
            return;
        };

        let (job, sink) = new_job(&handle);
        if let Some(previous) = self.registry.insert(sink) {
            tracing::warn!("Server reused live handle {}; failing the old job", handle);
            previous.finish(JobState::Failed);
        }
        tracing::debug!("Job {} created", handle);

        let unique = frame.argument(1).map(|u| &u[..]);
        if self.pending.resolve(unique, job).is_err() {
            tracing::warn!("Job {} created with no submitter waiting", handle);
        }
    }

    fn work_status(&self, frame: &Frame) {
        let Some(handle) = handle_of(frame) else {
            return;
        };

        let fields = (
            frame.argument(1).and_then(parse_progress_field),
            frame.argument(2).and_then(parse_progress_field),
        );
        let (Some(numerator), Some(denominator)) = fields else {
            tracing::warn!("Malformed WORK_STATUS for job {}", handle);
            return;
        };

        let progress = Progress {
            numerator,
            denominator,
        };
        if self
            .registry
            .with_job(&handle, |job| job.set_progress(progress))
            .is_none()
        {
            unknown_handle(&handle, frame.packet_type);
        }
    }

    fn work_chunk(&self, frame: &Frame, kind: ChunkKind) {
        let Some(handle) = handle_of(frame) else {
            return;
        };
        let Some(chunk) = frame.argument(1).cloned() else {
            tracing::warn!("{:?} frame for job {} carries no payload", kind, handle);
            return;
        };

        let delivered = self.registry.with_job(&handle, |job| match kind {
            ChunkKind::Data => job.push_data(chunk),
            ChunkKind::Warning => job.push_warning(chunk),
        });
        if delivered.is_none() {
            unknown_handle(&handle, frame.packet_type);
        }
    }

    fn work_finished(&self, frame: &Frame, state: JobState) {
        let Some(handle) = handle_of(frame) else {
            return;
        };

        match self.registry.remove(&handle) {
            Some(sink) => {
                tracing::debug!("Job {} finished: {:?}", handle, state);
                sink.finish(state);
            }
            None => unknown_handle(&handle, frame.packet_type),
        }
    }

    fn work_exception(&self, frame: &Frame) {
        let Some(handle) = handle_of(frame) else {
            return;
        };

        match self.registry.remove(&handle) {
            Some(sink) => {
                if let Some(exception) = frame.argument(1) {
                    sink.push_warning(exception.clone());
                }
                tracing::debug!("Job {} raised an exception", handle);
                sink.finish(JobState::Failed);
            }
            None => unknown_handle(&handle, frame.packet_type),
        }
    }

    fn server_error(&self, frame: &Frame) {
        let text = |i: usize| {
            frame
                .argument(i)
                .map(|a| String::from_utf8_lossy(a).into_owned())
                .unwrap_or_default()
        };
        tracing::error!("Server error {}: {}", text(0), text(1));
    }
}

#[derive(Debug, Clone, Copy)]
enum ChunkKind {
    Data,
    Warning,
}

fn handle_of(frame: &Frame) -> Option<String> {
    let handle = frame.handle();
    if handle.is_none() {
        tracing::warn!(
            "Frame of type {} is missing its job handle",
            frame.packet_type
        );
    }
    handle
}

fn unknown_handle(handle: &str, packet_type: i32) {
    tracing::warn!(
        "Frame of type {} for unknown job {}; skipping",
        packet_type,
        handle
    );
}

/// Parse a WORK_STATUS numerator or denominator.
///
/// Servers send ASCII decimal. A 4-byte field that is not decimal text is
/// read as a big-endian integer.
pub(crate) fn parse_progress_field(field: &Bytes) -> Option<u32> {
    if !field.is_empty() && field.iter().all(u8::is_ascii_digit) {
        return std::str::from_utf8(field).ok()?.parse().ok();
    }
    let bytes: [u8; 4] = field[..].try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}
