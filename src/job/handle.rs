//! Job handle returned to submitters, and its dispatch-side mutator.
//!
//! A [`Job`] is read-only for the submitter: it observes the state and
//! progress, and consumes the data and warning streams. All mutation goes
//! through the crate-private [`JobSink`], which only the dispatch loop holds.
//!
//! # Example
//!
//! ```ignore
//! let mut job = client.submit("reverse", "hello").await?;
//!
//! while let Some(chunk) = job.next_data().await {
//!     println!("{:?}", chunk);
//! }
//! assert!(job.state().is_terminal());
//! ```

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{mpsc, watch};

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// The server assigned a handle; no update received yet.
    Created,
    /// At least one status, data or warning update was received.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with a failure or exception, or the connection was lost.
    Failed,
}

impl JobState {
    /// Completed or Failed.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Progress reported by the worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub numerator: u32,
    pub denominator: u32,
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub handle: String,
    pub state: JobState,
    pub progress: Progress,
}

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    state: JobState,
    progress: Progress,
}

/// A submitted unit of work.
///
/// Not `Clone`: the data and warning streams have a single consumer.
#[derive(Debug)]
pub struct Job {
    handle: Arc<str>,
    status: watch::Receiver<Snapshot>,
    data: mpsc::UnboundedReceiver<Bytes>,
    warnings: mpsc::UnboundedReceiver<Bytes>,
}

impl Job {
    /// Server-assigned handle.
    #[inline]
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Current state.
    pub fn state(&self) -> JobState {
        self.status.borrow().state
    }

    /// Latest progress report.
    pub fn progress(&self) -> Progress {
        self.status.borrow().progress
    }

    /// Handle, state and progress in one consistent read.
    pub fn status(&self) -> JobStatus {
        let snapshot = *self.status.borrow();
        JobStatus {
            handle: self.handle.to_string(),
            state: snapshot.state,
            progress: snapshot.progress,
        }
    }

    /// Next data chunk, or `None` once the job is terminal and all chunks
    /// have been consumed.
    pub async fn next_data(&mut self) -> Option<Bytes> {
        self.data.recv().await
    }

    /// Next warning chunk, or `None` once the job is terminal and all
    /// warnings have been consumed.
    pub async fn next_warning(&mut self) -> Option<Bytes> {
        self.warnings.recv().await
    }

    /// Data chunk already received, without waiting.
    pub fn try_next_data(&mut self) -> Option<Bytes> {
        self.data.try_recv().ok()
    }

    /// Warning chunk already received, without waiting.
    pub fn try_next_warning(&mut self) -> Option<Bytes> {
        self.warnings.try_recv().ok()
    }

    /// Wait until the job reaches a terminal state and return it.
    ///
    /// Chunks not yet consumed stay queued.
    pub async fn wait(&mut self) -> JobState {
        loop {
            let state = self.status.borrow_and_update().state;
            if state.is_terminal() {
                return state;
            }
            // Sink dropped without finishing: treat as lost.
            if self.status.changed().await.is_err() {
                return self.status.borrow().state;
            }
        }
    }
}

/// Dispatch-side half of a job.
///
/// Dropping the sink closes both streams.
#[derive(Debug)]
pub(crate) struct JobSink {
    handle: Arc<str>,
    status: watch::Sender<Snapshot>,
    data: mpsc::UnboundedSender<Bytes>,
    warnings: mpsc::UnboundedSender<Bytes>,
}

impl JobSink {
    pub(crate) fn handle(&self) -> &str {
        &self.handle
    }

    pub(crate) fn status(&self) -> JobStatus {
        let snapshot = *self.status.borrow();
        JobStatus {
            handle: self.handle.to_string(),
            state: snapshot.state,
            progress: snapshot.progress,
        }
    }

    pub(crate) fn set_progress(&self, progress: Progress) {
        self.status.send_modify(|s| {
            s.progress = progress;
            s.state = running(s.state);
        });
    }

    pub(crate) fn push_data(&self, chunk: Bytes) {
        self.mark_running();
        // Receiver gone means nobody is reading; the chunk is dropped.
        let _ = self.data.send(chunk);
    }

    pub(crate) fn push_warning(&self, chunk: Bytes) {
        self.mark_running();
        let _ = self.warnings.send(chunk);
    }

    /// Move to a terminal state and close both streams.
    pub(crate) fn finish(self, state: JobState) {
        debug_assert!(state.is_terminal());
        self.status.send_modify(|s| {
            if !s.state.is_terminal() {
                s.state = state;
            }
        });
    }

    fn mark_running(&self) {
        self.status.send_if_modified(|s| {
            let next = running(s.state);
            let changed = next != s.state;
            s.state = next;
            changed
        });
    }
}

fn running(state: JobState) -> JobState {
    match state {
        JobState::Created => JobState::Running,
        other => other,
    }
}

/// Create a job and its sink.
pub(crate) fn new_job(handle: &str) -> (Job, JobSink) {
    let handle: Arc<str> = Arc::from(handle);
    let (status_tx, status_rx) = watch::channel(Snapshot {
        state: JobState::Created,
        progress: Progress::default(),
    });
    let (data_tx, data_rx) = mpsc::unbounded_channel();
    let (warnings_tx, warnings_rx) = mpsc::unbounded_channel();

    let job = Job {
        handle: handle.clone(),
        status: status_rx,
        data: data_rx,
        warnings: warnings_rx,
    };
    let sink = JobSink {
        handle,
        status: status_tx,
        data: data_tx,
        warnings: warnings_tx,
    };

    (job, sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_created() {
        let (job, sink) = new_job("H:1");

        assert_eq!(job.handle(), "H:1");
        assert_eq!(sink.handle(), "H:1");
        assert_eq!(job.state(), JobState::Created);
        assert_eq!(job.progress(), Progress::default());
    }

    #[test]
    fn test_progress_moves_to_running() {
        let (job, sink) = new_job("H:1");

        sink.set_progress(Progress {
            numerator: 3,
            denominator: 10,
        });

        assert_eq!(job.state(), JobState::Running);
        assert_eq!(
            job.progress(),
            Progress {
                numerator: 3,
                denominator: 10
            }
        );
    }

    #[tokio::test]
    async fn test_data_then_complete_closes_streams() {
        let (mut job, sink) = new_job("H:1");

        sink.push_data(Bytes::from_static(b"x"));
        sink.push_warning(Bytes::from_static(b"careful"));
        assert_eq!(job.state(), JobState::Running);

        sink.finish(JobState::Completed);

        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.next_data().await, Some(Bytes::from_static(b"x")));
        assert_eq!(job.next_data().await, None);
        assert_eq!(job.next_warning().await, Some(Bytes::from_static(b"careful")));
        assert_eq!(job.next_warning().await, None);
    }

    #[tokio::test]
    async fn test_wait_returns_terminal_state() {
        let (mut job, sink) = new_job("H:1");

        let finisher = tokio::spawn(async move {
            tokio::task::yield_now().await;
            sink.finish(JobState::Failed);
        });

        assert_eq!(job.wait().await, JobState::Failed);
        finisher.await.unwrap();
    }

    #[test]
    fn test_status_snapshot_serializes() {
        let (job, sink) = new_job("H:7");
        sink.set_progress(Progress {
            numerator: 1,
            denominator: 2,
        });

        let json = serde_json::to_value(job.status()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "handle": "H:7",
                "state": "running",
                "progress": { "numerator": 1, "denominator": 2 }
            })
        );
        assert_eq!(sink.status(), job.status());
    }

    #[test]
    fn test_state_is_terminal() {
        assert!(!JobState::Created.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
    }
}
