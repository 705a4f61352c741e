//! Job registry and pending-submission queue.
//!
//! The registry maps server-assigned handles to the sinks of live jobs.
//! Updates to an existing job only need the read lock; insert and remove
//! take the write lock.
//!
//! The pending queue holds submitters waiting for their `JOB_CREATED`.
//! Entries are queued in the order their frames were written.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;

use super::handle::{JobSink, JobStatus};
use super::Job;
use crate::error::{GearmanError, Result};

/// Handle to sink map for in-flight jobs.
#[derive(Default)]
pub(crate) struct JobRegistry {
    jobs: RwLock<HashMap<String, JobSink>>,
}

impl JobRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a sink. A previous sink under the same handle is returned.
    pub(crate) fn insert(&self, sink: JobSink) -> Option<JobSink> {
        self.jobs.write().insert(sink.handle().to_string(), sink)
    }

    pub(crate) fn remove(&self, handle: &str) -> Option<JobSink> {
        self.jobs.write().remove(handle)
    }

    /// Run `f` on the sink for `handle` under the read lock.
    ///
    /// Returns `None` if the handle is not registered.
    pub(crate) fn with_job<T>(&self, handle: &str, f: impl FnOnce(&JobSink) -> T) -> Option<T> {
        self.jobs.read().get(handle).map(f)
    }

    pub(crate) fn status(&self, handle: &str) -> Option<JobStatus> {
        self.with_job(handle, JobSink::status)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, handle: &str) -> bool {
        self.jobs.read().contains_key(handle)
    }

    pub(crate) fn len(&self) -> usize {
        self.jobs.read().len()
    }

    /// Remove every registered sink.
    pub(crate) fn drain(&self) -> Vec<JobSink> {
        self.jobs.write().drain().map(|(_, sink)| sink).collect()
    }
}

/// A submitter waiting for its job to be created.
struct PendingSubmit {
    id: u64,
    unique: Bytes,
    tx: oneshot::Sender<Job>,
}

struct PendingQueue {
    entries: VecDeque<PendingSubmit>,
    next_id: u64,
    closed: bool,
}

/// Removes a waiter on drop unless its frame reached the writer.
///
/// Covers a submit cancelled or failed between `push` and the writer
/// accepting its frame. Such a waiter will never get a `JOB_CREATED`.
pub(crate) struct Unsent<'a> {
    pending: &'a PendingSubmits,
    id: Option<u64>,
}

impl<'a> Unsent<'a> {
    pub(crate) fn new(pending: &'a PendingSubmits, id: u64) -> Self {
        Self {
            pending,
            id: Some(id),
        }
    }

    /// The writer accepted the frame; keep the waiter queued.
    pub(crate) fn sent(mut self) {
        self.id = None;
    }
}

impl Drop for Unsent<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.pending.remove(id);
        }
    }
}

/// FIFO of submitters awaiting `JOB_CREATED`.
pub(crate) struct PendingSubmits {
    inner: Mutex<PendingQueue>,
}

impl PendingSubmits {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(PendingQueue {
                entries: VecDeque::new(),
                next_id: 0,
                closed: false,
            }),
        }
    }

    /// Enqueue a waiter. Fails once the queue is closed.
    pub(crate) fn push(&self, unique: Bytes) -> Result<(u64, oneshot::Receiver<Job>)> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(GearmanError::ConnectionClosed);
        }

        let id = inner.next_id;
        inner.next_id += 1;

        let (tx, rx) = oneshot::channel();
        inner.entries.push_back(PendingSubmit { id, unique, tx });
        Ok((id, rx))
    }

    /// Drop a waiter whose frame never reached the server.
    pub(crate) fn remove(&self, id: u64) {
        self.inner.lock().entries.retain(|p| p.id != id);
    }

    /// Hand a created job to its submitter.
    ///
    /// A non-empty `unique` that matches a waiter resolves that waiter;
    /// otherwise the oldest waiter is resolved. Returns the job back if no
    /// waiter is queued.
    ///
    /// Every queued waiter has its frame on the wire, so the entry consumes
    /// this `JOB_CREATED` even when its submitter stopped waiting. The job
    /// then stays registered with nobody observing it.
    pub(crate) fn resolve(&self, unique: Option<&[u8]>, job: Job) -> std::result::Result<(), Job> {
        let entry = {
            let mut inner = self.inner.lock();
            let matched = unique
                .filter(|u| !u.is_empty())
                .and_then(|u| inner.entries.iter().position(|p| &p.unique[..] == u));
            match matched {
                Some(index) => inner.entries.remove(index),
                None => inner.entries.pop_front(),
            }
        };

        let Some(pending) = entry else {
            return Err(job);
        };
        if let Err(job) = pending.tx.send(job) {
            tracing::debug!("Submitter of job {} stopped waiting", job.handle());
        }
        Ok(())
    }

    /// Refuse new waiters and drop the current ones.
    ///
    /// Dropped waiters observe a closed channel.
    pub(crate) fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{new_job, JobState};

    #[test]
    fn test_registry_insert_lookup_remove() {
        let registry = JobRegistry::new();
        let (_job, sink) = new_job("H:1");

        assert!(registry.insert(sink).is_none());
        assert!(registry.contains("H:1"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.status("H:1").unwrap().state, JobState::Created);

        let removed = registry.remove("H:1").unwrap();
        assert_eq!(removed.handle(), "H:1");
        assert!(!registry.contains("H:1"));
        assert!(registry.status("H:1").is_none());
    }

    #[test]
    fn test_registry_with_unknown_handle() {
        let registry = JobRegistry::new();
        assert!(registry.with_job("missing", |_| ()).is_none());
    }

    #[test]
    fn test_registry_drain() {
        let registry = JobRegistry::new();
        let (_a, sink_a) = new_job("H:1");
        let (_b, sink_b) = new_job("H:2");
        registry.insert(sink_a);
        registry.insert(sink_b);

        let drained = registry.drain();

        assert_eq!(drained.len(), 2);
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_pending_resolves_in_fifo_order() {
        let pending = PendingSubmits::new();
        let (_, first) = pending.push(Bytes::new()).unwrap();
        let (_, second) = pending.push(Bytes::new()).unwrap();

        let (job1, _s1) = new_job("H:1");
        let (job2, _s2) = new_job("H:2");
        assert!(pending.resolve(None, job1).is_ok());
        assert!(pending.resolve(None, job2).is_ok());

        assert_eq!(first.await.unwrap().handle(), "H:1");
        assert_eq!(second.await.unwrap().handle(), "H:2");
    }

    #[tokio::test]
    async fn test_pending_matches_unique_id() {
        let pending = PendingSubmits::new();
        let (_, first) = pending.push(Bytes::from_static(b"u-1")).unwrap();
        let (_, second) = pending.push(Bytes::from_static(b"u-2")).unwrap();

        let (job2, _s2) = new_job("H:2");
        assert!(pending.resolve(Some(&b"u-2"[..]), job2).is_ok());
        let (job1, _s1) = new_job("H:1");
        assert!(pending.resolve(Some(&b"unknown"[..]), job1).is_ok());

        assert_eq!(first.await.unwrap().handle(), "H:1");
        assert_eq!(second.await.unwrap().handle(), "H:2");
    }

    #[tokio::test]
    async fn test_abandoned_waiter_consumes_its_job() {
        let pending = PendingSubmits::new();
        let (_, abandoned) = pending.push(Bytes::new()).unwrap();
        let (_, waiting) = pending.push(Bytes::new()).unwrap();
        drop(abandoned);

        let (job_a, _sink_a) = new_job("H:A");
        assert!(pending.resolve(None, job_a).is_ok());
        assert_eq!(pending.len(), 1);

        let (job_b, _sink_b) = new_job("H:B");
        assert!(pending.resolve(None, job_b).is_ok());
        assert_eq!(waiting.await.unwrap().handle(), "H:B");
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_unsent_guard_removes_waiter() {
        let pending = PendingSubmits::new();
        let (id, _rx) = pending.push(Bytes::new()).unwrap();
        drop(Unsent::new(&pending, id));
        assert_eq!(pending.len(), 0);

        let (id, _rx) = pending.push(Bytes::new()).unwrap();
        Unsent::new(&pending, id).sent();
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_pending_resolve_without_waiter_returns_job() {
        let pending = PendingSubmits::new();
        let (job, _sink) = new_job("H:1");

        let returned = pending.resolve(None, job).unwrap_err();
        assert_eq!(returned.handle(), "H:1");
    }

    #[tokio::test]
    async fn test_pending_remove_and_close() {
        let pending = PendingSubmits::new();
        let (id, _rx) = pending.push(Bytes::new()).unwrap();
        let (_, waiting) = pending.push(Bytes::new()).unwrap();

        pending.remove(id);
        assert_eq!(pending.len(), 1);

        pending.close();
        assert!(waiting.await.is_err());
        assert!(matches!(
            pending.push(Bytes::new()),
            Err(GearmanError::ConnectionClosed)
        ));
    }
}
