//! Job module - submitted jobs and the registry that tracks them.
//!
//! - [`Job`] - handle given to the submitter
//! - `JobSink` - dispatch-side mutator, never exposed
//! - `JobRegistry` / `PendingSubmits` - shared state owned by the client

mod handle;
mod registry;

pub use handle::{Job, JobState, JobStatus, Progress};

pub(crate) use handle::{new_job, JobSink};
pub(crate) use registry::{JobRegistry, PendingSubmits, Unsent};
