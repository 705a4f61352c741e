//! # gearman-client
//!
//! Async Rust client for the Gearman job server protocol.
//!
//! A [`Client`] holds one connection to a job server. Jobs are submitted
//! with [`Client::submit`], which returns a [`Job`] once the server has
//! assigned it a handle. A background read loop decodes every frame the
//! server pushes and routes it to the job it names: progress updates,
//! streamed data, warnings, and the final complete or fail.
//!
//! ## Architecture
//!
//! - **Protocol**: 12-byte header + NUL-separated arguments, framed by the
//!   declared payload size
//! - **Writer task**: the only writer on the socket; submits are acknowledged
//!   once their bytes are flushed
//! - **Read loop**: single task, applies frames in arrival order
//!
//! ## Example
//!
//! ```ignore
//! use gearman_client::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::connect("localhost:4730").await?;
//!
//!     let mut job = client.submit("reverse", "hello").await?;
//!     while let Some(chunk) = job.next_data().await {
//!         println!("{}", String::from_utf8_lossy(&chunk));
//!     }
//!     println!("{:?}", job.state());
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod job;
pub mod protocol;
pub mod transport;

mod client;
mod dispatch;
mod writer;

pub use client::{AsNetwork, Client, ClientBuilder, JobPriority, SubmitRequest};
pub use error::{GearmanError, Result};
pub use job::{Job, JobState, JobStatus, Progress};
