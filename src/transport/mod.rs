//! Transport module - connecting to the job server.
//!
//! Provides a single duplex stream type over:
//! - TCP
//! - Unix Domain Sockets (Linux/macOS)

mod connection;

pub use connection::{connect, Connection, Network, DEFAULT_PORT};
