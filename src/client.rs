//! Client builder and dispatch loop.
//!
//! The [`ClientBuilder`] configures buffer limits and connects. The
//! [`Client`] then manages the connection lifecycle:
//! 1. Split the stream into read and write halves
//! 2. Spawn the writer task on the write half
//! 3. Spawn the read loop: frames are read, decoded and dispatched to jobs
//! 4. `submit` queues a frame and waits for the server to create the job
//!
//! # Example
//!
//! ```ignore
//! use gearman_client::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder().connect("127.0.0.1:4730").await?;
//!
//!     let mut job = client.submit("reverse", "hello").await?;
//!     while let Some(chunk) = job.next_data().await {
//!         println!("{}", String::from_utf8_lossy(&chunk));
//!     }
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::dispatch::Dispatcher;
use crate::error::{GearmanError, Result};
use crate::job::{Job, JobRegistry, JobStatus, PendingSubmits, Unsent};
use crate::protocol::{
    packet_type, Frame, FrameReader, DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_READ_BUFFER_SIZE,
};
use crate::transport::{self, Network};
use crate::writer::{spawn_writer_task, wait_ack, OutboundFrame, WriterHandle, DEFAULT_CHANNEL_CAPACITY};

/// Job priority, selecting the submit packet type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JobPriority {
    #[default]
    Normal,
    High,
    Low,
}

impl JobPriority {
    fn packet_type(self) -> i32 {
        match self {
            JobPriority::Normal => packet_type::SUBMIT_JOB,
            JobPriority::High => packet_type::SUBMIT_JOB_HIGH,
            JobPriority::Low => packet_type::SUBMIT_JOB_LOW,
        }
    }
}

/// A job submission: function name, payload, and optional unique id.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    function: Bytes,
    unique: Bytes,
    payload: Bytes,
    priority: JobPriority,
}

impl SubmitRequest {
    /// Create a normal-priority submission with an empty unique id.
    pub fn new(function: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            function: Bytes::from(function.into()),
            unique: Bytes::new(),
            payload: payload.into(),
            priority: JobPriority::Normal,
        }
    }

    /// Set the unique id.
    ///
    /// A server that echoes the unique id in `JOB_CREATED` lets the client
    /// match the created job to this submission directly.
    pub fn unique(mut self, unique: impl Into<String>) -> Self {
        self.unique = Bytes::from(unique.into());
        self
    }

    /// Set the priority.
    pub fn priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    /// The frame this submission is sent as.
    pub fn to_frame(&self) -> Frame {
        Frame::request(
            self.priority.packet_type(),
            vec![
                self.function.clone(),
                self.unique.clone(),
                self.payload.clone(),
            ],
        )
    }
}

/// Builder for configuring and connecting a client.
pub struct ClientBuilder {
    read_buffer_size: usize,
    max_payload_size: u32,
    channel_capacity: usize,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Set the size of each socket read.
    ///
    /// Default: 64KB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the largest payload the client accepts from the server.
    ///
    /// Default: 1GB
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Connect over TCP. A missing port defaults to 4730.
    pub async fn connect(self, addr: &str) -> Result<Client> {
        self.connect_network(Network::Tcp, addr).await
    }

    /// Connect over a Unix domain socket.
    #[cfg(unix)]
    pub async fn connect_unix(self, path: &str) -> Result<Client> {
        self.connect_network(Network::Unix, path).await
    }

    /// Connect using a network name (`tcp`, `tcp4`, `tcp6`, `unix`).
    pub async fn connect_network(self, network: impl AsNetwork, addr: &str) -> Result<Client> {
        let conn = transport::connect(network.as_network()?, addr).await?;
        tracing::debug!("Connected to job server at {}", addr);
        Ok(self.build_with_stream(conn))
    }

    /// Build a client over an already connected stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build_with_stream<S>(self, stream: S) -> Client
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Client::start(stream, self)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Either a [`Network`] or its name.
pub trait AsNetwork {
    fn as_network(&self) -> Result<Network>;
}

impl AsNetwork for Network {
    fn as_network(&self) -> Result<Network> {
        Ok(*self)
    }
}

impl AsNetwork for &str {
    fn as_network(&self) -> Result<Network> {
        self.parse()
    }
}

/// A client connected to one job server.
///
/// `Client` is `Send + Sync`; share it behind an `Arc` to submit from
/// several tasks at once.
pub struct Client {
    /// Writer handle for sending frames.
    writer: WriterHandle,
    /// Live jobs by handle.
    registry: Arc<JobRegistry>,
    /// Submitters waiting for `JOB_CREATED`.
    pending: Arc<PendingSubmits>,
    /// Keeps pending order equal to wire order.
    submit_order: tokio::sync::Mutex<()>,
    /// Stops the read loop.
    shutdown_tx: watch::Sender<bool>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    writer_task: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Connect over TCP with default settings.
    pub async fn connect(addr: &str) -> Result<Self> {
        ClientBuilder::new().connect(addr).await
    }

    fn start<S>(stream: S, config: ClientBuilder) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, write_half) = tokio::io::split(stream);

        let (writer, writer_task) = spawn_writer_task(write_half, config.channel_capacity);

        let registry = Arc::new(JobRegistry::new());
        let pending = Arc::new(PendingSubmits::new());
        let dispatcher = Dispatcher::new(registry.clone(), pending.clone());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let frames = FrameReader::with_limits(reader, config.read_buffer_size, config.max_payload_size);

        let read_task = tokio::spawn(async move {
            if let Err(e) = Self::read_loop(frames, &dispatcher, shutdown_rx).await {
                tracing::error!("Read loop error: {}", e);
            }
            dispatcher.shutdown();
        });

        Client {
            writer,
            registry,
            pending,
            submit_order: tokio::sync::Mutex::new(()),
            shutdown_tx,
            read_task: Mutex::new(Some(read_task)),
            writer_task: Mutex::new(Some(writer_task)),
        }
    }

    /// Main read loop - reads frames and dispatches them to jobs.
    ///
    /// Returns on end of stream, on close, or on a transport or framing
    /// error. Frames that fail to decode are skipped.
    async fn read_loop<R: AsyncRead + Unpin>(
        mut frames: FrameReader<R>,
        dispatcher: &Dispatcher,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            let next = tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => return Ok(()),
                next = frames.next_frame() => next?,
            };

            let Some(raw) = next else {
                tracing::debug!("Server closed the connection");
                return Ok(());
            };

            match Frame::decode(raw) {
                Ok(frame) => dispatcher.dispatch(frame),
                Err(e) => tracing::warn!("Skipping undecodable frame: {}", e),
            }
        }
    }

    /// Submit a job with normal priority and an empty unique id.
    ///
    /// Returns once the server has created the job.
    pub async fn submit(&self, function: &str, payload: impl Into<Bytes>) -> Result<Job> {
        self.submit_job(SubmitRequest::new(function, payload)).await
    }

    /// Submit a job and wait for the server to create it.
    ///
    /// # Errors
    ///
    /// - `Encoding` if the function name, unique id or payload contains a NUL byte
    /// - `Io` if writing the frame fails
    /// - `ConnectionClosed` if the client is closed or the connection is lost
    ///   before the job is created
    pub async fn submit_job(&self, request: SubmitRequest) -> Result<Job> {
        let bytes = request.to_frame().encode()?;

        let (id, created, ack) = {
            let _order = self.submit_order.lock().await;
            let (id, created) = self.pending.push(request.unique.clone())?;
            let unsent = Unsent::new(&self.pending, id);
            let (frame, ack) = OutboundFrame::acked(bytes);
            self.writer.send(frame).await?;
            unsent.sent();
            (id, created, ack)
        };

        if let Err(e) = wait_ack(ack).await {
            self.pending.remove(id);
            return Err(e);
        }

        created.await.map_err(|_| GearmanError::ConnectionClosed)
    }

    /// Status of an in-flight job, if its handle is registered.
    pub fn job_status(&self, handle: &str) -> Option<JobStatus> {
        self.registry.status(handle)
    }

    /// Number of jobs created but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    /// Number of submissions waiting for the server to create their job.
    pub fn pending_submissions(&self) -> usize {
        self.pending.len()
    }

    /// Close the connection.
    ///
    /// Stops the read loop, flushes queued frames and shuts down the stream.
    /// Jobs still in flight are marked failed and waiting submissions return
    /// `ConnectionClosed`. Calling `close` again is a no-op.
    pub async fn close(&self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.writer.shutdown().await;

        let read_task = self.read_task.lock().take();
        if let Some(task) = read_task {
            if let Err(e) = task.await {
                tracing::error!("Read loop panicked: {}", e);
            }
        }

        let writer_task = self.writer_task.lock().take();
        if let Some(task) = writer_task {
            match task.await {
                Ok(result) => result?,
                Err(e) => tracing::error!("Writer task panicked: {}", e),
            }
        }

        Ok(())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Resolves once shutdown is requested or the client is dropped.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let requested = *shutdown.borrow_and_update();
        if requested || shutdown.changed().await.is_err() {
            return;
        }
    }
}
