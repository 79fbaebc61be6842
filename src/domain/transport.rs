// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! This module defines the contract every wire transport (TCP, HTTP, local
//! pipe, in-memory) implements so the dispatcher can treat them uniformly.
//! It intentionally avoids any reference to sockets, pipes or HTTP clients.
//!
//! A transport moves one already-encoded frame to an endpoint and, for the
//! duplex shapes, returns the raw reply bytes. Encoding, retries, timeout
//! composition, cancellation and error-to-acknowledgement mapping all live
//! in the [`Dispatcher`](crate::Dispatcher).
//!
//! Concrete implementations live under `src/transport/`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;

use crate::{Protocol, Result};

/// Resolved remote address of a queue host.
///
/// Its interpretation depends on the protocol: `address:port` for TCP, a
/// base URL for HTTP, a socket path or pipe name for the local pipe, and a
/// hub key for the in-memory transport.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub protocol: Protocol,
    pub address: Arc<str>,
    pub port: u16,
}

impl Endpoint {
    pub fn new(protocol: Protocol, address: impl Into<Arc<str>>, port: u16) -> Self {
        Self {
            protocol,
            address: address.into(),
            port,
        }
    }

    /// `host:port` form used by socket transports.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Base URL used by the HTTP transport.
    ///
    /// An address that already carries a scheme is used as given.
    pub fn url(&self) -> String {
        if self.address.starts_with("http://") || self.address.starts_with("https://") {
            self.address.to_string()
        } else {
            format!("http://{}:{}/", self.address, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.protocol {
            Protocol::Pipe => write!(f, "pipe://{}", self.address),
            Protocol::Http => f.write_str(&self.url()),
            Protocol::Tcp => write!(f, "tcp://{}", self.socket_addr()),
        }
    }
}

/// Per-call connect and read bounds handed to a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Bound on establishing the connection.
    pub connect: Duration,

    /// Bound on waiting for the reply once the request is written.
    pub read: Duration,
}

impl Timeouts {
    pub fn new(connect: Duration, read: Duration) -> Self {
        Self { connect, read }
    }
}

/// Completion callback for [`Transport::send_duplex_async`].
///
/// Invoked exactly once, on whichever task the transport completes on.
pub type CompletionFn = Box<dyn FnOnce(Result<Bytes>) + Send + 'static>;

/// Wire transport abstraction.
///
/// Implementations must:
/// - report "could not connect" as [`QueueError::Connection`](crate::QueueError::Connection),
///   distinct from "connected but no data", which is `Ok(Bytes::new())`;
/// - honour the connect and read bounds in [`Timeouts`], reporting an elapsed
///   bound as [`QueueError::Timeout`](crate::QueueError::Timeout);
/// - keep no per-call mutable state, since calls run concurrently.
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show explicit
/// lifetimes and a boxed `Future`. Consumers should treat methods as normal
/// `async fn`s.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    // ---
    /// Short transport name, used in logs.
    fn name(&self) -> &'static str;

    /// Transmit `frame` without reading any reply.
    async fn send_one_way(&self, endpoint: &Endpoint, frame: Bytes, timeouts: Timeouts)
        -> Result<()>;

    /// Transmit `frame` and return the raw reply bytes.
    async fn send_duplex(&self, endpoint: &Endpoint, frame: Bytes, timeouts: Timeouts)
        -> Result<Bytes>;

    /// The transport's own asynchronous duplex primitive.
    ///
    /// The default runs [`send_duplex`](Self::send_duplex) on a spawned task
    /// and hands its result to `on_completed`. Transports with a native
    /// completion mechanism may override it.
    fn send_duplex_async(
        self: Arc<Self>,
        endpoint: Endpoint,
        frame: Bytes,
        timeouts: Timeouts,
        on_completed: CompletionFn,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let result = self.send_duplex(&endpoint, frame, timeouts).await;
            on_completed(result);
        })
    }
}

/// Shared transport pointer.
///
/// `.clone()` only bumps a reference count; used to erase concrete
/// transport types behind the stable domain interface.
pub type TransportPtr = Arc<dyn Transport>;
