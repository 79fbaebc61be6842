//! In-memory transport implementation.
//!
//! A pure in-process implementation of the [`Transport`] trait, intended for
//! tests, local execution, and as the reference for transport semantics.
//!
//! ## Reference Semantics
//!
//! - A frame sent to an address with a bound [`FrameHandler`] is handed to
//!   that handler exactly once, in-process, with no serialization beyond the
//!   codec's own.
//! - Sending to an address with no handler is a connection failure, the
//!   same way a refused socket is.
//! - A handler that produces no reply yields an empty reply, the
//!   "connected, no data" case.
//! - One-way sends hand the frame over on a spawned task and return without
//!   waiting for the handler.
//!
//! ## Non-Goals
//!
//! This transport does not emulate network failure modes. It exists to
//! provide a deterministic baseline for dispatcher and queue behaviour.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;
use tokio::time::timeout;

use crate::{log_debug, log_trace, Endpoint, QueueError, Result, Timeouts, Transport, TransportPtr};

/// Server-side counterpart of a transport: consumes one request frame and
/// optionally produces a reply frame.
///
/// Implemented by [`MemoryQueueHost`](crate::MemoryQueueHost) and usable by
/// the socket listeners in [`host`](crate::host).
#[async_trait::async_trait]
pub trait FrameHandler: Send + Sync + 'static {
    /// Handle one request. `None` means no reply is sent.
    async fn handle_frame(&self, frame: Bytes) -> Option<Bytes>;
}

/// Shared frame handler pointer.
pub type FrameHandlerPtr = Arc<dyn FrameHandler>;

/// Address book for the in-memory transport.
///
/// Maps endpoint addresses to the handler serving them. Tests that run in
/// parallel should each construct their own hub and hand it to
/// [`create_memory_transport_with_hub`].
///
/// ```
/// # use duplex_queue::{MemoryHub, MemoryQueueHost};
/// # async fn example() {
/// let hub = MemoryHub::new();
/// hub.bind("orders", MemoryQueueHost::new()).await;
/// assert!(hub.is_bound("orders").await);
/// # }
/// ```
#[derive(Default)]
pub struct MemoryHub {
    // ---
    handlers: RwLock<HashMap<String, FrameHandlerPtr>>,
}

impl MemoryHub {
    /// Create a new, empty hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve `address` with `handler`, replacing any previous binding.
    pub async fn bind(&self, address: impl Into<String>, handler: FrameHandlerPtr) {
        // ---
        let address = address.into();
        log_debug!("memory hub: bind {address}");
        self.handlers.write().await.insert(address, handler);
    }

    /// Stop serving `address`. Returns whether it was bound.
    pub async fn unbind(&self, address: &str) -> bool {
        self.handlers.write().await.remove(address).is_some()
    }

    pub async fn is_bound(&self, address: &str) -> bool {
        self.handlers.read().await.contains_key(address)
    }

    async fn resolve(&self, endpoint: &Endpoint) -> Result<FrameHandlerPtr> {
        // ---
        self.handlers
            .read()
            .await
            .get(endpoint.address.as_ref())
            .cloned()
            .ok_or_else(|| QueueError::Connection(format!("no handler bound at {endpoint}")))
    }
}

/// In-memory transport routing frames through a [`MemoryHub`].
struct MemoryTransport {
    // ---
    hub: Arc<MemoryHub>,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn send_one_way(&self, endpoint: &Endpoint, frame: Bytes, _timeouts: Timeouts) -> Result<()> {
        // ---
        let handler = self.hub.resolve(endpoint).await?;
        log_trace!("memory: one-way {} bytes to {endpoint}", frame.len());

        tokio::spawn(async move {
            let _ = handler.handle_frame(frame).await;
        });
        Ok(())
    }

    async fn send_duplex(&self, endpoint: &Endpoint, frame: Bytes, timeouts: Timeouts) -> Result<Bytes> {
        // ---
        let handler = self.hub.resolve(endpoint).await?;
        log_trace!("memory: duplex {} bytes to {endpoint}", frame.len());

        let reply = timeout(timeouts.read, handler.handle_frame(frame))
            .await
            .map_err(|_| QueueError::Timeout("read"))?;

        Ok(reply.unwrap_or_default())
    }
}

/// Create an in-memory transport on `hub`. Transports built on the same hub
/// reach the same handlers.
pub fn create_memory_transport_with_hub(hub: Arc<MemoryHub>) -> TransportPtr {
    Arc::new(MemoryTransport { hub })
}
