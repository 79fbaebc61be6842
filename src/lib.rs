//! Transport-agnostic duplex messaging with a remote work-queue client on top.
//!
//! Clients send [`Envelope`]s to a named endpoint over TCP, HTTP or a local
//! pipe and either fire-and-forget or await the correlated reply. The
//! [`QueueClient`] builds enqueue/dequeue/peek/consume/commit/abort
//! semantics on that, and the [`ClientRegistry`] shares configured clients
//! by host name.
//!
//! ```no_run
//! use duplex_queue::{ChannelSettings, ClientRegistry, Envelope, Protocol, QueueClient};
//!
//! # async fn example() -> duplex_queue::Result<()> {
//! let registry = ClientRegistry::new();
//! registry.set(
//!     "orders",
//!     QueueClient::new(ChannelSettings::new("orders").with_protocol(Protocol::Tcp)),
//! );
//!
//! let ack = registry.enqueue(Envelope::new("order #1"), "orders").await?;
//! println!("{}: {}", ack.id, ack.state);
//! # Ok(())
//! # }
//! ```
//!
//! Under the default configuration no operation fails with a transport
//! error: failures become empty results or terminal acknowledgements and
//! are reported to the dispatcher's fault hook. Set
//! `enable_remote_exception` on the [`ChannelSettings`] to receive them as
//! `Err` instead.

// Import all sub modules once...
mod macros;

mod dispatcher;
mod domain;
mod error;
mod payload;
mod queue;
mod registry;
mod retry;
mod settings;

pub mod codec;
pub mod host;
pub mod transport;

pub(crate) use macros::{log_debug, log_error, log_info, log_trace, log_warn};

// --- public re-exports
pub use dispatcher::{Dispatcher, FaultHook};
pub use error::{QueueError, Result};
pub use payload::PayloadCarrier;
pub use queue::{
    //
    QueueClient,
    QueueCommand,
    QueueProperties,
    ReceiveHandle,
    CONSUME_CONNECT_CEILING,
    RECEIVE_POLL_INTERVAL,
};
pub use registry::ClientRegistry;
pub use retry::RetryPolicy;
pub use settings::{ChannelSettings, ChannelSettingsBuilder, Protocol, WaitPolicy};

pub use host::MemoryQueueHost;
pub use transport::{
    //
    create_memory_transport_with_hub,
    FrameHandler,
    MemoryHub,
    TransportTable,
};

pub use domain::{
    //
    Acknowledgement,
    CompletionFn,
    DuplexMode,
    Endpoint,
    Envelope,
    MessageId,
    MessageState,
    Priority,
    Timeouts,
    TransformKind,
    Transport,
    TransportPtr,
};

pub use tokio_util::sync::CancellationToken;
