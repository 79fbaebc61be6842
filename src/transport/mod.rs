//! Transport implementations.
//!
//! Concrete implementations of the domain-level [`Transport`] trait, exposed
//! only through constructor functions and collected into a
//! [`TransportTable`] indexed by [`Protocol`].
//!
//! Domain code must not depend on transport-specific types.

pub(crate) mod framing;
mod http;
mod memory;
mod pipe;
mod tcp;

pub use http::create_http_transport;
pub use memory::{create_memory_transport_with_hub, FrameHandler, FrameHandlerPtr, MemoryHub};
pub use pipe::create_pipe_transport;
pub use tcp::create_tcp_transport;

use crate::{Protocol, TransportPtr};

/// One transport per [`Protocol`].
///
/// Selection is a pure lookup on the channel's configured protocol. The
/// default table holds the real network transports; tests override slots
/// with [`with`](Self::with) or [`uniform`](Self::uniform).
#[derive(Clone)]
pub struct TransportTable {
    http: TransportPtr,
    pipe: TransportPtr,
    tcp: TransportPtr,
}

impl TransportTable {
    /// Route every protocol through the same transport.
    pub fn uniform(transport: TransportPtr) -> Self {
        Self {
            http: transport.clone(),
            pipe: transport.clone(),
            tcp: transport,
        }
    }

    /// Replace the transport serving `protocol`.
    pub fn with(mut self, protocol: Protocol, transport: TransportPtr) -> Self {
        // ---
        match protocol {
            Protocol::Http => self.http = transport,
            Protocol::Pipe => self.pipe = transport,
            Protocol::Tcp => self.tcp = transport,
        }
        self
    }

    /// The transport serving `protocol`.
    pub fn get(&self, protocol: Protocol) -> &TransportPtr {
        match protocol {
            Protocol::Http => &self.http,
            Protocol::Pipe => &self.pipe,
            Protocol::Tcp => &self.tcp,
        }
    }
}

impl Default for TransportTable {
    fn default() -> Self {
        Self {
            http: create_http_transport(),
            pipe: create_pipe_transport(),
            tcp: create_tcp_transport(),
        }
    }
}

impl std::fmt::Debug for TransportTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportTable")
            .field("http", &self.http.name())
            .field("pipe", &self.pipe.name())
            .field("tcp", &self.tcp.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_default_table_selects_by_protocol() {
        // ---
        let table = TransportTable::default();
        assert_eq!(table.get(Protocol::Tcp).name(), "tcp");
        assert_eq!(table.get(Protocol::Pipe).name(), "pipe");
        assert!(table.get(Protocol::Http).name().starts_with("http"));
    }

    #[test]
    fn test_override_single_slot() {
        // ---
        let table = TransportTable::default()
            .with(Protocol::Pipe, create_memory_transport_with_hub(MemoryHub::new()));
        assert_eq!(table.get(Protocol::Pipe).name(), "memory");
        assert_eq!(table.get(Protocol::Tcp).name(), "tcp");

        let uniform = TransportTable::uniform(create_memory_transport_with_hub(MemoryHub::new()));
        for protocol in Protocol::ALL {
            assert_eq!(uniform.get(protocol).name(), "memory");
        }
    }
}
