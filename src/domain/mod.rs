//! Domain layer public interface.
//!
//! This module defines the value objects and the transport contract that are
//! independent of any concrete wire protocol, codec or server.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod ack;
mod envelope;
mod message_id;
mod state;
mod transport;

pub use ack::Acknowledgement;
pub use envelope::{
    //
    DuplexMode,
    Envelope,
    Priority,
    TransformKind,
};
pub use message_id::MessageId;
pub use state::MessageState;
pub use transport::{
    //
    CompletionFn,
    Endpoint,
    Timeouts,
    Transport,
    TransportPtr,
};
