//! Lifecycle state of a dispatched item.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a dispatched envelope.
///
/// ```text
/// Sending ──► Arrived | OperationCanceled | OperationFailed | UnExpectedError
///          │  TransCommited | TransAborted | QueueNotFound
/// ```
///
/// `Sending` is the only non-terminal state a client observes. The wire
/// names are part of the server contract and keep their historical spelling
/// (`UnExpectedError`, `TransCommited`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MessageState {
    /// Created or in flight; no outcome yet.
    #[default]
    Sending,

    /// Delivered (server-declared success, or best-effort one-way delivery).
    Arrived,

    /// A cooperative cancellation was observed before an outcome.
    OperationCanceled,

    /// The transport or the server reported a failure.
    OperationFailed,

    /// A reply was expected but none (or an undecodable one) came back.
    #[serde(rename = "UnExpectedError")]
    UnexpectedError,

    /// The item's transaction was committed by the consumer.
    #[serde(rename = "TransCommited")]
    TransCommitted,

    /// The item's transaction was aborted by the consumer.
    TransAborted,

    /// No client or queue exists for the requested host. Synthesized locally.
    QueueNotFound,
}

impl MessageState {
    /// Every state except `Sending` is terminal.
    pub fn is_terminal(self) -> bool {
        !matches!(self, MessageState::Sending)
    }

    /// Wire name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageState::Sending => "Sending",
            MessageState::Arrived => "Arrived",
            MessageState::OperationCanceled => "OperationCanceled",
            MessageState::OperationFailed => "OperationFailed",
            MessageState::UnexpectedError => "UnExpectedError",
            MessageState::TransCommitted => "TransCommited",
            MessageState::TransAborted => "TransAborted",
            MessageState::QueueNotFound => "QueueNotFound",
        }
    }
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
