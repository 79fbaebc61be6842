//! Terminal result of a dispatch attempt.

use serde::{Deserialize, Serialize};

use crate::{Envelope, MessageId, MessageState};

/// Outcome of one dispatched envelope.
///
/// Created exactly once per dispatch attempt: either decoded from the
/// server's reply or synthesized locally when the transport failed, timed
/// out or returned nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub state: MessageState,
    pub label: String,
    pub id: MessageId,
    pub host: String,
}

impl Acknowledgement {
    pub fn new(
        state: MessageState,
        label: impl Into<String>,
        id: MessageId,
        host: impl Into<String>,
    ) -> Self {
        Self {
            state,
            label: label.into(),
            id,
            host: host.into(),
        }
    }

    /// Acknowledge `env` with the given state, correlating by id and host.
    pub fn for_envelope(env: &Envelope, state: MessageState, label: impl Into<String>) -> Self {
        Self::new(state, label, env.id().clone(), env.host.clone())
    }

    /// Synthesized when the registry has no client for `host`.
    pub fn queue_not_found(env: &Envelope, host: &str) -> Self {
        Self::new(
            MessageState::QueueNotFound,
            format!("no queue client registered for host '{host}'"),
            env.id().clone(),
            host,
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.state,
            MessageState::Arrived | MessageState::TransCommitted
        )
    }
}
