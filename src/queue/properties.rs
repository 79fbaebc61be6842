use serde::{Deserialize, Serialize};

use crate::settings::{MAX_RETRY, MIN_RETRY};

/// Definition of a remote queue, sent as the body of `AddQueue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueProperties {
    pub queue_name: String,

    /// Whether dequeued items await `Commit`/`Abort`.
    #[serde(default)]
    pub is_transactional: bool,

    /// Delivery attempts the server allows per item, in `[1, 5]`.
    #[serde(default = "default_max_retry")]
    pub max_retry: u8,

    /// Whether the server restores the queue's items when it restarts.
    #[serde(default)]
    pub reload_on_start: bool,
}

fn default_max_retry() -> u8 {
    MIN_RETRY
}

impl QueueProperties {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            is_transactional: false,
            max_retry: MIN_RETRY,
            reload_on_start: false,
        }
    }

    pub fn transactional(mut self, is_transactional: bool) -> Self {
        self.is_transactional = is_transactional;
        self
    }

    /// Clamped to `[1, 5]`.
    pub fn with_max_retry(mut self, max_retry: i32) -> Self {
        self.max_retry = max_retry.clamp(MIN_RETRY as i32, MAX_RETRY as i32) as u8;
        self
    }

    pub fn reload_on_start(mut self, reload: bool) -> Self {
        self.reload_on_start = reload;
        self
    }
}
