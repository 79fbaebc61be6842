//! Caller-owned map from queue host name to configured client.
//!
//! The registry replaces per-process client caches: applications create one,
//! share it by reference (or inside an `Arc`), and drop it when done, which
//! keeps test cases isolated from each other.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    log_debug, Acknowledgement, Envelope, MessageId, MessageState, QueueClient, QueueError, Result,
};

fn read_ignore_poison<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_ignore_poison<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Concurrent host-name → [`QueueClient`] map.
///
/// All methods take `&self` and are safe to call from any number of tasks.
/// Lookups hand out clones, so no lock is held across I/O. There is no
/// ordering between entries; for one key the last writer wins.
///
/// ```
/// use duplex_queue::{ChannelSettings, ClientRegistry, QueueClient};
///
/// let registry = ClientRegistry::new();
/// assert!(registry.try_add("orders", QueueClient::new(ChannelSettings::new("orders"))));
/// assert!(!registry.try_add("orders", QueueClient::new(ChannelSettings::new("orders"))));
/// assert!(registry.try_get_api("orders").is_some());
/// ```
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, QueueClient>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the client for `host`.
    pub fn set(&self, host: impl Into<String>, client: QueueClient) {
        write_ignore_poison(&self.clients).insert(host.into(), client);
    }

    /// Insert only if `host` is not registered yet. Returns whether it was
    /// inserted.
    pub fn try_add(&self, host: impl Into<String>, client: QueueClient) -> bool {
        // ---
        use std::collections::hash_map::Entry;

        match write_ignore_poison(&self.clients).entry(host.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(client);
                true
            }
        }
    }

    /// Replace the client for `host`, inserting it if absent. Always
    /// returns `true`.
    pub fn try_update(&self, host: impl Into<String>, client: QueueClient) -> bool {
        // ---
        let host = host.into();
        let replaced = write_ignore_poison(&self.clients)
            .insert(host.clone(), client)
            .is_some();
        if !replaced {
            log_debug!("registry: update of unknown host '{host}' added it");
        }
        true
    }

    /// Remove and return the client for `host`.
    pub fn remove(&self, host: &str) -> Option<QueueClient> {
        write_ignore_poison(&self.clients).remove(host)
    }

    pub fn clear(&self) {
        write_ignore_poison(&self.clients).clear();
    }

    /// The client for `host`.
    ///
    /// # Errors
    ///
    /// [`QueueError::QueueNotFound`] if `host` is not registered.
    pub fn get_api(&self, host: &str) -> Result<QueueClient> {
        self.try_get_api(host)
            .ok_or_else(|| QueueError::QueueNotFound(host.to_string()))
    }

    pub fn try_get_api(&self, host: &str) -> Option<QueueClient> {
        read_ignore_poison(&self.clients).get(host).cloned()
    }

    pub fn contains(&self, host: &str) -> bool {
        read_ignore_poison(&self.clients).contains_key(host)
    }

    pub fn len(&self) -> usize {
        read_ignore_poison(&self.clients).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue `env` through the client registered for `host`.
    ///
    /// An unregistered host yields a `QueueNotFound` acknowledgement without
    /// any network I/O.
    pub async fn enqueue(&self, env: Envelope, host: &str) -> Result<Acknowledgement> {
        // ---
        let Some(client) = self.try_get_api(host) else {
            return Ok(Acknowledgement::queue_not_found(&env, host));
        };

        let env = if env.host.is_empty() { env.with_host(host) } else { env };
        client.enqueue(env).await
    }

    /// Dequeue through the client registered for `host`.
    ///
    /// An unregistered host yields a synthesized `QueueNotFound` envelope
    /// without any network I/O, so it can be told apart from an empty queue.
    pub async fn dequeue(&self, host: &str) -> Result<Option<Envelope>> {
        // ---
        let Some(client) = self.try_get_api(host) else {
            log_debug!("registry: dequeue from unknown host '{host}'");
            return Ok(Some(Envelope::synthesized(
                MessageId::generate(),
                host,
                MessageState::QueueNotFound,
                format!("no queue client registered for host '{host}'"),
            )));
        };
        client.dequeue().await
    }
}
