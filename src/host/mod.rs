//! Reference queue host.
//!
//! [`MemoryQueueHost`] is a [`FrameHandler`] that serves the whole command
//! vocabulary over in-process queues. Bind it to a [`MemoryHub`](crate::MemoryHub)
//! address for in-memory tests, or run it behind [`serve_tcp`] /
//! [`serve_pipe`] to exercise the real socket transports.
//!
//! Items live only in memory. Nothing survives the host being dropped.
//!
//! # Replies
//!
//! | command                                  | reply body               |
//! |------------------------------------------|--------------------------|
//! | `Enqueue`                                | [`Acknowledgement`]      |
//! | `Dequeue`, `DequeuePriority`, `Peek`, `Consume` | stored [`Envelope`] or empty |
//! | `Commit`, `Abort`                        | none (one-way)           |
//! | `AddQueue`, `RemoveQueue`, `Exists`      | status [`Envelope`]      |
//! | `Report*`                                | status [`Envelope`] with the item count |
//! | anything else                            | `OperationFailed` [`Envelope`] |
//!
//! Replies are encoded with the request's transform kind. Requests sent with
//! [`DuplexMode::None`](crate::DuplexMode::None) get no reply.

mod listener;

pub use listener::serve_tcp;
#[cfg(unix)]
pub use listener::serve_pipe;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::Notify;

use crate::transport::FrameHandler;
use crate::{
    codec, log_debug, log_warn, Acknowledgement, Envelope, MessageId, MessageState, Priority,
    QueueCommand, QueueProperties, TransformKind,
};

/// Longest a `Consume` with `expiration = 0` is held.
pub const DEFAULT_CONSUME_HOLD: Duration = Duration::from_secs(30);

/// Prefix of the report command tags the host answers with an item count.
pub const REPORT_PREFIX: &str = "Report";

fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // ---
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug)]
struct HostedQueue {
    properties: QueueProperties,

    /// Highest priority first, FIFO within a priority.
    items: Vec<Envelope>,

    /// Dequeued items of a transactional queue awaiting Commit/Abort.
    in_flight: HashMap<MessageId, Envelope>,
}

impl HostedQueue {
    fn new(properties: QueueProperties) -> Self {
        Self {
            properties,
            items: Vec::new(),
            in_flight: HashMap::new(),
        }
    }

    fn push(&mut self, env: Envelope) {
        let at = self
            .items
            .iter()
            .position(|queued| queued.priority < env.priority)
            .unwrap_or(self.items.len());
        self.items.insert(at, env);
    }

    fn take(&mut self, at: usize) -> Envelope {
        let env = self.items.remove(at);
        if self.properties.is_transactional {
            self.in_flight.insert(env.id().clone(), env.clone());
        }
        env
    }
}

/// A committed or aborted transaction, as recorded by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub id: MessageId,
    pub host: String,
    pub state: MessageState,
}

/// In-process queue server.
#[derive(Debug, Default)]
pub struct MemoryQueueHost {
    // ---
    queues: Mutex<HashMap<String, HostedQueue>>,
    transactions: Mutex<Vec<TransactionRecord>>,
    arrivals: Notify,
}

impl MemoryQueueHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of items waiting in `queue`.
    pub fn len(&self, queue: &str) -> usize {
        lock_ignore_poison(&self.queues)
            .get(queue)
            .map_or(0, |q| q.items.len())
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    pub fn contains_queue(&self, queue: &str) -> bool {
        lock_ignore_poison(&self.queues).contains_key(queue)
    }

    /// Properties of `queue`, if it exists.
    pub fn properties(&self, queue: &str) -> Option<QueueProperties> {
        lock_ignore_poison(&self.queues)
            .get(queue)
            .map(|q| q.properties.clone())
    }

    /// Commit and Abort records in arrival order.
    pub fn transactions(&self) -> Vec<TransactionRecord> {
        lock_ignore_poison(&self.transactions).clone()
    }

    // --- command handlers

    fn enqueue(&self, env: Envelope) -> Acknowledgement {
        // ---
        let mut stored = env;
        stored.state = MessageState::Arrived;
        let ack = Acknowledgement::for_envelope(&stored, MessageState::Arrived, "enqueued");

        let name = stored.host.clone();
        lock_ignore_poison(&self.queues)
            .entry(name.clone())
            .or_insert_with(|| HostedQueue::new(QueueProperties::new(name)))
            .push(stored);

        self.arrivals.notify_waiters();
        ack
    }

    fn dequeue(&self, host: &str, priority: Option<Priority>) -> Option<Envelope> {
        // ---
        let mut queues = lock_ignore_poison(&self.queues);
        let queue = queues.get_mut(host)?;
        let at = match priority {
            Some(priority) => queue.items.iter().position(|env| env.priority == priority)?,
            None if queue.items.is_empty() => return None,
            None => 0,
        };
        Some(queue.take(at))
    }

    fn peek(&self, host: &str) -> Option<Envelope> {
        lock_ignore_poison(&self.queues)
            .get(host)
            .and_then(|q| q.items.first().cloned())
    }

    async fn consume(&self, host: &str, expiration: u32) -> Option<Envelope> {
        // ---
        let hold = if expiration == 0 {
            DEFAULT_CONSUME_HOLD
        } else {
            Duration::from_secs(u64::from(expiration))
        };
        let deadline = tokio::time::Instant::now() + hold;

        loop {
            let notified = self.arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(env) = self.dequeue(host, None) {
                return Some(env);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                log_debug!("consume on {host} held {hold:?} without data");
                return None;
            }
        }
    }

    fn settle(&self, env: &Envelope, state: MessageState) {
        // ---
        if let Some(queue) = lock_ignore_poison(&self.queues).get_mut(&env.host) {
            if let Some(mut item) = queue.in_flight.remove(env.id()) {
                let may_retry = item.retry < queue.properties.max_retry;
                if state == MessageState::TransAborted && may_retry {
                    item.retry += 1;
                    item.state = MessageState::Arrived;
                    queue.push(item);
                    self.arrivals.notify_waiters();
                }
            }
        }

        lock_ignore_poison(&self.transactions).push(TransactionRecord {
            id: env.id().clone(),
            host: env.host.clone(),
            state,
        });
    }

    fn add_queue(&self, env: &Envelope) -> (MessageState, String) {
        // ---
        let properties = match env.body_value::<QueueProperties>() {
            Ok(properties) => properties,
            Err(err) => return (MessageState::OperationFailed, format!("bad queue properties: {err}")),
        };

        let name = if properties.queue_name.is_empty() {
            env.host.clone()
        } else {
            properties.queue_name.clone()
        };

        let mut queues = lock_ignore_poison(&self.queues);
        if queues.contains_key(&name) {
            return (MessageState::Arrived, format!("queue '{name}' already exists"));
        }
        queues.insert(name.clone(), HostedQueue::new(properties));
        (MessageState::Arrived, format!("queue '{name}' created"))
    }

    fn remove_queue(&self, host: &str) -> (MessageState, String) {
        match lock_ignore_poison(&self.queues).remove(host) {
            Some(_) => (MessageState::Arrived, format!("queue '{host}' removed")),
            None => (MessageState::QueueNotFound, format!("queue '{host}' not found")),
        }
    }

    fn exists(&self, host: &str) -> (MessageState, String) {
        if self.contains_queue(host) {
            (MessageState::Arrived, "true".to_string())
        } else {
            (MessageState::QueueNotFound, "false".to_string())
        }
    }

    fn report(&self, host: &str) -> (MessageState, String) {
        (MessageState::Arrived, self.len(host).to_string())
    }

    async fn dispatch(&self, env: Envelope) -> Reply {
        // ---
        let command = match env.command.parse::<QueueCommand>() {
            Ok(command) => command,
            Err(_) if env.command.starts_with(REPORT_PREFIX) => {
                return Reply::Status(self.report(&env.host));
            }
            Err(_) => {
                return Reply::Status((
                    MessageState::OperationFailed,
                    format!("unknown command '{}'", env.command),
                ));
            }
        };

        match command {
            QueueCommand::Enqueue => Reply::Ack(self.enqueue(env)),
            QueueCommand::Dequeue => Reply::Item(self.dequeue(&env.host, None)),
            QueueCommand::DequeuePriority => Reply::Item(self.dequeue(&env.host, Some(env.priority))),
            QueueCommand::Peek => Reply::Item(self.peek(&env.host)),
            QueueCommand::Consume => Reply::Item(self.consume(&env.host, env.expiration).await),
            QueueCommand::Commit => {
                self.settle(&env, MessageState::TransCommitted);
                Reply::Ack(Acknowledgement::for_envelope(&env, MessageState::TransCommitted, "committed"))
            }
            QueueCommand::Abort => {
                self.settle(&env, MessageState::TransAborted);
                Reply::Ack(Acknowledgement::for_envelope(&env, MessageState::TransAborted, "aborted"))
            }
            QueueCommand::AddQueue => Reply::Status(self.add_queue(&env)),
            QueueCommand::RemoveQueue => Reply::Status(self.remove_queue(&env.host)),
            QueueCommand::Exists => Reply::Status(self.exists(&env.host)),
        }
    }
}

enum Reply {
    Ack(Acknowledgement),
    Item(Option<Envelope>),
    Status((MessageState, String)),
}

fn encode<T: Serialize>(transform: TransformKind, value: &T) -> Option<Bytes> {
    match codec::encode_tagged(transform, value) {
        Ok(bytes) => Some(bytes),
        Err(_err) => {
            log_warn!("host: failed to encode reply: {_err}");
            None
        }
    }
}

#[async_trait::async_trait]
impl FrameHandler for MemoryQueueHost {
    async fn handle_frame(&self, frame: Bytes) -> Option<Bytes> {
        // ---
        let env = match codec::decode_envelope(&frame) {
            Ok(env) => env,
            Err(_err) => {
                log_warn!("host: dropping undecodable frame: {_err}");
                return None;
            }
        };

        log_debug!("host: {} on '{}' ({})", env.command, env.host, env.id());
        let expects_reply = env.expects_reply();
        let transform = env.transform;
        let (id, host) = (env.id().clone(), env.host.clone());

        let reply = self.dispatch(env).await;
        if !expects_reply {
            return None;
        }

        match reply {
            Reply::Ack(ack) => encode(transform, &ack),
            Reply::Item(Some(item)) => encode(transform, &item),
            Reply::Item(None) => Some(Bytes::new()),
            Reply::Status((state, label)) => {
                encode(transform, &Envelope::synthesized(id, host, state, label))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::DuplexMode;

    async fn call(host: &MemoryQueueHost, env: Envelope) -> Bytes {
        let frame = codec::encode_envelope(&env).unwrap();
        host.handle_frame(frame).await.unwrap_or_default()
    }

    fn item(body: &'static str, priority: Priority) -> Envelope {
        Envelope::new(body)
            .with_host("jobs")
            .with_command("Enqueue")
            .with_priority(priority)
    }

    #[tokio::test]
    async fn test_priority_order_then_fifo() {
        // ---
        let host = MemoryQueueHost::new();
        call(&host, item("a", Priority::Normal)).await;
        call(&host, item("b", Priority::High)).await;
        call(&host, item("c", Priority::Normal)).await;

        let mut bodies = Vec::new();
        for _ in 0..3 {
            let reply = call(&host, Envelope::empty().with_host("jobs").with_command("Dequeue")).await;
            let env = codec::decode_envelope(&reply).unwrap();
            bodies.push(env.body);
        }
        assert_eq!(bodies, vec!["b", "a", "c"]);
        assert!(host.is_empty("jobs"));
    }

    #[tokio::test]
    async fn test_empty_dequeue_replies_with_no_data() {
        // ---
        let host = MemoryQueueHost::new();
        let reply = call(&host, Envelope::empty().with_host("none").with_command("Dequeue")).await;
        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn test_one_way_gets_no_reply() {
        // ---
        let host = MemoryQueueHost::new();
        let frame = codec::encode_envelope(&item("x", Priority::Normal).with_duplex(DuplexMode::None)).unwrap();
        assert!(host.handle_frame(frame).await.is_none());
        assert_eq!(host.len("jobs"), 1);
    }

    #[tokio::test]
    async fn test_unknown_command_fails_and_report_counts() {
        // ---
        let host = MemoryQueueHost::new();
        call(&host, item("x", Priority::Normal)).await;

        let reply = call(&host, Envelope::empty().with_host("jobs").with_command("Frobnicate")).await;
        let status = codec::decode_envelope(&reply).unwrap();
        assert_eq!(status.state, MessageState::OperationFailed);

        let reply = call(&host, Envelope::empty().with_host("jobs").with_command("ReportCount")).await;
        let status = codec::decode_envelope(&reply).unwrap();
        assert_eq!(status.state, MessageState::Arrived);
        assert_eq!(status.label, "1");
    }

    #[tokio::test]
    async fn test_transactional_abort_requeues_until_retry_budget() {
        // ---
        let host = MemoryQueueHost::new();
        let props = QueueProperties::new("tx").transactional(true).with_max_retry(2);
        let add = Envelope::from_value(&props, TransformKind::Json)
            .unwrap()
            .with_host("tx")
            .with_command("AddQueue");
        call(&host, add).await;

        call(&host, Envelope::new("job").with_host("tx").with_command("Enqueue")).await;

        for expected_retry in [0, 1, 2] {
            let reply = call(&host, Envelope::empty().with_host("tx").with_command("Dequeue")).await;
            let taken = codec::decode_envelope(&reply).unwrap();
            assert_eq!(taken.retry, expected_retry);

            let abort = taken.clone().with_command("Abort");
            call(&host, abort).await;
        }

        assert!(host.is_empty("tx"));
        assert_eq!(host.transactions().len(), 3);
    }

    #[tokio::test]
    async fn test_consume_wakes_on_arrival() {
        // ---
        let host = MemoryQueueHost::new();
        let waiter = {
            let host = host.clone();
            tokio::spawn(async move {
                let env = Envelope::empty()
                    .with_host("jobs")
                    .with_command("Consume")
                    .with_expiration(5);
                call(&host, env).await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        call(&host, item("late", Priority::Normal)).await;

        let reply = waiter.await.unwrap();
        assert_eq!(codec::decode_envelope(&reply).unwrap().body, "late");
    }
}
