//! Queue-domain operations over the [`Dispatcher`].
//!
//! [`QueueClient`] owns command naming, host defaulting and response
//! typing. Every verb builds a fresh [`Envelope`], so concurrent calls on
//! one client never share per-call state.
//!
//! # Results under the default failure policy
//!
//! | verb                        | on transport failure / no reply         |
//! |-----------------------------|-----------------------------------------|
//! | `enqueue` (Respond)         | `UnexpectedError` acknowledgement       |
//! | `enqueue` (None)            | `OperationFailed` acknowledgement       |
//! | `dequeue`, `peek`, `consume`| `None`                                  |
//! | `commit`, `abort`           | `Ok(())`, failure goes to the fault hook |
//! | `report` and management     | `UnexpectedError` envelope              |
//!
//! With `enable_remote_exception` set each of these returns `Err` instead.

mod command;
mod properties;
mod receive;

pub use command::QueueCommand;
pub use properties::QueueProperties;
pub use receive::{ReceiveHandle, RECEIVE_POLL_INTERVAL};

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    log_debug, Acknowledgement, ChannelSettings, Dispatcher, DuplexMode, Envelope, MessageState,
    PayloadCarrier, Priority, QueueError, Result, TransformKind,
};

/// Connect bound used by `Consume`. The server owns the wait, so the client
/// only needs a bound that never fires first.
pub const CONSUME_CONNECT_CEILING: Duration = Duration::from_secs(24 * 60 * 60);

/// Typed client for one remote queue.
///
/// # Example
///
/// ```no_run
/// use duplex_queue::{ChannelSettings, Envelope, MessageState, Protocol, QueueClient};
///
/// # async fn example() -> duplex_queue::Result<()> {
/// let client = QueueClient::new(
///     ChannelSettings::new("orders").with_protocol(Protocol::Tcp).with_address("10.0.0.7", 15000),
/// );
///
/// let ack = client.enqueue(Envelope::new("order #1")).await?;
/// assert_eq!(ack.state, MessageState::Arrived);
///
/// if let Some(item) = client.dequeue().await? {
///     client.commit(&item).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct QueueClient {
    dispatcher: Dispatcher,
    transform: TransformKind,
}

impl QueueClient {
    // ---
    /// Client over the default network transports.
    pub fn new(settings: ChannelSettings) -> Self {
        Self::with_dispatcher(Dispatcher::new(settings))
    }

    pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            transform: TransformKind::default(),
        }
    }

    /// Encoding used for envelopes this client creates itself (dequeue
    /// requests, management bodies). Caller-built envelopes keep their own.
    pub fn with_transform(mut self, transform: TransformKind) -> Self {
        self.transform = transform;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn settings(&self) -> &ChannelSettings {
        self.dispatcher.settings()
    }

    /// Tune this client. Set timeouts before sharing the client across
    /// tasks; clones taken earlier keep the old values.
    pub fn settings_mut(&mut self) -> &mut ChannelSettings {
        self.dispatcher.settings_mut()
    }

    /// Logical queue name used when an envelope carries no host.
    pub fn host_name(&self) -> &str {
        self.settings().host_name()
    }

    // --- envelope preparation

    fn prepare(&self, mut env: Envelope, command: &str) -> Envelope {
        if env.host.is_empty() {
            env.host = self.host_name().to_string();
        }
        env.command = command.to_string();
        env
    }

    fn request(&self, command: QueueCommand) -> Envelope {
        self.prepare(
            Envelope::empty()
                .with_transform(self.transform)
                .with_duplex(DuplexMode::Respond),
            command.as_str(),
        )
    }

    /// Connect and read bounds for a call limited to `timeout`.
    fn bounded(&self, timeout: Option<Duration>) -> (Duration, Duration) {
        let settings = self.settings();
        match timeout {
            Some(timeout) if !timeout.is_zero() => (settings.connect_timeout().min(timeout), timeout),
            _ => (settings.connect_timeout(), settings.read_timeout()),
        }
    }

    /// One duplex call. A nonzero `timeout` is an overall deadline: retries and their backoff
    /// never run past it.
    async fn duplex(&self, env: Envelope, timeout: Option<Duration>) -> Result<PayloadCarrier> {
        // ---
        let (connect, read) = self.bounded(timeout);
        let deadline = timeout
            .filter(|timeout| !timeout.is_zero())
            .map(|timeout| Instant::now() + timeout);

        match (self.settings().is_async(), deadline) {
            (true, Some(deadline)) => {
                let waited = self.dispatcher.execute_and_wait(env, connect, Some(read));
                match timeout_at(deadline, waited).await {
                    Ok(result) => result,
                    Err(_) => self
                        .dispatcher
                        .surface(QueueError::Timeout("read"), PayloadCarrier::empty()),
                }
            }
            (true, None) => self.dispatcher.execute_and_wait(env, connect, Some(read)).await,
            (false, Some(deadline)) => {
                self.dispatcher
                    .send_duplex_until(&env, connect, read, deadline)
                    .await
            }
            (false, None) => self.dispatcher.send_duplex(&env, connect, read).await,
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, carrier: PayloadCarrier) -> Result<Option<T>> {
        match carrier.try_decode() {
            Ok(value) => Ok(value),
            Err(err) => self.dispatcher.surface(err, None),
        }
    }

    // --- enqueue

    /// Enqueue `env` with the channel's default bounds.
    pub async fn enqueue(&self, env: Envelope) -> Result<Acknowledgement> {
        self.enqueue_with_timeout(env, None).await
    }

    /// Enqueue `env`, bounding the call by `timeout` when given.
    ///
    /// A `Respond` envelope is sent duplex and the server's acknowledgement
    /// returned; no reply yields `UnexpectedError`. A `None` envelope is
    /// sent one-way and acknowledged locally: `Arrived` once the transport
    /// accepted it, `OperationFailed` otherwise.
    pub async fn enqueue_with_timeout(
        &self,
        env: Envelope,
        timeout: Option<Duration>,
    ) -> Result<Acknowledgement> {
        // ---
        let mut env = self.prepare(env, QueueCommand::Enqueue.as_str());
        env.state = MessageState::Sending;

        if !env.expects_reply() {
            return match self.dispatcher.deliver(&env).await {
                Ok(()) => Ok(Acknowledgement::for_envelope(&env, MessageState::Arrived, "delivered")),
                Err(err) => {
                    let ack = Acknowledgement::for_envelope(&env, failure_state(&err), err.to_string());
                    self.dispatcher.surface(err, ack)
                }
            };
        }

        let carrier = self.duplex(env.clone(), timeout).await?;
        if carrier.is_empty() {
            return Ok(Acknowledgement::for_envelope(
                &env,
                MessageState::UnexpectedError,
                "no reply from queue host",
            ));
        }

        Ok(self.decode::<Acknowledgement>(carrier)?.unwrap_or_else(|| {
            Acknowledgement::for_envelope(&env, MessageState::UnexpectedError, "undecodable reply")
        }))
    }

    // --- reads

    /// Take the next item, or `None` if the queue is empty or unreachable.
    pub async fn dequeue(&self) -> Result<Option<Envelope>> {
        self.dequeue_with_timeout(Duration::ZERO).await
    }

    /// [`dequeue`](Self::dequeue) bounded by `timeout`. Zero means the
    /// channel's bounds.
    pub async fn dequeue_with_timeout(&self, timeout: Duration) -> Result<Option<Envelope>> {
        // ---
        let env = self.request(QueueCommand::Dequeue);
        let carrier = self.duplex(env, Some(timeout)).await?;
        self.decode(carrier)
    }

    /// Take the next item with exactly `priority`.
    pub async fn dequeue_priority(&self, priority: Priority) -> Result<Option<Envelope>> {
        // ---
        let env = self.request(QueueCommand::DequeuePriority).with_priority(priority);
        let carrier = self.duplex(env, None).await?;
        self.decode(carrier)
    }

    /// Read the next item without removing it.
    pub async fn peek(&self) -> Result<Option<Envelope>> {
        self.peek_with_timeout(Duration::ZERO).await
    }

    pub async fn peek_with_timeout(&self, timeout: Duration) -> Result<Option<Envelope>> {
        // ---
        let env = self.request(QueueCommand::Peek);
        let carrier = self.duplex(env, Some(timeout)).await?;
        self.decode(carrier)
    }

    /// Long-poll: the server holds the request up to `max_wait_secs` until
    /// an item arrives.
    ///
    /// One duplex call, never a client-side loop, and never routed through
    /// the bounded-wait path. The read bound is stretched to outlast the
    /// server's hold; `0` leaves the hold to the server and the read bound
    /// at the channel's.
    pub async fn consume(&self, max_wait_secs: u32) -> Result<Option<Envelope>> {
        // ---
        let env = self
            .request(QueueCommand::Consume)
            .with_expiration(max_wait_secs);

        let read = consume_read_bound(self.settings().read_timeout(), max_wait_secs);
        let carrier = self
            .dispatcher
            .send_duplex(&env, CONSUME_CONNECT_CEILING, read)
            .await?;
        self.decode(carrier)
    }

    // --- transactions

    /// Tell the server `item` was processed. One-way.
    pub async fn commit(&self, item: &Envelope) -> Result<()> {
        self.settle(item, QueueCommand::Commit, MessageState::TransCommitted)
            .await
    }

    /// Tell the server `item` was not processed. One-way.
    pub async fn abort(&self, item: &Envelope) -> Result<()> {
        self.settle(item, QueueCommand::Abort, MessageState::TransAborted)
            .await
    }

    async fn settle(&self, item: &Envelope, command: QueueCommand, state: MessageState) -> Result<()> {
        // ---
        let mut env = self.prepare(item.clone(), command.as_str());
        env.state = state;
        env.duplex = DuplexMode::None;
        env.body = bytes::Bytes::new();

        log_debug!("{} {} on '{}'", command, env.id(), env.host);
        self.dispatcher.send_one_way(&env).await
    }

    // --- reporting and management

    /// Duplex call with a caller-chosen command tag. Never `None`: no reply
    /// is reported as an `UnexpectedError` envelope.
    pub async fn report(&self, command: &str, host: &str) -> Result<Envelope> {
        // ---
        let mut env = Envelope::empty()
            .with_transform(self.transform)
            .with_duplex(DuplexMode::Respond)
            .with_host(host);
        env = self.prepare(env, command);
        self.management(env).await
    }

    /// Create the queue described by `properties`.
    pub async fn add_queue(&self, properties: &QueueProperties) -> Result<Envelope> {
        // ---
        let mut env = self.request(QueueCommand::AddQueue);
        if !properties.queue_name.is_empty() {
            env.host = properties.queue_name.clone();
        }
        if let Err(err) = env.set_body_value(properties) {
            let failed = Envelope::synthesized(
                env.id().clone(),
                env.host.clone(),
                MessageState::OperationFailed,
                err.to_string(),
            );
            return self.dispatcher.surface(err, failed);
        }
        self.management(env).await
    }

    /// Remove this client's queue.
    pub async fn remove_queue(&self) -> Result<Envelope> {
        self.management(self.request(QueueCommand::RemoveQueue)).await
    }

    /// Ask whether this client's queue exists. The reply state is `Arrived`
    /// if it does and `QueueNotFound` if not.
    pub async fn queue_exists(&self) -> Result<Envelope> {
        self.management(self.request(QueueCommand::Exists)).await
    }

    async fn management(&self, env: Envelope) -> Result<Envelope> {
        // ---
        let carrier = self.duplex(env.clone(), None).await?;
        let label = if carrier.is_empty() {
            "no reply from queue host"
        } else {
            match self.decode::<Envelope>(carrier)? {
                Some(reply) => return Ok(reply),
                None => "undecodable reply",
            }
        };

        Ok(Envelope::synthesized(
            env.id().clone(),
            env.host,
            MessageState::UnexpectedError,
            label,
        ))
    }

    // --- receive

    /// Poll `Dequeue` every [`RECEIVE_POLL_INTERVAL`] until an item arrives
    /// or `timeout` elapses.
    pub async fn receive(&self, timeout: Duration) -> Result<Option<Envelope>> {
        receive::poll_dequeue(self, timeout, &CancellationToken::new()).await
    }

    /// Start [`receive`](Self::receive) in the background.
    pub fn begin_receive(&self, timeout: Duration) -> ReceiveHandle {
        ReceiveHandle::spawn(self.clone(), timeout)
    }

    /// Run [`receive`](Self::receive) in the background and hand its result
    /// to `on_received` exactly once.
    pub fn receive_with_callback<F>(&self, timeout: Duration, on_received: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<Option<Envelope>>) + Send + 'static,
    {
        let client = self.clone();
        tokio::spawn(async move {
            let result = client.receive(timeout).await;
            on_received(result);
        })
    }
}

fn consume_read_bound(read_timeout: Duration, max_wait_secs: u32) -> Duration {
    if max_wait_secs == 0 {
        read_timeout
    } else {
        read_timeout.max(Duration::from_secs(u64::from(max_wait_secs) + 1))
    }
}

fn failure_state(err: &QueueError) -> MessageState {
    match err {
        QueueError::Cancelled => MessageState::OperationCanceled,
        _ => MessageState::OperationFailed,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_consume_read_bound_outlasts_hold() {
        // ---
        let read = Duration::from_secs(3);
        assert_eq!(consume_read_bound(read, 0), read);
        assert_eq!(consume_read_bound(read, 1), read);
        assert_eq!(consume_read_bound(read, 10), Duration::from_secs(11));
    }

    #[test]
    fn test_host_defaulting() {
        // ---
        let client = QueueClient::new(ChannelSettings::new("jobs"));

        let defaulted = client.prepare(Envelope::new("x"), "Enqueue");
        assert_eq!(defaulted.host, "jobs");
        assert_eq!(defaulted.command, "Enqueue");

        let explicit = client.prepare(Envelope::new("x").with_host("other"), "Enqueue");
        assert_eq!(explicit.host, "other");
    }

    #[test]
    fn test_bounded_timeouts() {
        // ---
        let client = QueueClient::new(
            ChannelSettings::new("jobs")
                .with_connect_timeout(Duration::from_secs(5))
                .with_read_timeout(Duration::from_secs(60)),
        );

        let half_second = Duration::from_millis(500);
        assert_eq!(client.bounded(Some(half_second)), (half_second, half_second));
        assert_eq!(
            client.bounded(None),
            (Duration::from_secs(5), Duration::from_secs(60))
        );
        assert_eq!(client.bounded(Some(Duration::ZERO)), client.bounded(None));
    }

    #[test]
    fn test_failure_states() {
        // ---
        assert_eq!(failure_state(&QueueError::Cancelled), MessageState::OperationCanceled);
        assert_eq!(
            failure_state(&QueueError::Connection("refused".into())),
            MessageState::OperationFailed
        );
    }
}
