//! Transport-agnostic duplex dispatch.
//!
//! The [`Dispatcher`] turns an [`Envelope`] into exactly one of four shapes
//! of I/O against the transport selected by the channel's [`Protocol`]:
//!
//! | shape                       | method                                   |
//! |-----------------------------|------------------------------------------|
//! | fire-and-forget             | [`send_one_way`](Dispatcher::send_one_way) |
//! | blocking duplex             | [`send_duplex`](Dispatcher::send_duplex)   |
//! | callback duplex             | [`send_duplex_async`](Dispatcher::send_duplex_async) |
//! | bounded wait on background  | [`execute_and_wait`](Dispatcher::execute_and_wait), [`send_with_cancellation`](Dispatcher::send_with_cancellation) |
//!
//! ## Failure policy
//!
//! Every transport, codec, timeout and cancellation failure is reported to
//! the fault hook. With `enable_remote_exception` off (the default) the
//! caller then sees a neutral result: `Ok(())` or an empty
//! [`PayloadCarrier`]. With it on, the same failure is returned as `Err`.
//!
//! ## Cancellation
//!
//! Cancellation is cooperative. [`send_with_cancellation`](Dispatcher::send_with_cancellation)
//! checks the token before the transport call is issued and races it
//! against the reply afterwards. Observing it once the call has started
//! stops the *wait*; the transport call keeps running until it completes or
//! hits its own read bound, and its result is discarded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::transport::TransportTable;
use crate::{
    codec, log_debug, log_error, log_info, log_warn, ChannelSettings, Endpoint, Envelope,
    PayloadCarrier, QueueError, Result, Timeouts, TransportPtr, WaitPolicy,
};

/// Observer for failures the dispatcher absorbs.
pub type FaultHook = Arc<dyn Fn(&QueueError) + Send + Sync>;

type ReplyReceiver = oneshot::Receiver<Result<PayloadCarrier>>;

/// Routes envelopes to the configured transport.
///
/// Cloning is cheap: settings, transports and the fault hook are shared.
/// A dispatcher holds no per-call state, so any number of calls may run
/// concurrently on clones of one instance.
#[derive(Clone)]
pub struct Dispatcher {
    settings: Arc<ChannelSettings>,
    transports: TransportTable,
    on_fault: FaultHook,
}

impl Dispatcher {
    // ---
    /// Dispatcher over the default network transports.
    pub fn new(settings: ChannelSettings) -> Self {
        Self::with_transports(settings, TransportTable::default())
    }

    /// Dispatcher over an explicit transport table.
    pub fn with_transports(settings: ChannelSettings, transports: TransportTable) -> Self {
        Self {
            settings: Arc::new(settings),
            transports,
            on_fault: Arc::new(log_fault),
        }
    }

    /// Replace the fault hook. The default logs through `tracing`.
    pub fn with_fault_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&QueueError) + Send + Sync + 'static,
    {
        self.on_fault = Arc::new(hook);
        self
    }

    pub fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    /// Mutable settings for this dispatcher.
    ///
    /// Clones the settings first if other dispatchers share them, so tuning
    /// one client never affects another.
    pub fn settings_mut(&mut self) -> &mut ChannelSettings {
        Arc::make_mut(&mut self.settings)
    }

    fn transport(&self) -> &TransportPtr {
        self.transports.get(self.settings.protocol())
    }

    fn endpoint(&self) -> Endpoint {
        self.settings.endpoint()
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::new(self.settings.connect_timeout(), self.settings.read_timeout())
    }

    /// Report `err` to the fault hook.
    pub(crate) fn fault(&self, err: &QueueError) {
        (self.on_fault)(err);
    }

    /// Report `err`, then either return it or substitute `fallback`.
    pub(crate) fn surface<T>(&self, err: QueueError, fallback: T) -> Result<T> {
        // ---
        self.fault(&err);
        if self.settings.enable_remote_exception() {
            Err(err)
        } else {
            Ok(fallback)
        }
    }

    // --- one-way

    /// Encode and transmit `env` without reading any reply.
    pub async fn send_one_way(&self, env: &Envelope) -> Result<()> {
        // ---
        match self.deliver(env).await {
            Ok(()) => Ok(()),
            Err(err) => self.surface(err, ()),
        }
    }

    /// One-way send that reports the raw outcome instead of applying the
    /// failure policy.
    pub(crate) async fn deliver(&self, env: &Envelope) -> Result<()> {
        // ---
        let transport = self.transport();
        let endpoint = self.endpoint();
        log_debug!(
            "{} one-way {} ({}) to {endpoint}",
            transport.name(),
            env.command,
            env.id()
        );

        let frame = codec::encode_envelope(env)?;
        transport
            .send_one_way(&endpoint, frame, self.default_timeouts())
            .await
    }

    // --- blocking duplex

    /// Transmit `env` and wait for the reply.
    ///
    /// Connection failures are retried up to `max_retry` attempts. Any other
    /// failure, or the last connection failure, yields an empty carrier
    /// (or `Err` when remote exceptions are enabled).
    pub async fn send_duplex(
        &self,
        env: &Envelope,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<PayloadCarrier> {
        // ---
        let timeouts = Timeouts::new(connect_timeout, read_timeout);

        match self.duplex_with_retry(env, timeouts, None).await {
            Ok(reply) => Ok(PayloadCarrier::from_wire(reply)),
            Err(err) => self.surface(err, PayloadCarrier::empty()),
        }
    }

    /// [`send_duplex`](Self::send_duplex) that gives up at `deadline`.
    ///
    /// Attempts and retry backoff together never run past the deadline;
    /// each attempt's connect and read bounds are clamped to the time left.
    pub async fn send_duplex_until(
        &self,
        env: &Envelope,
        connect_timeout: Duration,
        read_timeout: Duration,
        deadline: Instant,
    ) -> Result<PayloadCarrier> {
        // ---
        let timeouts = Timeouts::new(connect_timeout, read_timeout);

        match self.duplex_with_retry(env, timeouts, Some(deadline)).await {
            Ok(reply) => Ok(PayloadCarrier::from_wire(reply)),
            Err(err) => self.surface(err, PayloadCarrier::empty()),
        }
    }

    async fn duplex_with_retry(
        &self,
        env: &Envelope,
        timeouts: Timeouts,
        deadline: Option<Instant>,
    ) -> Result<bytes::Bytes> {
        // ---
        let transport = self.transport().clone();
        let endpoint = self.endpoint();
        let policy = RetryPolicy::from_settings(&self.settings);

        log_debug!(
            "{} duplex {} ({}) to {endpoint}",
            transport.name(),
            env.command,
            env.id()
        );

        retry_with_backoff(&policy, deadline, |attempt| {
            let transport = transport.clone();
            let endpoint = endpoint.clone();
            let mut env = env.clone();
            env.retry = attempt;

            async move {
                let frame = codec::encode_envelope(&env)?;
                let Some(deadline) = deadline else {
                    return transport.send_duplex(&endpoint, frame, timeouts).await;
                };

                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Err(QueueError::Timeout("read"));
                }
                let bounded = Timeouts::new(timeouts.connect.min(left), timeouts.read.min(left));
                timeout_at(deadline, transport.send_duplex(&endpoint, frame, bounded))
                    .await
                    .map_err(|_| QueueError::Timeout("read"))?
            }
        })
        .await
    }

    // --- callback duplex

    /// Dispatch `env` in the background and hand the result to `on_completed`
    /// exactly once.
    ///
    /// With `is_channel_async` the transport's own asynchronous primitive is
    /// used (a single attempt, no retry); otherwise [`send_duplex`](Self::send_duplex)
    /// runs on a spawned task. `read_timeout` defaults to the channel's.
    ///
    /// The completion runs on whichever task finishes the call. It receives
    /// `Ok(empty)` on failure unless remote exceptions are enabled.
    pub fn send_duplex_async<F>(
        &self,
        env: Envelope,
        connect_timeout: Duration,
        read_timeout: Option<Duration>,
        on_completed: F,
        is_channel_async: bool,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Result<PayloadCarrier>) + Send + 'static,
    {
        // ---
        let read_timeout = read_timeout.unwrap_or_else(|| self.settings.read_timeout());
        let this = self.clone();

        if !is_channel_async {
            return tokio::spawn(async move {
                let result = this.send_duplex(&env, connect_timeout, read_timeout).await;
                on_completed(result);
            });
        }

        let mut env = env;
        env.retry = 1;
        let frame = match codec::encode_envelope(&env) {
            Ok(frame) => frame,
            Err(err) => {
                let result = this.surface(err, PayloadCarrier::empty());
                return tokio::spawn(async move { on_completed(result) });
            }
        };

        let transport = this.transport().clone();
        let endpoint = this.endpoint();
        let timeouts = Timeouts::new(connect_timeout, read_timeout);

        transport.send_duplex_async(
            endpoint,
            frame,
            timeouts,
            Box::new(move |result| {
                let result = match result {
                    Ok(reply) => Ok(PayloadCarrier::from_wire(reply)),
                    Err(err) => this.surface(err, PayloadCarrier::empty()),
                };
                on_completed(result);
            }),
        )
    }

    // --- bounded wait

    /// Run the callback duplex path and wait at most `wait_timeout` for it.
    ///
    /// When the bound elapses the caller gets an empty carrier (or
    /// `Err(Timeout("wait"))`), and the background call is handled according
    /// to the channel's [`WaitPolicy`].
    pub async fn execute_and_wait(
        &self,
        env: Envelope,
        connect_timeout: Duration,
        read_timeout: Option<Duration>,
    ) -> Result<PayloadCarrier> {
        // ---
        let (handle, mut rx) = self.spawn_with_reply(env, connect_timeout, read_timeout);

        tokio::select! {
            reply = &mut rx => self.take_reply(reply),
            _ = sleep(self.settings.wait_timeout()) => {
                self.release(handle, rx, self.settings.wait_policy());
                self.surface(QueueError::Timeout("wait"), PayloadCarrier::empty())
            }
        }
    }

    /// [`execute_and_wait`](Self::execute_and_wait) with an explicit token.
    ///
    /// Cancelling `token` stops the wait and aborts the background call. If
    /// the wait bound elapses first the token is cancelled and the call
    /// aborted, whatever the channel's [`WaitPolicy`].
    pub async fn execute_and_wait_with_cancel(
        &self,
        env: Envelope,
        connect_timeout: Duration,
        read_timeout: Option<Duration>,
        token: &CancellationToken,
    ) -> Result<PayloadCarrier> {
        // ---
        if token.is_cancelled() {
            return self.surface(QueueError::Cancelled, PayloadCarrier::empty());
        }

        let (handle, mut rx) = self.spawn_with_reply(env, connect_timeout, read_timeout);

        tokio::select! {
            biased;

            _ = token.cancelled() => {
                handle.abort();
                self.surface(QueueError::Cancelled, PayloadCarrier::empty())
            }
            reply = &mut rx => self.take_reply(reply),
            _ = sleep(self.settings.wait_timeout()) => {
                token.cancel();
                self.release(handle, rx, WaitPolicy::Abort);
                self.surface(QueueError::Timeout("wait"), PayloadCarrier::empty())
            }
        }
    }

    /// Dispatch `env` on a background task and wait for its reply, its
    /// cancellation or `wait_timeout`, whichever comes first.
    ///
    /// - `token` cancelled before the transport call is issued: `on_fault`
    ///   receives [`QueueError::Cancelled`] and no I/O happens.
    /// - `token` cancelled while the call is in flight: `on_fault` receives
    ///   `Cancelled` and the wait ends. The call itself is **not** aborted;
    ///   it runs to completion and its result is discarded.
    /// - `wait_timeout` elapses: `on_fault` receives `Timeout("wait")` and
    ///   the call is handled per the channel's [`WaitPolicy`].
    /// - otherwise `on_completed` receives the carrier.
    ///
    /// Exactly one of the two callbacks runs. Cancellation wins over a reply
    /// that arrives at the same time.
    pub fn send_with_cancellation<E, C>(
        &self,
        env: Envelope,
        on_fault: E,
        on_completed: C,
        token: CancellationToken,
    ) -> JoinHandle<()>
    where
        E: FnOnce(QueueError) + Send + 'static,
        C: FnOnce(PayloadCarrier) + Send + 'static,
    {
        // ---
        let this = self.clone();

        tokio::spawn(async move {
            // Let a cancel issued right after scheduling land first.
            tokio::task::yield_now().await;

            if token.is_cancelled() {
                log_debug!("cancelled before start: {}", env.id());
                on_fault(QueueError::Cancelled);
                return;
            }

            match this.wait_or_cancel(env, &token).await {
                Ok(_) if token.is_cancelled() => on_fault(QueueError::Cancelled),
                Ok(carrier) => on_completed(carrier),
                Err(err) => on_fault(err),
            }
        })
    }

    async fn wait_or_cancel(&self, env: Envelope, token: &CancellationToken) -> Result<PayloadCarrier> {
        // ---
        let (handle, mut rx) = self.spawn_gated(env, token.clone());

        tokio::select! {
            biased;

            _ = token.cancelled() => {
                // The in-flight call keeps running; only the wait ends.
                log_debug!("cancellation observed, leaving in-flight call to finish");
                drop(handle);
                Err(QueueError::Cancelled)
            }
            reply = &mut rx => match reply {
                Ok(result) => result,
                Err(_) => Err(QueueError::Remote("dispatch task ended without a result".into())),
            },
            _ = sleep(self.settings.wait_timeout()) => {
                self.release(handle, rx, self.settings.wait_policy());
                Err(QueueError::Timeout("wait"))
            }
        }
    }

    // --- helpers

    fn spawn_with_reply(
        &self,
        env: Envelope,
        connect_timeout: Duration,
        read_timeout: Option<Duration>,
    ) -> (JoinHandle<()>, ReplyReceiver) {
        // ---
        let (tx, rx) = oneshot::channel();
        let handle = self.send_duplex_async(
            env,
            connect_timeout,
            read_timeout,
            move |reply| {
                let _ = tx.send(reply);
            },
            self.settings.is_async(),
        );
        (handle, rx)
    }

    /// Like [`spawn_with_reply`](Self::spawn_with_reply), but the task
    /// issues nothing if `gate` is cancelled by the time it runs. Aborting
    /// the returned handle also aborts the transport call it started.
    fn spawn_gated(&self, env: Envelope, gate: CancellationToken) -> (JoinHandle<()>, ReplyReceiver) {
        // ---
        let (tx, rx) = oneshot::channel();
        let this = self.clone();
        let connect_timeout = self.settings.connect_timeout();
        let is_async = self.settings.is_async();

        let handle = tokio::spawn(async move {
            if gate.is_cancelled() {
                log_debug!("cancelled before dispatch: {}", env.id());
                return;
            }

            let call = this.send_duplex_async(
                env,
                connect_timeout,
                None,
                move |reply| {
                    let _ = tx.send(reply);
                },
                is_async,
            );
            let mut call = AbortOnDrop(call);
            let _ = (&mut call.0).await;
        });
        (handle, rx)
    }

    fn take_reply(
        &self,
        reply: std::result::Result<Result<PayloadCarrier>, oneshot::error::RecvError>,
    ) -> Result<PayloadCarrier> {
        // ---
        match reply {
            Ok(result) => result,
            Err(_) => self.surface(
                QueueError::Remote("dispatch task ended without a result".into()),
                PayloadCarrier::empty(),
            ),
        }
    }

    /// Decide the fate of a background call the caller stopped waiting for.
    fn release(&self, handle: JoinHandle<()>, rx: ReplyReceiver, policy: WaitPolicy) {
        // ---
        match policy {
            WaitPolicy::Abandon => {
                log_debug!("wait elapsed, abandoning background call");
                drop(handle);
            }
            WaitPolicy::Observe => {
                tokio::spawn(async move {
                    match rx.await {
                        Ok(Ok(_carrier)) => {
                            log_info!("late reply arrived, {} bytes", _carrier.len());
                        }
                        Ok(Err(_err)) => log_warn!("late call failed: {_err}"),
                        Err(_) => log_warn!("late call ended without a result"),
                    }
                });
            }
            WaitPolicy::Abort => {
                log_debug!("wait elapsed, aborting background call");
                handle.abort();
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("settings", &self.settings)
            .field("transports", &self.transports)
            .finish_non_exhaustive()
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn log_fault(err: &QueueError) {
    log_error!("dispatch fault: {err}");
}
