//! Client-side receive loop.
//!
//! Receiving is polling, not server push: [`poll_dequeue`] calls `Dequeue`,
//! sleeps [`RECEIVE_POLL_INTERVAL`], and repeats until an item arrives, the
//! overall timeout elapses, or the token is cancelled.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use super::QueueClient;
use crate::{log_trace, Envelope, QueueError, Result};

/// Pause between two `Dequeue` attempts.
pub const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poll `Dequeue` until an item arrives or `timeout` elapses.
///
/// Each attempt is bounded by the time left. A cancelled token ends the
/// loop with `Ok(None)` at the next checkpoint.
pub(crate) async fn poll_dequeue(
    client: &QueueClient,
    timeout: Duration,
    token: &CancellationToken,
) -> Result<Option<Envelope>> {
    // ---
    let deadline = Instant::now() + timeout;
    let mut attempts: u32 = 0;

    loop {
        if token.is_cancelled() {
            return Ok(None);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            log_trace!("receive gave up after {attempts} attempts");
            return Ok(None);
        }

        attempts += 1;
        if let Some(env) = client.dequeue_with_timeout(remaining).await? {
            return Ok(Some(env));
        }

        let pause = RECEIVE_POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now()));
        tokio::select! {
            _ = token.cancelled() => return Ok(None),
            _ = sleep(pause) => {}
        }
    }
}

/// A receive running in the background.
///
/// Obtained from [`QueueClient::begin_receive`]. Dropping the handle
/// cancels the loop.
#[derive(Debug)]
pub struct ReceiveHandle {
    token: CancellationToken,
    task: Option<JoinHandle<Result<Option<Envelope>>>>,
}

impl ReceiveHandle {
    pub(crate) fn spawn(client: QueueClient, timeout: Duration) -> Self {
        // ---
        let token = CancellationToken::new();
        let child = token.child_token();
        let task = tokio::spawn(async move { poll_dequeue(&client, timeout, &child).await });

        Self {
            token,
            task: Some(task),
        }
    }

    /// Stop polling at the next checkpoint. A `Dequeue` already in flight
    /// completes first.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the receive to finish.
    ///
    /// `Ok(None)` when the timeout elapsed or the receive was cancelled.
    pub async fn end_receive(mut self) -> Result<Option<Envelope>> {
        // ---
        let Some(task) = self.task.take() else {
            return Ok(None);
        };

        match task.await {
            Ok(result) => result,
            Err(err) => Err(QueueError::Remote(format!("receive task failed: {err}"))),
        }
    }
}

impl Drop for ReceiveHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
