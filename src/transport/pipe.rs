//! Local inter-process pipe transport.
//!
//! On Unix the endpoint address is a Unix-domain socket path. On Windows it
//! is a named pipe; a bare name is expanded to `\\.\pipe\<name>`. Framing is
//! identical to the TCP transport.

use std::sync::Arc;

use bytes::Bytes;
use tokio::time::timeout;

use super::framing;
use crate::{log_trace, Endpoint, QueueError, Result, Timeouts, Transport, TransportPtr};

#[cfg(unix)]
type PipeStream = tokio::net::UnixStream;

#[cfg(windows)]
type PipeStream = tokio::net::windows::named_pipe::NamedPipeClient;

struct PipeTransport;

impl PipeTransport {
    #[cfg(unix)]
    async fn connect(endpoint: &Endpoint, timeouts: Timeouts) -> Result<PipeStream> {
        // ---
        let path = endpoint.address.as_ref();
        timeout(timeouts.connect, tokio::net::UnixStream::connect(path))
            .await
            .map_err(|_| QueueError::Timeout("connect"))?
            .map_err(QueueError::from_connect)
    }

    #[cfg(windows)]
    async fn connect(endpoint: &Endpoint, timeouts: Timeouts) -> Result<PipeStream> {
        // ---
        use std::time::Duration;
        use tokio::net::windows::named_pipe::ClientOptions;

        // ERROR_PIPE_BUSY
        const PIPE_BUSY: i32 = 231;

        let name = pipe_name(&endpoint.address);
        timeout(timeouts.connect, async {
            loop {
                match ClientOptions::new().open(&name) {
                    Ok(client) => return Ok(client),
                    Err(err) if err.raw_os_error() == Some(PIPE_BUSY) => {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                    }
                    Err(err) => return Err(QueueError::from_connect(err)),
                }
            }
        })
        .await
        .map_err(|_| QueueError::Timeout("connect"))?
    }
}

/// Full pipe path for a configured address.
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn pipe_name(address: &str) -> String {
    if address.starts_with(r"\\") {
        address.to_string()
    } else {
        format!(r"\\.\pipe\{address}")
    }
}

#[async_trait::async_trait]
impl Transport for PipeTransport {
    // ---
    fn name(&self) -> &'static str {
        "pipe"
    }

    async fn send_one_way(&self, endpoint: &Endpoint, frame: Bytes, timeouts: Timeouts) -> Result<()> {
        // ---
        let mut stream = Self::connect(endpoint, timeouts).await?;
        log_trace!("pipe: one-way {} bytes to {endpoint}", frame.len());
        framing::deliver(&mut stream, &frame, timeouts.read).await
    }

    async fn send_duplex(&self, endpoint: &Endpoint, frame: Bytes, timeouts: Timeouts) -> Result<Bytes> {
        // ---
        let mut stream = Self::connect(endpoint, timeouts).await?;
        log_trace!("pipe: duplex {} bytes to {endpoint}", frame.len());
        framing::exchange(&mut stream, &frame, timeouts.read).await
    }
}

/// Create the local pipe transport.
pub fn create_pipe_transport() -> TransportPtr {
    Arc::new(PipeTransport)
}
