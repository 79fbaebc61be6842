//! TCP transport.
//!
//! One connection per call. Requests and replies are length-prefixed frames
//! (see [`framing`](super::framing)). Correlation is by connection: the
//! reply read on a socket belongs to the request written on it.

use std::sync::Arc;

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::framing;
use crate::{log_trace, Endpoint, QueueError, Result, Timeouts, Transport, TransportPtr};

struct TcpTransport;

impl TcpTransport {
    async fn connect(endpoint: &Endpoint, timeouts: Timeouts) -> Result<TcpStream> {
        // ---
        let addr = endpoint.socket_addr();
        let stream = timeout(timeouts.connect, TcpStream::connect(&addr))
            .await
            .map_err(|_| QueueError::Timeout("connect"))?
            .map_err(QueueError::from_connect)?;

        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    // ---
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn send_one_way(&self, endpoint: &Endpoint, frame: Bytes, timeouts: Timeouts) -> Result<()> {
        // ---
        let mut stream = Self::connect(endpoint, timeouts).await?;
        log_trace!("tcp: one-way {} bytes to {endpoint}", frame.len());
        framing::deliver(&mut stream, &frame, timeouts.read).await
    }

    async fn send_duplex(&self, endpoint: &Endpoint, frame: Bytes, timeouts: Timeouts) -> Result<Bytes> {
        // ---
        let mut stream = Self::connect(endpoint, timeouts).await?;
        log_trace!("tcp: duplex {} bytes to {endpoint}", frame.len());
        framing::exchange(&mut stream, &frame, timeouts.read).await
    }
}

/// Create the TCP transport.
pub fn create_tcp_transport() -> TransportPtr {
    Arc::new(TcpTransport)
}
