//! Framed accept loops that put a [`FrameHandler`](crate::FrameHandler) behind a socket.
//!
//! Each accepted connection is served on its own task and may carry any
//! number of request frames; each request gets at most one reply frame, in
//! order. When the handler returns `None` nothing is written.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::transport::framing;
use crate::transport::FrameHandlerPtr;
use crate::{log_debug, log_warn};

/// Serve `handler` on every connection accepted by `listener`.
///
/// Runs until the returned task is aborted.
pub fn serve_tcp(listener: TcpListener, handler: FrameHandlerPtr) -> JoinHandle<()> {
    // ---
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _peer)) => {
                    log_debug!("host: accepted tcp connection from {_peer}");
                    let _ = stream.set_nodelay(true);
                    tokio::spawn(serve_connection(stream, handler.clone()));
                }
                Err(_err) => {
                    log_warn!("host: tcp accept failed: {_err}");
                }
            }
        }
    })
}

/// Serve `handler` on every connection accepted by a Unix-domain listener.
#[cfg(unix)]
pub fn serve_pipe(listener: tokio::net::UnixListener, handler: FrameHandlerPtr) -> JoinHandle<()> {
    // ---
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    log_debug!("host: accepted pipe connection");
                    tokio::spawn(serve_connection(stream, handler.clone()));
                }
                Err(_err) => {
                    log_warn!("host: pipe accept failed: {_err}");
                }
            }
        }
    })
}

async fn serve_connection<S>(mut stream: S, handler: FrameHandlerPtr)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    // ---
    loop {
        let frame = match framing::read_request(&mut stream).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(_err) => {
                log_warn!("host: read failed: {_err}");
                return;
            }
        };

        let reply = handler.handle_frame(frame).await;

        if let Some(reply) = reply {
            if let Err(_err) = framing::write_frame(&mut stream, &reply).await {
                // One-way clients close right after writing.
                log_debug!("host: reply not delivered: {_err}");
                return;
            }
        }
    }
}
