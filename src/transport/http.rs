//! HTTP transport.
//!
//! Each message is POSTed to the endpoint URL as an
//! `application/octet-stream` body. The response body is the reply.
//!
//! HTTP has no fire-and-forget form: a one-way send still completes the
//! request, so it waits for the response headers and only then discards
//! the body. Its latency is that of a duplex call.
//!
//! Built on `reqwest` when the `transport_http` feature is enabled. Without
//! it a stub is installed that fails every call with
//! [`QueueError::TransportUnavailable`](crate::QueueError::TransportUnavailable).

use std::sync::Arc;

use crate::TransportPtr;

#[cfg(feature = "transport_http")]
mod imp {
    // ---
    use bytes::Bytes;
    use reqwest::header::CONTENT_TYPE;

    use crate::{log_trace, Endpoint, QueueError, Result, Timeouts, Transport};

    pub(super) struct HttpTransport {
        client: reqwest::Client,
    }

    impl HttpTransport {
        pub(super) fn new() -> Self {
            Self {
                client: reqwest::Client::new(),
            }
        }

        async fn post(&self, endpoint: &Endpoint, frame: Bytes, timeouts: Timeouts) -> Result<Bytes> {
            // ---
            let url = endpoint.url();
            log_trace!("http: POST {} bytes to {url}", frame.len());

            let response = self
                .client
                .post(&url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .timeout(timeouts.connect.saturating_add(timeouts.read))
                .body(frame)
                .send()
                .await
                .map_err(map_error)?;

            let status = response.status();
            if !status.is_success() {
                return Err(QueueError::Remote(format!("{url} answered {status}")));
            }

            response.bytes().await.map_err(map_error)
        }
    }

    fn map_error(err: reqwest::Error) -> QueueError {
        // ---
        if err.is_connect() {
            QueueError::Connection(err.to_string())
        } else if err.is_timeout() {
            QueueError::Timeout("read")
        } else {
            QueueError::Remote(err.to_string())
        }
    }

    #[async_trait::async_trait]
    impl Transport for HttpTransport {
        // ---
        fn name(&self) -> &'static str {
            "http"
        }

        /// Waits for the response status like a duplex call; only the body
        /// is discarded. A non-2xx status is still an error.
        async fn send_one_way(&self, endpoint: &Endpoint, frame: Bytes, timeouts: Timeouts) -> Result<()> {
            self.post(endpoint, frame, timeouts).await.map(|_| ())
        }

        async fn send_duplex(&self, endpoint: &Endpoint, frame: Bytes, timeouts: Timeouts) -> Result<Bytes> {
            self.post(endpoint, frame, timeouts).await
        }
    }
}

#[cfg(not(feature = "transport_http"))]
mod imp {
    // ---
    use bytes::Bytes;

    use crate::{Endpoint, QueueError, Result, Timeouts, Transport};

    pub(super) struct HttpTransport;

    impl HttpTransport {
        pub(super) fn new() -> Self {
            Self
        }
    }

    #[async_trait::async_trait]
    impl Transport for HttpTransport {
        // ---
        fn name(&self) -> &'static str {
            "http (disabled)"
        }

        async fn send_one_way(&self, _: &Endpoint, _: Bytes, _: Timeouts) -> Result<()> {
            Err(QueueError::TransportUnavailable("http"))
        }

        async fn send_duplex(&self, _: &Endpoint, _: Bytes, _: Timeouts) -> Result<Bytes> {
            Err(QueueError::TransportUnavailable("http"))
        }
    }
}

/// Create the HTTP transport.
pub fn create_http_transport() -> TransportPtr {
    Arc::new(imp::HttpTransport::new())
}
