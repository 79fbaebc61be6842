use thiserror::Error;

/// Errors that can occur while dispatching envelopes or running queue operations.
///
/// Under the default channel configuration most of these never reach the
/// caller: the dispatcher converts them into an empty payload or a terminal
/// [`Acknowledgement`](crate::Acknowledgement). They surface as `Err` only
/// when `enable_remote_exception` is set on the
/// [`ChannelSettings`](crate::ChannelSettings).
#[derive(Error, Debug)]
pub enum QueueError {
    /// The remote endpoint refused the connection or could not be reached.
    ///
    /// This is the only variant the retry helper retries.
    #[error("connection error: {0}")]
    Connection(String),

    /// A connect, read or wait bound elapsed.
    #[error("{0} timeout elapsed")]
    Timeout(&'static str),

    /// A cooperative cancellation signal was observed.
    #[error("operation cancelled")]
    Cancelled,

    /// Received bytes could not be interpreted as the expected type.
    #[error("decode error: {0}")]
    Decode(String),

    /// JSON serialization or deserialization failed.
    #[error("json serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CBOR serialization or deserialization failed.
    #[error("cbor serialization error: {0}")]
    Cbor(#[from] serde_cbor::Error),

    /// Socket or pipe I/O failed after the connection was established.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// No client is registered for the requested queue host.
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    /// The server answered with a failure of its own.
    #[error("remote error: {0}")]
    Remote(String),

    /// The transport was compiled out (feature flag disabled).
    #[error("transport unavailable: {0}")]
    TransportUnavailable(&'static str),
}

impl QueueError {
    /// Whether a retry with backoff may succeed where this attempt failed.
    pub fn is_retryable(&self) -> bool {
        // ---
        matches!(self, QueueError::Connection(_))
    }

    /// Classify an I/O error raised while connecting.
    ///
    /// Refusals, resets and missing pipe files are connection errors; a
    /// `TimedOut` kind is reported as a connect timeout; anything else stays
    /// a plain I/O error.
    pub(crate) fn from_connect(err: std::io::Error) -> Self {
        // ---
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::AddrNotAvailable
            | ErrorKind::NotFound => QueueError::Connection(err.to_string()),
            ErrorKind::TimedOut => QueueError::Timeout("connect"),
            _ => QueueError::Io(err),
        }
    }
}

/// Result type alias for queue and dispatch operations.
pub type Result<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_only_connection_errors_are_retryable() {
        // ---
        assert!(QueueError::Connection("refused".into()).is_retryable());
        assert!(!QueueError::Timeout("read").is_retryable());
        assert!(!QueueError::Cancelled.is_retryable());
        assert!(!QueueError::Decode("bad tag".into()).is_retryable());
    }

    #[test]
    fn test_connect_error_classification() {
        // ---
        let refused = QueueError::from_connect(IoError::from(ErrorKind::ConnectionRefused));
        assert!(matches!(refused, QueueError::Connection(_)));

        let missing_pipe = QueueError::from_connect(IoError::from(ErrorKind::NotFound));
        assert!(matches!(missing_pipe, QueueError::Connection(_)));

        let timed_out = QueueError::from_connect(IoError::from(ErrorKind::TimedOut));
        assert!(matches!(timed_out, QueueError::Timeout("connect")));

        let other = QueueError::from_connect(IoError::from(ErrorKind::PermissionDenied));
        assert!(matches!(other, QueueError::Io(_)));
    }

    #[test]
    fn test_display_names_the_bound() {
        // ---
        assert_eq!(QueueError::Timeout("wait").to_string(), "wait timeout elapsed");
    }
}
