//! Per-endpoint channel configuration.
//!
//! A [`ChannelSettings`] value describes one logical remote queue: which
//! transport to use, where the server lives, and the connect/read/wait bounds
//! applied to every call. Setters clamp out-of-range input instead of
//! rejecting it, so a settings value is always usable.
//!
//! Loading settings from files is left to the application; the type
//! implements `serde::Deserialize` (timeouts in milliseconds) and applies the
//! same clamps on the way in.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Endpoint, QueueError};

/// Default connect bound.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Default read bound.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(180_000);

/// Default bound on a caller waiting for a background call.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(180_000);

/// Default polling granularity for cancellation and retry backoff.
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_millis(100);

pub const MIN_RETRY: u8 = 1;
pub const MAX_RETRY: u8 = 5;

const DEFAULT_PORT: u16 = 15_000;
const DEFAULT_PIPE_NAME: &str = "duplex-queue.sock";

/// Wire transport selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Protocol {
    Http,
    #[default]
    Pipe,
    Tcp,
}

impl Protocol {
    pub const ALL: [Protocol; 3] = [Protocol::Http, Protocol::Pipe, Protocol::Tcp];

    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Pipe => "pipe",
            Protocol::Tcp => "tcp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "pipe" => Ok(Protocol::Pipe),
            "tcp" => Ok(Protocol::Tcp),
            other => Err(QueueError::Config(format!(
                "unrecognized protocol: {other}, valid values: http, pipe, tcp"
            ))),
        }
    }
}

/// What happens to a background call when the caller stops waiting for it.
///
/// The bounded-wait shapes ([`Dispatcher::execute_and_wait`](crate::Dispatcher::execute_and_wait)
/// and [`Dispatcher::send_with_cancellation`](crate::Dispatcher::send_with_cancellation))
/// return to the caller once `wait_timeout` elapses. The call that was
/// started on their behalf may still be running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WaitPolicy {
    /// Leave the call running and drop its result unobserved.
    #[default]
    Abandon,

    /// Leave the call running and log its late outcome when it finishes.
    Observe,

    /// Abort the call at its next suspension point.
    Abort,
}

/// Transport and timing configuration for one remote queue endpoint.
///
/// # Example
///
/// ```
/// use duplex_queue::{ChannelSettings, Protocol};
/// use std::time::Duration;
///
/// let settings = ChannelSettings::new("orders")
///     .with_protocol(Protocol::Tcp)
///     .with_address("10.0.0.7", 15000)
///     .with_read_timeout(Duration::from_secs(30))
///     .with_max_retry(9); // clamped
///
/// assert_eq!(settings.max_retry(), 5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SettingsRepr", into = "SettingsRepr")]
pub struct ChannelSettings {
    host_name: String,
    protocol: Protocol,
    address: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    wait_timeout: Duration,
    wait_interval: Duration,
    max_retry: u8,
    is_async: bool,
    enable_remote_exception: bool,
    wait_policy: WaitPolicy,
}

impl ChannelSettings {
    // ---
    /// Settings for `host_name` with every other field defaulted.
    ///
    /// The default protocol is [`Protocol::Pipe`] on `localhost`, with the
    /// pipe name derived from the host name.
    pub fn new(host_name: impl Into<String>) -> Self {
        let host_name = host_name.into();
        let address = default_address(Protocol::Pipe, &host_name);
        Self {
            host_name,
            protocol: Protocol::Pipe,
            address,
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            wait_interval: DEFAULT_WAIT_INTERVAL,
            max_retry: MIN_RETRY,
            is_async: false,
            enable_remote_exception: false,
            wait_policy: WaitPolicy::Abandon,
        }
    }

    /// Start a [`ChannelSettingsBuilder`].
    pub fn builder(host_name: impl Into<String>) -> ChannelSettingsBuilder {
        ChannelSettingsBuilder::new(host_name)
    }

    // -- accessors

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    pub fn wait_interval(&self) -> Duration {
        self.wait_interval
    }

    pub fn max_retry(&self) -> u8 {
        self.max_retry
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn enable_remote_exception(&self) -> bool {
        self.enable_remote_exception
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        self.wait_policy
    }

    /// The resolved transport address for this channel.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.protocol, self.address.as_str(), self.port)
    }

    // -- clamping setters

    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.connect_timeout = or_default(timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = or_default(timeout, DEFAULT_READ_TIMEOUT);
    }

    pub fn set_wait_timeout(&mut self, timeout: Duration) {
        self.wait_timeout = or_default(timeout, DEFAULT_WAIT_TIMEOUT);
    }

    pub fn set_wait_interval(&mut self, interval: Duration) {
        self.wait_interval = or_default(interval, DEFAULT_WAIT_INTERVAL);
    }

    /// Set the maximum delivery attempts, clamped to `[1, 5]`.
    ///
    /// Signed input so that configuration sources carrying `0` or negative
    /// values clamp instead of failing.
    pub fn set_max_retry(&mut self, max_retry: i32) {
        self.max_retry = max_retry.clamp(MIN_RETRY as i32, MAX_RETRY as i32) as u8;
    }

    /// Switch protocol. A default address is substituted when the current
    /// one is empty.
    pub fn set_protocol(&mut self, protocol: Protocol) {
        let was_default = self.address == default_address(self.protocol, &self.host_name);
        self.protocol = protocol;
        if self.address.is_empty() || was_default {
            self.address = default_address(protocol, &self.host_name);
        }
    }

    pub fn set_address(&mut self, address: impl Into<String>, port: u16) {
        let address = address.into();
        self.address = if address.is_empty() {
            default_address(self.protocol, &self.host_name)
        } else {
            address
        };
        self.port = port;
    }

    pub fn set_async(&mut self, is_async: bool) {
        self.is_async = is_async;
    }

    pub fn set_enable_remote_exception(&mut self, enable: bool) {
        self.enable_remote_exception = enable;
    }

    pub fn set_wait_policy(&mut self, policy: WaitPolicy) {
        self.wait_policy = policy;
    }

    // -- chaining forms

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.set_protocol(protocol);
        self
    }

    pub fn with_address(mut self, address: impl Into<String>, port: u16) -> Self {
        self.set_address(address, port);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.set_connect_timeout(timeout);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.set_read_timeout(timeout);
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.set_wait_timeout(timeout);
        self
    }

    pub fn with_wait_interval(mut self, interval: Duration) -> Self {
        self.set_wait_interval(interval);
        self
    }

    pub fn with_max_retry(mut self, max_retry: i32) -> Self {
        self.set_max_retry(max_retry);
        self
    }

    pub fn with_async(mut self, is_async: bool) -> Self {
        self.set_async(is_async);
        self
    }

    pub fn with_remote_exception(mut self, enable: bool) -> Self {
        self.set_enable_remote_exception(enable);
        self
    }

    pub fn with_wait_policy(mut self, policy: WaitPolicy) -> Self {
        self.set_wait_policy(policy);
        self
    }
}

fn or_default(value: Duration, default: Duration) -> Duration {
    if value.is_zero() {
        default
    } else {
        value
    }
}

fn default_address(protocol: Protocol, host_name: &str) -> String {
    match protocol {
        Protocol::Pipe if host_name.is_empty() => DEFAULT_PIPE_NAME.to_string(),
        Protocol::Pipe => format!("{host_name}.sock"),
        Protocol::Http | Protocol::Tcp => "localhost".to_string(),
    }
}

/// Builder for [`ChannelSettings`].
///
/// Every setter is optional; unset fields keep the defaults documented on
/// the constants in this module.
///
/// ```
/// use duplex_queue::{ChannelSettingsBuilder, Protocol, WaitPolicy};
/// use std::time::Duration;
///
/// let settings = ChannelSettingsBuilder::new("billing")
///     .protocol(Protocol::Tcp)
///     .address("127.0.0.1", 15001)
///     .wait_timeout(Duration::from_secs(10))
///     .wait_policy(WaitPolicy::Observe)
///     .build();
///
/// assert_eq!(settings.endpoint().socket_addr(), "127.0.0.1:15001");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChannelSettingsBuilder {
    host_name: String,
    protocol: Option<Protocol>,
    address: Option<(String, u16)>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    wait_timeout: Option<Duration>,
    wait_interval: Option<Duration>,
    max_retry: Option<i32>,
    is_async: Option<bool>,
    enable_remote_exception: Option<bool>,
    wait_policy: Option<WaitPolicy>,
}

impl ChannelSettingsBuilder {
    pub fn new(host_name: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
            ..Self::default()
        }
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn address(mut self, address: impl Into<String>, port: u16) -> Self {
        self.address = Some((address.into(), port));
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    pub fn wait_interval(mut self, interval: Duration) -> Self {
        self.wait_interval = Some(interval);
        self
    }

    pub fn max_retry(mut self, max_retry: i32) -> Self {
        self.max_retry = Some(max_retry);
        self
    }

    pub fn is_async(mut self, is_async: bool) -> Self {
        self.is_async = Some(is_async);
        self
    }

    pub fn enable_remote_exception(mut self, enable: bool) -> Self {
        self.enable_remote_exception = Some(enable);
        self
    }

    pub fn wait_policy(mut self, policy: WaitPolicy) -> Self {
        self.wait_policy = Some(policy);
        self
    }

    /// Build the settings (consumes self). Never fails; out-of-range values
    /// are clamped.
    pub fn build(self) -> ChannelSettings {
        // ---
        let mut settings = ChannelSettings::new(self.host_name);

        if let Some(protocol) = self.protocol {
            settings.set_protocol(protocol);
        }
        if let Some((address, port)) = self.address {
            settings.set_address(address, port);
        }
        if let Some(timeout) = self.connect_timeout {
            settings.set_connect_timeout(timeout);
        }
        if let Some(timeout) = self.read_timeout {
            settings.set_read_timeout(timeout);
        }
        if let Some(timeout) = self.wait_timeout {
            settings.set_wait_timeout(timeout);
        }
        if let Some(interval) = self.wait_interval {
            settings.set_wait_interval(interval);
        }
        if let Some(max_retry) = self.max_retry {
            settings.set_max_retry(max_retry);
        }
        if let Some(is_async) = self.is_async {
            settings.set_async(is_async);
        }
        if let Some(enable) = self.enable_remote_exception {
            settings.set_enable_remote_exception(enable);
        }
        if let Some(policy) = self.wait_policy {
            settings.set_wait_policy(policy);
        }

        settings
    }
}

/// Serialized form: every field optional, timeouts in milliseconds.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct SettingsRepr {
    host_name: String,
    protocol: Option<Protocol>,
    address: Option<String>,
    port: Option<u16>,
    connect_timeout_ms: Option<u64>,
    read_timeout_ms: Option<u64>,
    wait_timeout_ms: Option<u64>,
    wait_interval_ms: Option<u64>,
    max_retry: Option<i32>,
    is_async: Option<bool>,
    enable_remote_exception: Option<bool>,
    wait_policy: Option<WaitPolicy>,
}

impl From<SettingsRepr> for ChannelSettings {
    fn from(repr: SettingsRepr) -> Self {
        // ---
        let mut builder = ChannelSettingsBuilder::new(repr.host_name);
        builder.protocol = repr.protocol;
        builder.address = match (repr.address, repr.port) {
            (Some(address), port) => Some((address, port.unwrap_or(DEFAULT_PORT))),
            (None, Some(port)) => Some((String::new(), port)),
            (None, None) => None,
        };
        builder.connect_timeout = repr.connect_timeout_ms.map(Duration::from_millis);
        builder.read_timeout = repr.read_timeout_ms.map(Duration::from_millis);
        builder.wait_timeout = repr.wait_timeout_ms.map(Duration::from_millis);
        builder.wait_interval = repr.wait_interval_ms.map(Duration::from_millis);
        builder.max_retry = repr.max_retry;
        builder.is_async = repr.is_async;
        builder.enable_remote_exception = repr.enable_remote_exception;
        builder.wait_policy = repr.wait_policy;
        builder.build()
    }
}

impl From<ChannelSettings> for SettingsRepr {
    fn from(settings: ChannelSettings) -> Self {
        Self {
            host_name: settings.host_name,
            protocol: Some(settings.protocol),
            address: Some(settings.address),
            port: Some(settings.port),
            connect_timeout_ms: Some(settings.connect_timeout.as_millis() as u64),
            read_timeout_ms: Some(settings.read_timeout.as_millis() as u64),
            wait_timeout_ms: Some(settings.wait_timeout.as_millis() as u64),
            wait_interval_ms: Some(settings.wait_interval.as_millis() as u64),
            max_retry: Some(settings.max_retry as i32),
            is_async: Some(settings.is_async),
            enable_remote_exception: Some(settings.enable_remote_exception),
            wait_policy: Some(settings.wait_policy),
        }
    }
}
