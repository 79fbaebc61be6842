// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use duplex_queue::{
    // ---
    create_memory_transport_with_hub,
    ChannelSettings,
    Dispatcher,
    MemoryHub,
    MemoryQueueHost,
    Protocol,
    QueueClient,
    TransportTable,
};

static TRACING: Once = Once::new();

/// Install a fmt subscriber once per test binary. `RUST_LOG` selects levels.
pub fn init_tracing() {
    // ---
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(true)
            .with_ansi(false)
            .with_line_number(true)
            .with_test_writer()
            .try_init();
    });
}

/// Settings tuned for fast tests: short poll interval, small bounds.
pub fn test_settings(host: &str) -> ChannelSettings {
    ChannelSettings::new(host)
        .with_protocol(Protocol::Tcp)
        .with_connect_timeout(Duration::from_millis(500))
        .with_read_timeout(Duration::from_secs(2))
        .with_wait_timeout(Duration::from_secs(2))
        .with_wait_interval(Duration::from_millis(10))
}

/// A queue client talking to a fresh in-memory host over an isolated hub.
pub struct MemoryFixture {
    pub hub: Arc<MemoryHub>,
    pub host: Arc<MemoryQueueHost>,
    pub client: QueueClient,
}

impl MemoryFixture {
    pub async fn new(name: &str) -> Self {
        Self::with_settings(test_settings(name)).await
    }

    pub async fn with_settings(settings: ChannelSettings) -> Self {
        // ---
        init_tracing();

        let hub = MemoryHub::new();
        let host = MemoryQueueHost::new();
        hub.bind(settings.address().to_string(), host.clone()).await;

        let transports = TransportTable::uniform(create_memory_transport_with_hub(hub.clone()));
        let client = QueueClient::with_dispatcher(Dispatcher::with_transports(settings, transports));

        Self { hub, host, client }
    }
}

/// Poll `check` until it holds or `limit` elapses.
pub async fn eventually<F: Fn() -> bool>(limit: Duration, check: F) -> bool {
    // ---
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
