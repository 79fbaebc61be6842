// tests/transport_tcp.rs

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use common::{eventually, init_tracing, test_settings};
use duplex_queue::host::serve_tcp;
use duplex_queue::{
    // ---
    ChannelSettings,
    DuplexMode,
    Envelope,
    MemoryQueueHost,
    MessageState,
    Priority,
    QueueClient,
    QueueError,
    TransformKind,
};

struct TcpFixture {
    host: Arc<MemoryQueueHost>,
    client: QueueClient,
    server: JoinHandle<()>,
}

impl TcpFixture {
    async fn start(settings: ChannelSettings) -> Self {
        // ---
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let host = MemoryQueueHost::new();
        let server = serve_tcp(listener, host.clone());
        let client = QueueClient::new(settings.with_address("127.0.0.1", port));

        Self { host, client, server }
    }
}

impl Drop for TcpFixture {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn enqueue_and_dequeue_over_tcp() {
    // ---
    // Arrange
    // ---
    let fx = TcpFixture::start(test_settings("orders")).await;

    // ---
    // Act
    // ---
    let ack = fx
        .client
        .enqueue(Envelope::new("order #1").with_priority(Priority::High))
        .await
        .unwrap();
    let item = fx.client.dequeue().await.unwrap();

    // ---
    // Assert
    // ---
    assert_eq!(ack.state, MessageState::Arrived);
    let item = item.expect("queued item");
    assert_eq!(item.body, "order #1");
    assert_eq!(item.host, "orders");
    assert_eq!(item.priority, Priority::High);
    assert!(fx.client.dequeue().await.unwrap().is_none());
}

#[tokio::test]
async fn json_transform_round_trips_over_tcp() {
    // ---
    let fx = TcpFixture::start(test_settings("orders")).await;
    let client = fx.client.clone().with_transform(TransformKind::Json);

    let env = Envelope::new("plain").with_transform(TransformKind::Json);
    let ack = client.enqueue(env).await.unwrap();
    assert_eq!(ack.state, MessageState::Arrived);

    let item = client.peek().await.unwrap().unwrap();
    assert_eq!(item.body, "plain");
    assert_eq!(fx.host.len("orders"), 1);
}

#[tokio::test]
async fn one_way_messages_reach_the_host() {
    // ---
    let fx = TcpFixture::start(test_settings("orders")).await;

    let ack = fx
        .client
        .enqueue(Envelope::new("fire").with_duplex(DuplexMode::None))
        .await
        .unwrap();
    assert_eq!(ack.state, MessageState::Arrived);

    let host = fx.host.clone();
    assert!(eventually(Duration::from_secs(2), || host.len("orders") == 1).await);

    let item = fx.client.dequeue().await.unwrap().unwrap();
    fx.client.abort(&item).await.unwrap();

    let host = fx.host.clone();
    assert!(eventually(Duration::from_secs(2), || host.transactions().len() == 1).await);
    assert_eq!(fx.host.transactions()[0].state, MessageState::TransAborted);
}

#[tokio::test]
async fn several_requests_share_one_server() {
    // ---
    let fx = TcpFixture::start(test_settings("orders")).await;

    let mut tasks = Vec::new();
    for n in 0..8 {
        let client = fx.client.clone();
        tasks.push(tokio::spawn(async move {
            client.enqueue(Envelope::new(format!("job {n}"))).await.unwrap()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().state, MessageState::Arrived);
    }

    assert_eq!(fx.host.len("orders"), 8);
}

#[tokio::test]
async fn consume_over_tcp_outlasts_read_timeout() {
    // ---
    // The hold is longer than the channel's read bound; the client must
    // still wait for the server's answer.
    let settings = test_settings("orders").with_read_timeout(Duration::from_millis(200));
    let fx = TcpFixture::start(settings).await;
    let producer = fx.client.clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(600)).await;
        producer.enqueue(Envelope::new("late")).await.unwrap();
    });

    let item = fx.client.consume(3).await.unwrap();
    assert_eq!(item.expect("item delivered").body, "late");
}

#[tokio::test]
async fn refused_connection_degrades_to_empty_results() {
    // ---
    init_tracing();
    let port = refused_port().await;
    let client = QueueClient::new(test_settings("orders").with_address("127.0.0.1", port));

    let started = Instant::now();
    assert!(client.dequeue().await.unwrap().is_none());
    assert!(client.peek().await.unwrap().is_none());

    let ack = client.enqueue(Envelope::new("x")).await.unwrap();
    assert_eq!(ack.state, MessageState::UnexpectedError);

    let status = client.queue_exists().await.unwrap();
    assert_eq!(status.state, MessageState::UnexpectedError);

    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn refused_connection_is_retried_then_raised() {
    // ---
    init_tracing();
    let port = refused_port().await;
    let client = QueueClient::new(
        test_settings("orders")
            .with_address("127.0.0.1", port)
            .with_max_retry(3)
            .with_remote_exception(true),
    );

    let result = client.dequeue().await;
    assert!(matches!(result, Err(QueueError::Connection(_))), "{result:?}");
}
