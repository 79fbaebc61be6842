// tests/queue_memory.rs

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use common::{eventually, test_settings, MemoryFixture};
use duplex_queue::{
    // ---
    create_memory_transport_with_hub,
    Dispatcher,
    DuplexMode,
    Envelope,
    FrameHandler,
    MemoryHub,
    MessageState,
    Priority,
    QueueClient,
    QueueError,
    QueueProperties,
    TransformKind,
    TransportTable,
};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Job {
    name: String,
    attempts: u32,
}

/// Accepts every request and never answers.
struct Mute;

#[async_trait::async_trait]
impl FrameHandler for Mute {
    async fn handle_frame(&self, _frame: Bytes) -> Option<Bytes> {
        Some(Bytes::new())
    }
}

/// Holds every request for a long time before dropping it.
struct Sluggish;

#[async_trait::async_trait]
impl FrameHandler for Sluggish {
    async fn handle_frame(&self, _frame: Bytes) -> Option<Bytes> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        None
    }
}

async fn client_for(handler: Arc<dyn FrameHandler>, name: &str) -> QueueClient {
    // ---
    let settings = test_settings(name);
    let hub = MemoryHub::new();
    hub.bind(settings.address().to_string(), handler).await;
    let transports = TransportTable::uniform(create_memory_transport_with_hub(hub));
    QueueClient::with_dispatcher(Dispatcher::with_transports(settings, transports))
}

#[tokio::test]
async fn enqueue_is_acknowledged_with_same_identifier() {
    // ---
    // Arrange
    // ---
    let fx = MemoryFixture::new("Q1").await;
    let env = Envelope::new("payload");
    let id = env.id().clone();

    // ---
    // Act
    // ---
    let ack = fx.client.enqueue(env).await.unwrap();

    // ---
    // Assert
    // ---
    assert_eq!(ack.state, MessageState::Arrived);
    assert_eq!(ack.id, id);
    assert_eq!(ack.host, "Q1");
    assert_eq!(fx.host.len("Q1"), 1);
}

#[tokio::test]
async fn one_way_enqueue_is_arrived_without_reply() {
    // ---
    let fx = MemoryFixture::new("Q1").await;
    let env = Envelope::new("fire").with_duplex(DuplexMode::None);

    let ack = fx.client.enqueue(env).await.unwrap();
    assert_eq!(ack.state, MessageState::Arrived);

    let host = fx.host.clone();
    assert!(eventually(Duration::from_secs(1), || host.len("Q1") == 1).await);
}

#[tokio::test]
async fn one_way_enqueue_to_unreachable_host_is_a_transport_error_state() {
    // ---
    let fx = MemoryFixture::new("Q1").await;
    fx.hub.unbind("localhost").await;
    let env = Envelope::new("fire").with_duplex(DuplexMode::None);
    let id = env.id().clone();

    let ack = fx.client.enqueue(env).await.unwrap();

    assert_eq!(ack.state, MessageState::OperationFailed);
    assert_eq!(ack.id, id);
}

#[tokio::test]
async fn respond_enqueue_with_empty_reply_is_unexpected_error() {
    // ---
    let client = client_for(Arc::new(Mute), "Q1").await;
    let env = Envelope::new("payload");
    let id = env.id().clone();

    let ack = client.enqueue(env).await.unwrap();

    assert_eq!(ack.state, MessageState::UnexpectedError);
    assert_eq!(ack.id, id);
}

#[tokio::test]
async fn dequeue_returns_items_then_none() {
    // ---
    let fx = MemoryFixture::new("jobs").await;
    let job = Job {
        name: "resize".into(),
        attempts: 0,
    };
    let env = Envelope::from_value(&job, TransformKind::Json).unwrap();
    fx.client.enqueue(env).await.unwrap();

    let item = fx.client.dequeue().await.unwrap().expect("one item queued");
    assert_eq!(item.body_value::<Job>().unwrap(), job);
    assert_eq!(item.state, MessageState::Arrived);

    assert!(fx.client.dequeue().await.unwrap().is_none());
}

#[tokio::test]
async fn dequeue_from_unreachable_queue_is_none_within_timeout() {
    // ---
    let fx = MemoryFixture::new("jobs").await;
    fx.hub.unbind("localhost").await;

    let started = Instant::now();
    let item = fx
        .client
        .dequeue_with_timeout(Duration::from_millis(500))
        .await
        .unwrap();

    assert!(item.is_none());
    assert!(started.elapsed() < Duration::from_millis(700));
}

#[tokio::test]
async fn retries_never_outlast_the_dequeue_timeout() {
    // ---
    // Arrange
    // ---
    let settings = test_settings("jobs")
        .with_max_retry(5)
        .with_wait_interval(Duration::from_millis(200));
    let fx = MemoryFixture::with_settings(settings).await;
    fx.hub.unbind("localhost").await;

    // ---
    // Act
    // ---
    let started = Instant::now();
    let item = fx
        .client
        .dequeue_with_timeout(Duration::from_millis(500))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    // ---
    // Assert
    // ---
    assert!(item.is_none());
    assert!(elapsed < Duration::from_millis(800), "returned late: {elapsed:?}");
}

#[tokio::test]
async fn retries_never_outlast_the_receive_timeout() {
    // ---
    let settings = test_settings("jobs")
        .with_max_retry(5)
        .with_wait_interval(Duration::from_millis(200));
    let fx = MemoryFixture::with_settings(settings).await;
    fx.hub.unbind("localhost").await;

    let started = Instant::now();
    let item = fx.client.receive(Duration::from_millis(300)).await.unwrap();
    let elapsed = started.elapsed();

    assert!(item.is_none());
    assert!(elapsed < Duration::from_millis(700), "returned late: {elapsed:?}");
}

#[tokio::test]
async fn dequeue_with_timeout_against_silent_host_returns_near_bound() {
    // ---
    let client = client_for(Arc::new(Sluggish), "jobs").await;

    let started = Instant::now();
    let item = client
        .dequeue_with_timeout(Duration::from_millis(500))
        .await
        .unwrap();

    let elapsed = started.elapsed();
    assert!(item.is_none());
    assert!(elapsed >= Duration::from_millis(450), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(900), "returned late: {elapsed:?}");
}

#[tokio::test]
async fn dequeue_priority_and_peek() {
    // ---
    let fx = MemoryFixture::new("jobs").await;
    for (body, priority) in [("low", Priority::Normal), ("mid", Priority::Medium), ("top", Priority::High)] {
        fx.client
            .enqueue(Envelope::new(body).with_priority(priority))
            .await
            .unwrap();
    }

    let peeked = fx.client.peek().await.unwrap().unwrap();
    assert_eq!(peeked.body, "top");
    assert_eq!(fx.host.len("jobs"), 3);

    let mid = fx.client.dequeue_priority(Priority::Medium).await.unwrap().unwrap();
    assert_eq!(mid.body, "mid");
    assert!(fx.client.dequeue_priority(Priority::Medium).await.unwrap().is_none());
    assert_eq!(fx.host.len("jobs"), 2);
}

#[tokio::test]
async fn consume_holds_for_the_requested_wait() {
    // ---
    let fx = MemoryFixture::new("jobs").await;

    let started = Instant::now();
    let item = fx.client.consume(1).await.unwrap();

    assert!(item.is_none());
    assert!(started.elapsed() >= Duration::from_millis(950));
}

#[tokio::test]
async fn consume_returns_early_when_data_arrives() {
    // ---
    let fx = MemoryFixture::new("jobs").await;
    let producer = fx.client.clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        producer.enqueue(Envelope::new("late")).await.unwrap();
    });

    let started = Instant::now();
    let item = fx.client.consume(5).await.unwrap().expect("item delivered");

    assert_eq!(item.body, "late");
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn commit_and_abort_are_one_way() {
    // ---
    let client = client_for(Arc::new(Sluggish), "jobs").await;
    let item = Envelope::new("x").with_host("jobs");

    let started = Instant::now();
    client.commit(&item).await.unwrap();
    client.abort(&item).await.unwrap();

    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn commit_is_recorded_by_host() {
    // ---
    let fx = MemoryFixture::new("jobs").await;
    fx.client.enqueue(Envelope::new("x")).await.unwrap();
    let item = fx.client.dequeue().await.unwrap().unwrap();

    fx.client.commit(&item).await.unwrap();

    let host = fx.host.clone();
    assert!(eventually(Duration::from_secs(1), || !host.transactions().is_empty()).await);

    let record = &fx.host.transactions()[0];
    assert_eq!(record.id, *item.id());
    assert_eq!(record.state, MessageState::TransCommitted);
}

#[tokio::test]
async fn management_operations_round_trip() {
    // ---
    let fx = MemoryFixture::new("billing").await;

    let missing = fx.client.queue_exists().await.unwrap();
    assert_eq!(missing.state, MessageState::QueueNotFound);

    let props = QueueProperties::new("billing").transactional(true).with_max_retry(3);
    let created = fx.client.add_queue(&props).await.unwrap();
    assert_eq!(created.state, MessageState::Arrived);
    assert_eq!(fx.host.properties("billing"), Some(props));

    let present = fx.client.queue_exists().await.unwrap();
    assert_eq!(present.state, MessageState::Arrived);

    fx.client.enqueue(Envelope::new("a")).await.unwrap();
    let report = fx.client.report("ReportCount", "").await.unwrap();
    assert_eq!(report.label, "1");

    let removed = fx.client.remove_queue().await.unwrap();
    assert_eq!(removed.state, MessageState::Arrived);
    assert!(!fx.host.contains_queue("billing"));
}

#[tokio::test]
async fn report_without_reply_is_unexpected_error() {
    // ---
    let client = client_for(Arc::new(Mute), "jobs").await;
    let reply = client.report("ReportStatus", "jobs").await.unwrap();

    assert_eq!(reply.state, MessageState::UnexpectedError);
    assert_eq!(reply.host, "jobs");
}

#[tokio::test]
async fn unknown_report_command_is_operation_failed() {
    // ---
    let fx = MemoryFixture::new("jobs").await;
    let reply = fx.client.report("Defragment", "jobs").await.unwrap();
    assert_eq!(reply.state, MessageState::OperationFailed);
}

#[tokio::test]
async fn begin_receive_polls_until_item_arrives() {
    // ---
    let fx = MemoryFixture::new("jobs").await;
    let handle = fx.client.begin_receive(Duration::from_secs(3));

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(!handle.is_finished());
    fx.client.enqueue(Envelope::new("polled")).await.unwrap();

    let item = handle.end_receive().await.unwrap().expect("item received");
    assert_eq!(item.body, "polled");
}

#[tokio::test]
async fn receive_times_out_with_none() {
    // ---
    let fx = MemoryFixture::new("jobs").await;

    let started = Instant::now();
    let item = fx.client.receive(Duration::from_millis(300)).await.unwrap();

    assert!(item.is_none());
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn cancelled_receive_ends_with_none() {
    // ---
    let fx = MemoryFixture::new("jobs").await;
    let handle = fx.client.begin_receive(Duration::from_secs(30));

    tokio::time::sleep(Duration::from_millis(150)).await;
    handle.cancel();

    let started = Instant::now();
    assert!(handle.end_receive().await.unwrap().is_none());
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn receive_callback_fires_once() {
    // ---
    let fx = MemoryFixture::new("jobs").await;
    fx.client.enqueue(Envelope::new("ready")).await.unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    fx.client
        .receive_with_callback(Duration::from_secs(1), move |result| {
            let _ = tx.send(result);
        })
        .await
        .unwrap();

    let item = rx.await.unwrap().unwrap().unwrap();
    assert_eq!(item.body, "ready");
}

#[tokio::test]
async fn async_channel_routes_through_bounded_wait() {
    // ---
    let fx = MemoryFixture::with_settings(test_settings("jobs").with_async(true)).await;

    let ack = fx.client.enqueue(Envelope::new("x")).await.unwrap();
    assert_eq!(ack.state, MessageState::Arrived);

    let item = fx.client.dequeue().await.unwrap().unwrap();
    assert_eq!(item.body, "x");
}

#[tokio::test]
async fn remote_exception_surfaces_connection_error() {
    // ---
    let fx = MemoryFixture::with_settings(test_settings("jobs").with_remote_exception(true)).await;
    fx.hub.unbind("localhost").await;

    let result = fx.client.dequeue().await;
    assert!(matches!(result, Err(QueueError::Connection(_))));
}
