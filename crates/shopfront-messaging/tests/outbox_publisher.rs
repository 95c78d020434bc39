mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shopfront_core::clock::Clock;
use shopfront_core::repository::OutboxStore;
use shopfront_messaging::transport::{MessageReceiver, MessageSender};
use shopfront_messaging::{
    BrokerConnection, BrokerMessage, InMemoryBroker, MessagingError, OutboxPublisher,
    OutboxPublisherConfig, OutboxSweepReport, ProcessorOptions, ShutdownSignal,
    TransportClientPool,
};
use tokio::sync::Notify;
use shopfront_test_support::{FailingBroker, FixedClock, InMemoryOutboxStore};

use common::{base_time, codec, outbox_row, reserved};

const TOPIC: &str = "inventory";

fn publisher(
    store: &InMemoryOutboxStore,
    broker: Arc<dyn shopfront_messaging::BrokerConnection>,
    config: OutboxPublisherConfig,
) -> OutboxPublisher {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock(base_time()));
    OutboxPublisher::new(
        Arc::new(store.clone()),
        Arc::new(TransportClientPool::new(broker)),
        clock,
        config,
    )
    .unwrap()
}

fn enabled() -> OutboxPublisherConfig {
    OutboxPublisherConfig::for_topic(Some(TOPIC.into()))
}

/// A broker whose sends never finish.
#[derive(Default)]
struct StalledBroker {
    send_started: Arc<Notify>,
}

struct StalledSender {
    send_started: Arc<Notify>,
}

#[async_trait]
impl MessageSender for StalledSender {
    async fn send(&self, _message: BrokerMessage) -> Result<(), MessagingError> {
        self.send_started.notify_one();
        std::future::pending().await
    }
}

impl BrokerConnection for StalledBroker {
    fn create_sender(&self, _topic: &str) -> Result<Arc<dyn MessageSender>, MessagingError> {
        Ok(Arc::new(StalledSender {
            send_started: Arc::clone(&self.send_started),
        }))
    }

    fn create_receiver(
        &self,
        _topic: &str,
        _subscription: &str,
        _options: &ProcessorOptions,
    ) -> Result<Box<dyn MessageReceiver>, MessagingError> {
        Err(MessagingError::Transport("receive not supported".into()))
    }
}

#[tokio::test]
async fn test_sweep_publishes_every_pending_row() {
    let codec = codec();
    let store = InMemoryOutboxStore::new();
    let rows: Vec<_> = (0..3)
        .map(|i| outbox_row(&codec, &reserved(&format!("sku-{i}"), i)))
        .collect();
    store.seed(rows.clone());
    let broker = InMemoryBroker::new();
    let publisher = publisher(&store, Arc::new(broker.clone()), enabled());

    let report = publisher.sweep(&ShutdownSignal::never()).await.unwrap();

    assert_eq!(
        report,
        OutboxSweepReport {
            published: 3,
            failed: 0,
            skipped_disabled: 0
        }
    );
    for row in store.rows() {
        assert!(row.processed);
        assert_eq!(row.processed_at_utc, Some(base_time()));
        assert_eq!(row.error, None);
    }
    let published = broker.published(TOPIC);
    assert_eq!(published.len(), 3);
    assert_eq!(published[0].message_id, rows[0].id.to_string());
    assert_eq!(published[0].subject, "inventory.stock_reserved");
    assert_eq!(published[0].correlation_id.as_deref(), Some("corr-sku-0"));
    assert_eq!(published[0].body, rows[0].payload);
    assert_eq!(store.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_transport_failure_leaves_row_pending_with_error() {
    let codec = codec();
    let store = InMemoryOutboxStore::new();
    let row = outbox_row(&codec, &reserved("sku-1", 0));
    store.seed([row.clone()]);
    let broker = Arc::new(FailingBroker::new());
    let publisher = publisher(&store, Arc::clone(&broker) as _, enabled());

    let report = publisher.sweep(&ShutdownSignal::never()).await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.published, 0);
    let stored = store.row(row.id).unwrap();
    assert!(!stored.processed);
    assert_eq!(stored.processed_at_utc, None);
    assert!(stored.error.unwrap().contains("broker unavailable"));
    assert_eq!(store.commits(), 0);
    assert_eq!(store.rollbacks(), 1);
    assert_eq!(store.pending().await.unwrap().len(), 1);

    publisher.sweep(&ShutdownSignal::never()).await.unwrap();

    assert_eq!(broker.send_attempts(), 2);
}

#[tokio::test]
async fn test_failed_row_recovers_on_a_later_sweep() {
    let codec = codec();
    let store = InMemoryOutboxStore::new();
    let row = outbox_row(&codec, &reserved("sku-1", 0));
    store.seed([row.clone()]);
    publisher(&store, Arc::new(FailingBroker::new()), enabled())
        .sweep(&ShutdownSignal::never())
        .await
        .unwrap();

    let report = publisher(&store, Arc::new(InMemoryBroker::new()), enabled())
        .sweep(&ShutdownSignal::never())
        .await
        .unwrap();

    assert_eq!(report.published, 1);
    let stored = store.row(row.id).unwrap();
    assert!(stored.processed);
    assert_eq!(stored.error, None);
}

#[tokio::test]
async fn test_failure_diagnostic_write_errors_do_not_abort_the_sweep() {
    let codec = codec();
    let store = InMemoryOutboxStore::new();
    store.seed([
        outbox_row(&codec, &reserved("sku-1", 0)),
        outbox_row(&codec, &reserved("sku-2", 1)),
    ]);
    store.fail_updates();

    let report = publisher(&store, Arc::new(FailingBroker::new()), enabled())
        .sweep(&ShutdownSignal::never())
        .await
        .unwrap();

    assert_eq!(report.failed, 2);
    assert!(store.rows().iter().all(|row| !row.processed && row.error.is_none()));
}

#[tokio::test]
async fn test_disabled_publishing_makes_no_transport_calls() {
    let codec = codec();
    let store = InMemoryOutboxStore::new();
    store.seed([
        outbox_row(&codec, &reserved("sku-1", 0)),
        outbox_row(&codec, &reserved("sku-2", 1)),
    ]);
    let broker = Arc::new(FailingBroker::new());
    let publisher = publisher(
        &store,
        Arc::clone(&broker) as _,
        OutboxPublisherConfig::for_topic(None),
    );

    let report = publisher.sweep(&ShutdownSignal::never()).await.unwrap();

    assert_eq!(report.skipped_disabled, 2);
    assert_eq!(broker.send_attempts(), 0);
    assert!(store.rows().iter().all(|row| !row.processed));
}

#[tokio::test]
async fn test_enabled_without_topic_fails_at_construction() {
    let config = OutboxPublisherConfig {
        enabled: true,
        topic: None,
        ..OutboxPublisherConfig::default()
    };

    let result = OutboxPublisher::new(
        Arc::new(InMemoryOutboxStore::new()),
        Arc::new(TransportClientPool::new(Arc::new(InMemoryBroker::new()))),
        Arc::new(FixedClock(base_time())),
        config,
    );

    assert!(result.is_err());
}

#[tokio::test]
async fn test_begin_failure_counts_as_a_failed_row() {
    let codec = codec();
    let store = InMemoryOutboxStore::new();
    store.seed([outbox_row(&codec, &reserved("sku-1", 0))]);
    store.fail_begin();

    let report = publisher(&store, Arc::new(InMemoryBroker::new()), enabled())
        .sweep(&ShutdownSignal::never())
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert!(!store.rows()[0].processed);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let store = InMemoryOutboxStore::new();
    let publisher = publisher(&store, Arc::new(InMemoryBroker::new()), enabled());
    let (trigger, signal) = shopfront_messaging::shutdown::channel();
    let task = tokio::spawn(publisher.run(signal));

    trigger.trigger();

    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_during_publish_cancels_and_records_the_row() {
    let codec = codec();
    let store = InMemoryOutboxStore::new();
    let row = outbox_row(&codec, &reserved("sku-1", 0));
    store.seed([row.clone()]);
    let broker = Arc::new(StalledBroker::default());
    let send_started = Arc::clone(&broker.send_started);
    let publisher = publisher(&store, broker, enabled());
    let (trigger, signal) = shopfront_messaging::shutdown::channel();
    let sweep = tokio::spawn(async move { publisher.sweep(&signal).await });

    send_started.notified().await;
    trigger.trigger();
    let report = tokio::time::timeout(Duration::from_secs(1), sweep)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.published, 0);
    let stored = store.row(row.id).unwrap();
    assert!(!stored.processed);
    assert_eq!(stored.error.as_deref(), Some("operation cancelled by shutdown"));
    assert_eq!(store.commits(), 0);
    assert_eq!(store.rollbacks(), 1);
}
