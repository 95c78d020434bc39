//! Background forwarding of pending outbox rows to the broker.

use std::sync::Arc;
use std::time::Duration;

use shopfront_core::clock::Clock;
use shopfront_core::repository::{OutboxRow, OutboxStore};
use tracing::{debug, error, info, warn};

use crate::error::MessagingError;
use crate::shutdown::ShutdownSignal;
use crate::transport::BrokerMessage;
use crate::transport::pool::{PublisherClient, TransportClientPool};

/// Outbox publisher settings.
#[derive(Debug, Clone)]
pub struct OutboxPublisherConfig {
    /// Whether sweeps publish at all.
    pub enabled: bool,
    /// Topic every row is published to.
    pub topic: Option<String>,
    /// Delay between sweeps.
    pub sweep_interval: Duration,
}

impl Default for OutboxPublisherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            topic: None,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl OutboxPublisherConfig {
    /// Publishing is enabled exactly when a topic is given.
    #[must_use]
    pub fn for_topic(topic: Option<String>) -> Self {
        Self {
            enabled: topic.is_some(),
            topic,
            ..Self::default()
        }
    }

    /// Checks that an enabled publisher has somewhere to publish.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::Configuration` if publishing is enabled but
    /// the topic is missing or blank.
    pub fn validate(&self) -> Result<(), MessagingError> {
        if self.enabled && self.active_topic().is_none() {
            return Err(MessagingError::Configuration(
                "outbox publishing is enabled but no topic is configured".into(),
            ));
        }
        Ok(())
    }

    fn active_topic(&self) -> Option<&str> {
        self.topic
            .as_deref()
            .filter(|topic| self.enabled && !topic.trim().is_empty())
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboxSweepReport {
    /// Rows published and committed as processed.
    pub published: usize,
    /// Rows whose publish failed and were left pending.
    pub failed: usize,
    /// Pending rows left untouched because publishing is disabled.
    pub skipped_disabled: usize,
}

/// Sweeps pending outbox rows and publishes them.
pub struct OutboxPublisher {
    store: Arc<dyn OutboxStore>,
    pool: Arc<TransportClientPool>,
    clock: Arc<dyn Clock>,
    config: OutboxPublisherConfig,
}

impl std::fmt::Debug for OutboxPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxPublisher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OutboxPublisher {
    /// Creates a publisher.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::Configuration` if `config` is invalid.
    pub fn new(
        store: Arc<dyn OutboxStore>,
        pool: Arc<TransportClientPool>,
        clock: Arc<dyn Clock>,
        config: OutboxPublisherConfig,
    ) -> Result<Self, MessagingError> {
        config.validate()?;
        Ok(Self {
            store,
            pool,
            clock,
            config,
        })
    }

    /// Runs one sweep over every pending row.
    ///
    /// Each row is marked processed inside its own transaction, published,
    /// and only then committed. A failed publish rolls the transaction back
    /// and records the error on the row outside any transaction. One row's
    /// failure never stops the rest of the sweep.
    ///
    /// # Errors
    ///
    /// Returns an error only if the pending set cannot be loaded or the
    /// publisher client cannot be created.
    pub async fn sweep(&self, shutdown: &ShutdownSignal) -> Result<OutboxSweepReport, MessagingError> {
        let pending = self.store.pending().await.map_err(MessagingError::Persistence)?;
        let mut report = OutboxSweepReport::default();

        let Some(topic) = self.config.active_topic() else {
            debug!(pending = pending.len(), "outbox publishing disabled, skipping sweep");
            report.skipped_disabled = pending.len();
            return Ok(report);
        };
        if pending.is_empty() {
            return Ok(report);
        }

        let publisher = self.pool.publisher(topic).await?;
        for row in pending {
            if shutdown.is_shutdown() {
                break;
            }
            match self.publish_row(&publisher, &row, shutdown).await {
                Ok(()) => {
                    debug!(message_id = %row.id, event_type = %row.event_type, "published outbox row");
                    report.published += 1;
                }
                Err(publish_error) => {
                    warn!(
                        message_id = %row.id,
                        event_type = %row.event_type,
                        error = %publish_error,
                        "failed to publish outbox row"
                    );
                    report.failed += 1;
                    self.record_failure(row, &publish_error).await;
                }
            }
        }
        Ok(report)
    }

    async fn publish_row(
        &self,
        publisher: &PublisherClient,
        row: &OutboxRow,
        shutdown: &ShutdownSignal,
    ) -> Result<(), MessagingError> {
        let mut transaction = self.store.begin().await.map_err(MessagingError::Persistence)?;

        let mut processed = row.clone();
        processed.mark_processed(self.clock.now());
        transaction
            .update(&processed)
            .await
            .map_err(MessagingError::Persistence)?;

        let sent = tokio::select! {
            () = shutdown.cancelled() => Err(MessagingError::Cancelled),
            sent = publisher.publish(BrokerMessage::from_outbox_row(row)) => sent,
        };
        if let Err(publish_error) = sent {
            if let Err(rollback_error) = transaction.rollback().await {
                warn!(
                    message_id = %row.id,
                    error = %rollback_error,
                    "failed to roll back outbox transaction"
                );
            }
            return Err(publish_error);
        }

        transaction.commit().await.map_err(MessagingError::Persistence)
    }

    async fn record_failure(&self, mut row: OutboxRow, cause: &MessagingError) {
        row.mark_failed(cause.to_string());
        if let Err(store_error) = self.store.update(&row).await {
            error!(
                message_id = %row.id,
                error = %store_error,
                "failed to record outbox publish failure"
            );
        }
    }

    /// Sweeps on a fixed interval until shutdown.
    pub async fn run(self, shutdown: ShutdownSignal) {
        info!(
            topic = ?self.config.active_topic(),
            interval_secs = self.config.sweep_interval.as_secs(),
            "outbox publisher started"
        );
        while !shutdown.is_shutdown() {
            match self.sweep(&shutdown).await {
                Ok(report) if report.published + report.failed > 0 => info!(
                    published = report.published,
                    failed = report.failed,
                    "outbox sweep complete"
                ),
                Ok(_) => debug!("outbox sweep found nothing to publish"),
                Err(sweep_error) => error!(error = %sweep_error, "outbox sweep failed"),
            }
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.config.sweep_interval) => {}
            }
        }
        info!("outbox publisher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_without_topic_is_rejected() {
        let config = OutboxPublisherConfig {
            enabled: true,
            topic: None,
            ..OutboxPublisherConfig::default()
        };

        assert!(matches!(config.validate(), Err(MessagingError::Configuration(_))));
    }

    #[test]
    fn test_enabled_with_blank_topic_is_rejected() {
        let config = OutboxPublisherConfig {
            enabled: true,
            topic: Some("   ".into()),
            ..OutboxPublisherConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_topic_disables_publishing() {
        let config = OutboxPublisherConfig::for_topic(None);

        assert!(!config.enabled);
        assert!(config.validate().is_ok());
        assert_eq!(config.active_topic(), None);
    }

    #[test]
    fn test_disabled_flag_wins_over_topic() {
        let config = OutboxPublisherConfig {
            enabled: false,
            topic: Some("catalog".into()),
            ..OutboxPublisherConfig::default()
        };

        assert_eq!(config.active_topic(), None);
    }
}
