//! Background dispatch of stored inbox rows.

use std::sync::Arc;
use std::time::Duration;

use shopfront_core::repository::InboxStore;
use tracing::{debug, error, info, warn};

use crate::codec::EventCodec;
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::MessagingError;
use crate::shutdown::ShutdownSignal;

/// Inbox poller settings.
#[derive(Debug, Clone)]
pub struct InboxPollerConfig {
    /// Maximum rows handled per sweep.
    pub batch_size: usize,
    /// Delay between sweeps.
    pub poll_interval: Duration,
}

impl Default for InboxPollerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval: Duration::from_secs(60),
        }
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboxSweepReport {
    /// Rows handled and deleted.
    pub dispatched: usize,
    /// Rows whose handler or delete failed. Left pending.
    pub failed: usize,
    /// Rows nobody handles. Left pending.
    pub skipped_unhandled: usize,
    /// Rows the codec cannot decode. Left pending.
    pub skipped_undecodable: usize,
}

/// Feeds the oldest inbox rows to the dispatcher and deletes them once
/// handled.
pub struct InboxPoller {
    store: Arc<dyn InboxStore>,
    codec: Arc<EventCodec>,
    dispatcher: Arc<Dispatcher>,
    config: InboxPollerConfig,
}

impl std::fmt::Debug for InboxPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboxPoller")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl InboxPoller {
    /// Creates a poller.
    #[must_use]
    pub fn new(
        store: Arc<dyn InboxStore>,
        codec: Arc<EventCodec>,
        dispatcher: Arc<Dispatcher>,
        config: InboxPollerConfig,
    ) -> Self {
        Self {
            store,
            codec,
            dispatcher,
            config,
        }
    }

    /// Handles up to `batch_size` of the oldest rows.
    ///
    /// The row's stored event type selects the decode target. A row is
    /// deleted only after its handler succeeds; failing, unhandled and
    /// undecodable rows stay pending for the next sweep.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::Persistence` if the batch cannot be loaded.
    pub async fn sweep(&self, shutdown: &ShutdownSignal) -> Result<InboxSweepReport, MessagingError> {
        let rows = self
            .store
            .oldest_pending(self.config.batch_size)
            .await
            .map_err(MessagingError::Persistence)?;
        let mut report = InboxSweepReport::default();

        for row in rows {
            if shutdown.is_shutdown() {
                break;
            }

            let Some(event) = self.codec.deserialize_as(&row.event_type, &row.payload) else {
                warn!(message_id = %row.id, event_type = %row.event_type, "inbox row is undecodable, leaving it pending");
                report.skipped_undecodable += 1;
                continue;
            };

            match self.dispatcher.dispatch(event.as_ref(), shutdown).await {
                Ok(DispatchOutcome::Handled) => match self.store.delete(row.id).await {
                    Ok(()) => {
                        debug!(message_id = %row.id, event_type = %row.event_type, "dispatched inbox row");
                        report.dispatched += 1;
                    }
                    Err(delete_error) => {
                        warn!(message_id = %row.id, error = %delete_error, "handled inbox row but failed to delete it");
                        report.failed += 1;
                    }
                },
                Ok(DispatchOutcome::NoHandler) => {
                    warn!(message_id = %row.id, event_type = %row.event_type, "no handler registered for inbox row, leaving it pending");
                    report.skipped_unhandled += 1;
                }
                Err(dispatch_error) => {
                    warn!(
                        message_id = %row.id,
                        event_type = %row.event_type,
                        error = %dispatch_error,
                        "inbox handler failed"
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Sweeps on a fixed interval until shutdown.
    pub async fn run(self, shutdown: ShutdownSignal) {
        info!(
            batch_size = self.config.batch_size,
            interval_secs = self.config.poll_interval.as_secs(),
            "inbox poller started"
        );
        while !shutdown.is_shutdown() {
            match self.sweep(&shutdown).await {
                Ok(report) if report == InboxSweepReport::default() => {
                    debug!("inbox sweep found nothing to dispatch");
                }
                Ok(report) => info!(
                    dispatched = report.dispatched,
                    failed = report.failed,
                    skipped_unhandled = report.skipped_unhandled,
                    skipped_undecodable = report.skipped_undecodable,
                    "inbox sweep complete"
                ),
                Err(sweep_error) => error!(error = %sweep_error, "inbox sweep failed"),
            }
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
        info!("inbox poller stopped");
    }
}
