//! Subscriber client: the broker receive loop that turns messages into inbox
//! rows.

use std::sync::Arc;
use std::time::Duration;

use shopfront_core::clock::Clock;
use shopfront_core::event::IntegrationEvent;
use shopfront_core::repository::{InboxRow, InboxStore};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::{
    BrokerConnection, MessageReceiver, MessageSettlement, ProcessorOptions, ReceivedMessage,
};
use crate::codec::EventCodec;
use crate::dispatcher::{Dispatcher, EventHandler};
use crate::error::MessagingError;
use crate::shutdown::{self, ShutdownSignal, ShutdownTrigger};

/// Dead-letter reason for payloads the codec cannot decode.
pub const DESERIALIZATION_FAILED: &str = "DeserializationFailed";

const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// What the receive callback did with one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Written to the inbox and completed.
    Stored,
    /// Undecodable. Dead-lettered.
    DeadLettered,
    /// Storing failed. Abandoned for redelivery.
    Abandoned,
    /// Settling the message failed. The broker redelivers it once the lock
    /// expires.
    Unsettled,
}

/// Everything the receive callback needs to accept a message into the inbox.
pub struct InboxIngest {
    codec: Arc<EventCodec>,
    dispatcher: Arc<Dispatcher>,
    inbox: Arc<dyn InboxStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InboxIngest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboxIngest")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl InboxIngest {
    /// Creates the receive-side pipeline.
    #[must_use]
    pub fn new(
        codec: Arc<EventCodec>,
        dispatcher: Arc<Dispatcher>,
        inbox: Arc<dyn InboxStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            codec,
            dispatcher,
            inbox,
            clock,
        }
    }

    /// Returns the dispatcher handlers are registered on.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Accepts one received message and settles it.
    pub async fn accept(&self, received: ReceivedMessage) -> IngestOutcome {
        let ReceivedMessage {
            message,
            settlement,
        } = received;

        let event = match self.codec.try_deserialize(&message.body) {
            Ok(event) => event,
            Err(decode_error) => {
                warn!(
                    message_id = %message.message_id,
                    subject = %message.subject,
                    error = %decode_error,
                    "dead-lettering undecodable message"
                );
                return match settlement
                    .dead_letter(DESERIALIZATION_FAILED, &decode_error.to_string())
                    .await
                {
                    Ok(()) => IngestOutcome::DeadLettered,
                    Err(settle_error) => unsettled(&message.message_id, &settle_error),
                };
            }
        };

        let row = InboxRow {
            id: event.message_id(),
            event_type: event.event_type().to_owned(),
            payload: message.body,
            timestamp: self.clock.now(),
        };
        if let Err(store_error) = self.inbox.insert(&row).await {
            warn!(
                message_id = %row.id,
                event_type = %row.event_type,
                error = %store_error,
                "failed to store inbox row, abandoning message"
            );
            return abandon(settlement.as_ref(), &message.message_id).await;
        }

        if let Err(settle_error) = settlement.complete().await {
            // The row is durable; redelivery is absorbed by the duplicate-safe
            // insert.
            warn!(
                message_id = %row.id,
                error = %settle_error,
                "stored inbox row but failed to complete message"
            );
        }
        debug!(message_id = %row.id, event_type = %row.event_type, "stored inbox row");
        IngestOutcome::Stored
    }
}

async fn abandon(settlement: &dyn MessageSettlement, message_id: &str) -> IngestOutcome {
    match settlement.abandon().await {
        Ok(()) => IngestOutcome::Abandoned,
        Err(settle_error) => unsettled(message_id, &settle_error),
    }
}

fn unsettled(message_id: &str, settle_error: &MessagingError) -> IngestOutcome {
    error!(message_id, error = %settle_error, "failed to settle message");
    IngestOutcome::Unsettled
}

struct RunningProcessor {
    trigger: ShutdownTrigger,
    task: JoinHandle<()>,
}

/// A subscription on one topic with its own receive loop.
///
/// Created through [`TransportClientPool::subscriber`].
///
/// [`TransportClientPool::subscriber`]: super::pool::TransportClientPool::subscriber
pub struct SubscriberClient {
    topic: String,
    subscription: String,
    broker: Arc<dyn BrokerConnection>,
    options: ProcessorOptions,
    ingest: Arc<InboxIngest>,
    running: Mutex<Option<RunningProcessor>>,
}

impl std::fmt::Debug for SubscriberClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberClient")
            .field("topic", &self.topic)
            .field("subscription", &self.subscription)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SubscriberClient {
    pub(crate) fn new(
        topic: String,
        subscription: String,
        broker: Arc<dyn BrokerConnection>,
        options: ProcessorOptions,
        ingest: Arc<InboxIngest>,
    ) -> Self {
        Self {
            topic,
            subscription,
            broker,
            options,
            ingest,
            running: Mutex::new(None),
        }
    }

    /// The topic this client receives from.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The subscription name.
    #[must_use]
    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    /// Binds `handler` to `E` on the shared dispatcher.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::DuplicateHandler` if `E` is already bound.
    pub fn register_handler<E, H>(&self, handler: H) -> Result<(), MessagingError>
    where
        E: IntegrationEvent,
        H: EventHandler<E> + 'static,
    {
        self.ingest.dispatcher().register::<E, H>(handler)
    }

    /// Removes the binding for `E`. Returns whether one existed.
    pub fn unregister_handler<E: IntegrationEvent>(&self) -> bool {
        self.ingest.dispatcher().unregister::<E>()
    }

    /// Starts the receive loop. Calling it while already running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::Transport` if the receiver cannot be created.
    pub async fn start_processing(&self) -> Result<(), MessagingError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!(topic = %self.topic, subscription = %self.subscription, "already processing");
            return Ok(());
        }

        let receiver = self
            .broker
            .create_receiver(&self.topic, &self.subscription, &self.options)?;
        let (trigger, signal) = shutdown::channel();
        let task = tokio::spawn(receive_loop(
            receiver,
            Arc::clone(&self.ingest),
            self.options.clone(),
            signal,
            self.topic.clone(),
            self.subscription.clone(),
        ));
        info!(topic = %self.topic, subscription = %self.subscription, "started processing");
        *running = Some(RunningProcessor { trigger, task });
        Ok(())
    }

    /// Stops the receive loop and waits for in-flight callbacks to finish.
    /// Calling it while stopped is a no-op.
    pub async fn stop_processing(&self) {
        let Some(processor) = self.running.lock().await.take() else {
            return;
        };
        processor.trigger.trigger();
        if let Err(join_error) = processor.task.await {
            error!(
                topic = %self.topic,
                subscription = %self.subscription,
                error = %join_error,
                "receive loop terminated abnormally"
            );
        }
        info!(topic = %self.topic, subscription = %self.subscription, "stopped processing");
    }

    /// Returns whether the receive loop is running.
    pub async fn is_processing(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

async fn receive_loop(
    mut receiver: Box<dyn MessageReceiver>,
    ingest: Arc<InboxIngest>,
    options: ProcessorOptions,
    shutdown: ShutdownSignal,
    topic: String,
    subscription: String,
) {
    let permits = Arc::new(Semaphore::new(options.max_concurrent_calls.max(1)));
    let mut in_flight = JoinSet::new();

    while !shutdown.is_shutdown() {
        while in_flight.try_join_next().is_some() {}

        let received = tokio::select! {
            () = shutdown.cancelled() => break,
            received = receiver.receive(options.prefetch_count.max(1)) => received,
        };

        let batch = match received {
            Ok(batch) => batch,
            Err(receive_error) => {
                warn!(%topic, %subscription, error = %receive_error, "receive failed, backing off");
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => continue,
                }
            }
        };

        // Messages already received are locked to this consumer, so they are
        // handed to callbacks even if shutdown arrives meanwhile.
        for message in batch {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let ingest = Arc::clone(&ingest);
            in_flight.spawn(async move {
                let _permit = permit;
                ingest.accept(message).await
            });
        }
    }

    while in_flight.join_next().await.is_some() {}
    debug!(%topic, %subscription, "receive loop drained");
}
