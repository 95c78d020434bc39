//! In-process routing from concrete event type to its single handler.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use shopfront_core::error::DomainError;
use shopfront_core::event::{DomainEvent, IntegrationEvent};
use tracing::debug;

use crate::error::MessagingError;
use crate::shutdown::ShutdownSignal;

/// Business handler for one concrete event type.
///
/// Delivery is at-least-once, so handlers must be idempotent.
#[async_trait]
pub trait EventHandler<E: IntegrationEvent>: Send + Sync {
    /// Handles one event.
    async fn handle(&self, event: &E, shutdown: &ShutdownSignal) -> Result<(), DomainError>;
}

/// Result of a dispatch that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The bound handler completed.
    Handled,
    /// Nothing is bound for the event's type.
    NoHandler,
}

#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn handle_erased(
        &self,
        event: &dyn DomainEvent,
        shutdown: &ShutdownSignal,
    ) -> Result<(), MessagingError>;
}

struct TypedHandler<E, H> {
    handler: H,
    _event: PhantomData<fn(E)>,
}

#[async_trait]
impl<E, H> ErasedHandler for TypedHandler<E, H>
where
    E: IntegrationEvent,
    H: EventHandler<E>,
{
    async fn handle_erased(
        &self,
        event: &dyn DomainEvent,
        shutdown: &ShutdownSignal,
    ) -> Result<(), MessagingError> {
        let Some(event) = event.as_any().downcast_ref::<E>() else {
            return Err(MessagingError::Configuration(format!(
                "handler for {} received {}",
                E::EVENT_TYPE,
                event.event_type()
            )));
        };
        self.handler
            .handle(event, shutdown)
            .await
            .map_err(MessagingError::Handler)
    }
}

/// Thread-safe routing table with at most one handler per event type.
#[derive(Default)]
pub struct Dispatcher {
    handlers: RwLock<HashMap<TypeId, Arc<dyn ErasedHandler>>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.len())
            .finish()
    }
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `handler` to `E`.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::DuplicateHandler` if `E` is already bound;
    /// the existing binding is left untouched.
    pub fn register<E, H>(&self, handler: H) -> Result<(), MessagingError>
    where
        E: IntegrationEvent,
        H: EventHandler<E> + 'static,
    {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        match handlers.entry(TypeId::of::<E>()) {
            Entry::Occupied(_) => Err(MessagingError::DuplicateHandler {
                event_type: E::EVENT_TYPE,
            }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(TypedHandler {
                    handler,
                    _event: PhantomData,
                }));
                debug!(event_type = E::EVENT_TYPE, "registered event handler");
                Ok(())
            }
        }
    }

    /// Removes the binding for `E`. Returns whether one existed.
    pub fn unregister<E: IntegrationEvent>(&self) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&TypeId::of::<E>())
            .is_some()
    }

    /// Returns whether `E` is bound.
    #[must_use]
    pub fn is_registered<E: IntegrationEvent>(&self) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&TypeId::of::<E>())
    }

    /// Returns whether the event's runtime type is bound.
    #[must_use]
    pub fn handles(&self, event: &dyn DomainEvent) -> bool {
        self.handler_for(event).is_some()
    }

    /// Number of bound handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes the handler bound to the event's runtime type.
    ///
    /// An unbound type is a logged no-op: a consumer sharing a topic need not
    /// care about every event published to it.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::Handler` if the handler fails.
    pub async fn dispatch(
        &self,
        event: &dyn DomainEvent,
        shutdown: &ShutdownSignal,
    ) -> Result<DispatchOutcome, MessagingError> {
        let Some(handler) = self.handler_for(event) else {
            debug!(
                event_type = event.event_type(),
                message_id = %event.message_id(),
                "no handler registered, skipping"
            );
            return Ok(DispatchOutcome::NoHandler);
        };
        handler.handle_erased(event, shutdown).await?;
        Ok(DispatchOutcome::Handled)
    }

    fn handler_for(&self, event: &dyn DomainEvent) -> Option<Arc<dyn ErasedHandler>> {
        let type_id = Any::type_id(event.as_any());
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&type_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use shopfront_core::event::EventMetadata;

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct OrderPlaced {
        #[serde(flatten)]
        metadata: EventMetadata,
        total: i64,
    }

    impl IntegrationEvent for OrderPlaced {
        const EVENT_TYPE: &'static str = "test.order_placed";

        fn metadata(&self) -> &EventMetadata {
            &self.metadata
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct OrderCancelled {
        #[serde(flatten)]
        metadata: EventMetadata,
    }

    impl IntegrationEvent for OrderCancelled {
        const EVENT_TYPE: &'static str = "test.order_cancelled";

        fn metadata(&self) -> &EventMetadata {
            &self.metadata
        }
    }

    #[derive(Default)]
    struct Totals {
        label: &'static str,
        seen: Arc<Mutex<Vec<(&'static str, i64)>>>,
    }

    #[async_trait]
    impl EventHandler<OrderPlaced> for Totals {
        async fn handle(&self, event: &OrderPlaced, _: &ShutdownSignal) -> Result<(), DomainError> {
            self.seen.lock().unwrap().push((self.label, event.total));
            Ok(())
        }
    }

    struct Rejecting;

    #[async_trait]
    impl EventHandler<OrderPlaced> for Rejecting {
        async fn handle(&self, _: &OrderPlaced, _: &ShutdownSignal) -> Result<(), DomainError> {
            Err(DomainError::Validation("total too large".into()))
        }
    }

    fn placed(total: i64) -> OrderPlaced {
        OrderPlaced {
            metadata: EventMetadata::for_event::<OrderPlaced>(Utc::now(), None),
            total,
        }
    }

    #[tokio::test]
    async fn test_dispatch_invokes_bound_handler() {
        let dispatcher = Dispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        dispatcher
            .register::<OrderPlaced, _>(Totals { label: "first", seen: Arc::clone(&seen) })
            .unwrap();

        let outcome = dispatcher
            .dispatch(&placed(250), &ShutdownSignal::never())
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Handled);
        assert_eq!(*seen.lock().unwrap(), vec![("first", 250)]);
    }

    #[tokio::test]
    async fn test_second_registration_fails_and_keeps_first_binding() {
        let dispatcher = Dispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        dispatcher
            .register::<OrderPlaced, _>(Totals { label: "first", seen: Arc::clone(&seen) })
            .unwrap();

        let second = dispatcher
            .register::<OrderPlaced, _>(Totals { label: "second", seen: Arc::clone(&seen) });

        assert!(matches!(
            second,
            Err(MessagingError::DuplicateHandler { event_type: "test.order_placed" })
        ));
        dispatcher
            .dispatch(&placed(1), &ShutdownSignal::never())
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![("first", 1)]);
    }

    #[tokio::test]
    async fn test_unbound_type_is_a_no_op() {
        let dispatcher = Dispatcher::new();
        let cancelled = OrderCancelled {
            metadata: EventMetadata::for_event::<OrderCancelled>(Utc::now(), None),
        };

        let outcome = dispatcher
            .dispatch(&cancelled, &ShutdownSignal::never())
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::NoHandler);
    }

    #[tokio::test]
    async fn test_handler_failure_propagates() {
        let dispatcher = Dispatcher::new();
        dispatcher.register::<OrderPlaced, _>(Rejecting).unwrap();

        let result = dispatcher.dispatch(&placed(1), &ShutdownSignal::never()).await;

        assert!(matches!(result, Err(MessagingError::Handler(DomainError::Validation(_)))));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let dispatcher = Dispatcher::new();
        dispatcher.register::<OrderPlaced, _>(Rejecting).unwrap();

        assert!(dispatcher.unregister::<OrderPlaced>());
        assert!(!dispatcher.unregister::<OrderPlaced>());
        assert!(!dispatcher.is_registered::<OrderPlaced>());
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_handles_resolves_runtime_type_of_boxed_event() {
        let dispatcher = Dispatcher::new();
        dispatcher.register::<OrderPlaced, _>(Rejecting).unwrap();
        let boxed: Box<dyn DomainEvent> = Box::new(placed(3));

        assert!(dispatcher.handles(boxed.as_ref()));
    }
}
