//! Broker doubles.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use shopfront_messaging::transport::{
    BrokerConnection, BrokerMessage, MessageReceiver, MessageSender, ProcessorOptions,
};
use shopfront_messaging::MessagingError;

/// A broker whose senders always fail and whose receivers cannot be created.
#[derive(Debug, Default)]
pub struct FailingBroker {
    attempts: Arc<AtomicUsize>,
}

impl FailingBroker {
    /// Creates the broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of send attempts made through any sender.
    #[must_use]
    pub fn send_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

struct FailingSender {
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl MessageSender for FailingSender {
    async fn send(&self, _message: BrokerMessage) -> Result<(), MessagingError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(MessagingError::Transport("broker unavailable".into()))
    }
}

impl BrokerConnection for FailingBroker {
    fn create_sender(&self, _topic: &str) -> Result<Arc<dyn MessageSender>, MessagingError> {
        Ok(Arc::new(FailingSender {
            attempts: Arc::clone(&self.attempts),
        }))
    }

    fn create_receiver(
        &self,
        _topic: &str,
        _subscription: &str,
        _options: &ProcessorOptions,
    ) -> Result<Box<dyn MessageReceiver>, MessagingError> {
        Err(MessagingError::Transport("broker unavailable".into()))
    }
}
