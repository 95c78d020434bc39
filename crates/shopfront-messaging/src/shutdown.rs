//! Cooperative shutdown signal for background loops.
//!
//! Loops check [`ShutdownSignal::is_shutdown`] between iterations and race
//! their awaits against [`ShutdownSignal::cancelled`], so an external
//! shutdown request unwinds promptly instead of waiting out a full sweep.

use tokio::sync::watch;

/// Sending half. Triggering is idempotent.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving half. Cheap to clone and pass into every task.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Creates a connected trigger/signal pair.
#[must_use]
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

impl ShutdownTrigger {
    /// Requests shutdown of every task holding a connected signal.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Returns a new signal connected to this trigger.
    #[must_use]
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl ShutdownSignal {
    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        let (_trigger, signal) = channel();
        signal
    }

    /// Returns `true` once shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes when shutdown is requested. Pends forever if the trigger
    /// was dropped without firing.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
