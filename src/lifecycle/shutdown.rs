//! Shutdown coordination for the service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::clients::{ClientError, ObjectStore};
use crate::observability::Logger;

pub const FAREWELL: &str = "Goodbye 👋";

/// Coordinator for programmatic shutdown.
///
/// Provides a broadcast channel that long-running tasks can subscribe to.
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// A future resolving once [`trigger`](Self::trigger) is called.
    pub fn signal(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            // A closed channel also means shutdown.
            let _ = rx.recv().await;
        }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases held clients and says goodbye. Runs at most once.
pub struct ShutdownHook {
    storage: Arc<dyn ObjectStore>,
    logger: Logger,
    fired: AtomicBool,
}

impl ShutdownHook {
    pub fn new(storage: Arc<dyn ObjectStore>, logger: Logger) -> Self {
        Self {
            storage,
            logger,
            fired: AtomicBool::new(false),
        }
    }

    /// Close the object store and log the farewell.
    ///
    /// Returns `Ok(false)` when the hook already ran. The farewell is logged
    /// even if closing the store fails.
    pub async fn run(&self) -> Result<bool, ClientError> {
        if self.fired.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }

        let closed = self.storage.close().await;
        self.logger.notice(FAREWELL, None);
        closed.map(|()| true)
    }

    pub fn has_run(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}
