//! Service lifecycle state machine.
//!
//! # States
//! ```text
//! Starting → Serving → Draining → Stopped
//! ```
//!
//! # Design Decisions
//! - Transitions only move forward; a stale transition is ignored
//! - State changes logged for observability
//! - Observers subscribe through a watch channel

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServiceState {
    Starting,
    Serving,
    Draining,
    Stopped,
}

/// Shared handle on the current [`ServiceState`].
#[derive(Debug, Clone)]
pub struct Lifecycle {
    tx: Arc<watch::Sender<ServiceState>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ServiceState::Starting);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> ServiceState {
        *self.tx.borrow()
    }

    /// Move to `next` if it is later than the current state.
    pub fn set(&self, next: ServiceState) -> bool {
        let changed = self.tx.send_if_modified(|state| {
            if next > *state {
                *state = next;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::info!(state = ?next, "Lifecycle state changed");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<ServiceState> {
        self.tx.subscribe()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
