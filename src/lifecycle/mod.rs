//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Resolve identity → Install telemetry → Build clients → Bind
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Cancel outbound → Drain → Hook → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!
//! State (state.rs):
//!     Starting → Serving → Draining → Stopped
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then telemetry, then clients, then listener
//! - Shutdown has a grace period: in-flight requests are abandoned after it
//! - The shutdown hook is one-shot

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use shutdown::{Shutdown, ShutdownHook, FAREWELL};
pub use startup::{bootstrap, build_server, Service, StartupError};
pub use state::{Lifecycle, ServiceState};
