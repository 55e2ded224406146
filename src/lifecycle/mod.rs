//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (manager.rs):
//!     Pick endpoint source → start tunnel if needed → join webhook path → register
//!
//! Shutdown (shutdown.rs, manager.rs):
//!     Signal / stop keyword / tunnel loss → deregister → stop tunnel → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//! ```
//!
//! # Design Decisions
//! - The HTTP listener is bound before startup; the SERVING state gates traffic
//! - Shutdown is triggered through a cancellation token, never by signalling ourselves
//! - Shutdown is not cancellable once initiated

pub mod manager;
pub mod shutdown;
pub mod signals;
pub mod state;

pub use manager::{webhook_url, LifecycleManager, StartupError};
pub use shutdown::{Shutdown, ShutdownReason};
pub use signals::spawn_signal_listener;
pub use state::{LifecycleState, StateCell};
