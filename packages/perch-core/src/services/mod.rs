//! Watchdog services.
//!
//! Long-running loops that keep the appliance's playback session alive and
//! owned. Each loop runs as an independent tokio task, shares the identity
//! handle, and observes the supervisor's cancellation token for shutdown.

pub mod ownership_monitor;
pub mod playback_reconciler;

pub use ownership_monitor::OwnershipMonitor;
pub use playback_reconciler::{LinkState, PlaybackReconciler};
