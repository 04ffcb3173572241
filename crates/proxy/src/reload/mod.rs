//! Graceful shutdown: request draining plus OS signal handling.

pub mod coordinator;
pub mod signals;

pub use coordinator::GracefulReloadCoordinator;
pub use signals::{wait_for_shutdown_signal, SignalType};
