//! Signal handling for graceful shutdown.
//!
//! Bridges OS signals with the async runtime so the dispatcher can drain
//! in-flight requests before the process exits.

use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info};

/// Signal type for cross-task communication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    /// Graceful shutdown (SIGTERM/SIGINT).
    Shutdown,
}

/// Waits on SIGTERM and SIGINT concurrently and resolves to [`SignalType::Shutdown`]
/// on whichever arrives first.
pub async fn wait_for_shutdown_signal() -> SignalType {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

    debug!("waiting for SIGTERM or SIGINT");
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
    SignalType::Shutdown
}
