//! Signal handling for graceful node shutdown.
//!
//! Shutdown order matters for a mesh node: the unregister events must go out
//! while the bus connection is still healthy, so the signal handler only
//! *reports* the signal and leaves teardown sequencing to the caller.

use tokio::signal;
use tracing::info;

/// Waits for a termination signal.
///
/// Returns when one is received, allowing the caller to withdraw
/// registrations and stop the consumer loops before exiting.
///
/// # Platform Support
///
/// * **Unix platforms**: Handles SIGINT and SIGTERM signals
/// * **Windows**: Handles Ctrl+C signal
pub async fn wait_for_shutdown() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("📡 Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("📡 Received SIGTERM");
            }
        }
    }

    #[cfg(windows)]
    {
        signal::ctrl_c().await?;
        info!("📡 Received Ctrl+C");
    }

    Ok(())
}
