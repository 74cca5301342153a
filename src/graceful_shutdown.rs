//! # Graceful Shutdown Module
//!
//! Turns process signals into cancellation of a root [`CancellationToken`].
//!
//! Every benchmark, stream and retry loop in the crate is governed by a token
//! derived from this root, so a single Ctrl+C stops admission of new runs,
//! unblocks pending reads and backoff waits, and releases every open response
//! body before the process exits.
//!
//! ## Signals:
//! - SIGINT (Ctrl+C) on every platform
//! - SIGTERM and SIGQUIT on unix

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Waits until the process receives a shutdown signal.
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal as unix_signal, SignalKind};

        let mut sigterm = unix_signal(SignalKind::terminate())?;
        let mut sigquit = unix_signal(SignalKind::quit())?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("📡 Received SIGINT (Ctrl+C)");
            }
            _ = sigterm.recv() => info!("📡 Received SIGTERM"),
            _ = sigquit.recv() => info!("📡 Received SIGQUIT"),
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("📡 Received Ctrl+C");
        Ok(())
    }
}

/// Returns a root token that is cancelled on the first shutdown signal.
///
/// Must be called from within a tokio runtime. If the signal handlers cannot be
/// installed the token is never cancelled by a signal.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            // Stop listening once the token is cancelled elsewhere.
            _ = trigger.cancelled() => {}
            result = wait_for_shutdown_signal() => match result {
                Ok(()) => {
                    info!("🛑 Shutting down, cancelling in-flight work");
                    trigger.cancel();
                }
                Err(err) => error!("❌ Failed to listen for shutdown signals: {}", err),
            },
        }
    });

    token
}
