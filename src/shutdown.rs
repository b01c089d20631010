//! Graceful shutdown coordinator.
//!
//! The first SIGINT, SIGTERM or SIGHUP cancels a [`CancellationToken`]; the
//! run finishes the album or record in flight, persists state, and stops.
//! A second signal force-exits with status 130. In watch mode the same token
//! cuts the wait between passes short.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Install signal handlers and return the token they cancel.
pub(crate) fn install_signal_handler() -> anyhow::Result<CancellationToken> {
    let token = CancellationToken::new();
    let count = Arc::new(AtomicU32::new(0));

    #[cfg(unix)]
    let (mut sigterm, mut sighup) = {
        use anyhow::Context;
        use tokio::signal::unix::{signal, SignalKind};
        (
            signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?,
            signal(SignalKind::hangup()).context("Failed to register SIGHUP handler")?,
        )
    };

    let handler_token = token.clone();
    tokio::spawn(async move {
        loop {
            #[cfg(unix)]
            {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                    _ = sighup.recv() => {}
                }
            }

            #[cfg(not(unix))]
            {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("Cannot listen for Ctrl+C: {}", e);
                    return;
                }
            }

            let prev = count.fetch_add(1, Ordering::SeqCst);
            if prev == 0 {
                tracing::info!("Received shutdown signal, finishing the current item...");
                tracing::info!("Press Ctrl+C again to force exit");
                handler_token.cancel();
            } else {
                tracing::warn!("Force exit requested");
                std::process::exit(130);
            }
        }
    });

    Ok(token)
}

/// Sleep until the next watch cycle. Returns `false` when the run should
/// stop instead: no interval was given, or shutdown was requested before or
/// during the wait.
pub(crate) async fn wait_for_next_cycle(
    interval: Option<Duration>,
    shutdown: &CancellationToken,
) -> bool {
    let Some(interval) = interval else {
        return false;
    };
    if shutdown.is_cancelled() {
        tracing::info!("Shutdown requested, exiting...");
        return false;
    }
    tracing::info!("Waiting {} seconds...", interval.as_secs());
    tokio::select! {
        _ = tokio::time::sleep(interval) => true,
        _ = shutdown.cancelled() => {
            tracing::info!("Shutdown during wait, exiting...");
            false
        }
    }
}
