//! Server lifecycle helpers.

use axum::Router;
use std::future::IntoFuture;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;

/// Serve `router` until Ctrl+C or SIGTERM, then drain in-flight requests.
///
/// Requests still running `drain_timeout` after the signal are abandoned.
///
/// # Errors
///
/// Returns the I/O error that stopped the server.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    drain_timeout: Duration,
) -> std::io::Result<()> {
    let (signalled_tx, mut signalled_rx) = watch::channel(false);

    let server = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signalled_tx.send(true);
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result,
        _ = signalled_rx.changed() => {},
    }

    if let Ok(result) = tokio::time::timeout(drain_timeout, server).await {
        result
    } else {
        tracing::warn!(
            timeout_secs = drain_timeout.as_secs(),
            "Graceful shutdown timed out, abandoning in-flight requests"
        );
        Ok(())
    }
}

/// Resolve when the process receives Ctrl+C or SIGTERM.
///
/// If a signal handler cannot be installed the failure is logged and that
/// signal is ignored.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
