//! Process lifecycle: signal handling and draining background jobs.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Resolve on Ctrl+C or SIGTERM.
///
/// If a handler cannot be installed the failure is logged and that branch
/// never resolves, so the other signal still shuts the server down.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            warn!(%error, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(error) => {
                warn!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

/// Wait for background jobs to stop, giving each `timeout`.
pub async fn await_jobs(jobs: Vec<(&'static str, JoinHandle<()>)>, timeout: Duration) {
    for (name, handle) in jobs {
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => info!(job = name, "Job stopped gracefully"),
            Ok(Err(e)) => warn!(job = name, error = %e, "Job task failed"),
            Err(_) => warn!(job = name, "Job shutdown timed out"),
        }
    }
}
