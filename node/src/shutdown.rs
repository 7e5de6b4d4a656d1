//! Graceful shutdown for the certchain daemon.
//!
//! Listens for SIGINT/SIGTERM and broadcasts to every subsystem through a
//! `tokio::sync::broadcast` channel. The event poller checks the channel
//! between cycles and between event kinds; the HTTP server uses it for
//! graceful shutdown.

use tokio::signal;
use tokio::sync::broadcast;

/// Coordinates graceful shutdown across the poller and the HTTP server.
///
/// Subsystems call [`ShutdownController::subscribe`] and `select!` on the
/// receiver alongside their main loop.
#[derive(Clone)]
pub struct ShutdownController {
    tx: broadcast::Sender<()>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }

    /// Wait for SIGTERM or SIGINT, then trigger shutdown.
    ///
    /// If the SIGTERM handler cannot be installed only SIGINT is awaited.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "SIGTERM handler unavailable");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => { tracing::info!("received SIGINT, shutting down"); }
            _ = terminate => { tracing::info!("received SIGTERM, shutting down"); }
        }

        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_are_notified() {
        let controller = ShutdownController::new();
        let mut poller = controller.subscribe();
        let mut http = controller.clone().subscribe();
        controller.shutdown();
        assert!(poller.recv().await.is_ok());
        assert!(http.recv().await.is_ok());
    }

    #[tokio::test]
    async fn late_subscriber_sees_nothing() {
        let controller = ShutdownController::new();
        controller.shutdown();
        let mut rx = controller.subscribe();
        assert!(rx.try_recv().is_err());
    }
}
