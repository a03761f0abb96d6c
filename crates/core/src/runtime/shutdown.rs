use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Manages graceful shutdown via CancellationToken.
/// Listens for SIGTERM and Ctrl+C and cancels the token.
#[derive(Debug)]
pub struct ShutdownGuard {
    token: CancellationToken,
}

impl ShutdownGuard {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// The cancellation token that the listener and runtime monitor.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a background task that listens for OS signals and triggers cancellation.
    pub fn spawn_signal_listener(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = terminate() => tracing::info!("received SIGTERM, initiating shutdown"),
                result = signal::ctrl_c() => match result {
                    Ok(()) => tracing::info!("received Ctrl+C, initiating shutdown"),
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to listen for Ctrl+C");
                        return;
                    }
                },
                _ = token.cancelled() => return,
            }
            token.cancel();
        });
    }
}

impl Default for ShutdownGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            let _ = sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to register SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
