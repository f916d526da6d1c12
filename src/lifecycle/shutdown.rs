//! Signal handling for graceful shutdown

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Turns SIGTERM/SIGINT into cancellation of the process-wide token
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Token cancelled once shutdown begins, from a signal or otherwise
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for a termination signal, then cancel the token
    ///
    /// Returns early if the token is cancelled some other way.
    pub async fn wait(&self) {
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                debug!("received SIGTERM");
            }
            _ = sigint.recv() => {
                debug!("received SIGINT");
            }
            _ = self.token.cancelled() => {
                return;
            }
        }
        info!("termination signal received");
        self.token.cancel();
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_returns_when_token_cancelled() {
        let signal = ShutdownSignal::new();
        let token = signal.token();
        token.cancel();
        signal.wait().await;
        assert!(signal.token().is_cancelled());
    }
}
