use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancels a token on the first SIGINT or SIGTERM. The load command races
/// its run against that token and aborts the loader when it fires.
#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns the signal listener and returns the token it will cancel.
    pub fn listen(&self) -> CancellationToken {
        let token = self.token.clone();
        tokio::spawn(async move {
            let signal = wait_for_signal().await;
            info!(signal, "Shutdown signal received, aborting load");
            token.cancel();
        });
        self.token.clone()
    }
}

async fn wait_for_signal() -> &'static str {
    tokio::select! {
        _ = interrupt() => "SIGINT",
        _ = terminate() => "SIGTERM",
    }
}

async fn interrupt() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "SIGINT handler unavailable");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

/// Process exit status for each way a command can end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    // 128 + SIGINT
    ShutdownRequested = 130,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}
