//! Process signals that end a run.

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Stop requests from a user or a supervisor.
///
/// The ephemeral node runs in its own process group, so it never sees the
/// signals sent to the CLI. Every stop request must go through
/// `Engine::shutdown` instead.
pub struct Shutdown {
    #[cfg(unix)]
    terminate: Signal,
    #[cfg(unix)]
    hangup: Signal,
}

impl Shutdown {
    /// Install the handlers. From here on SIGTERM and SIGHUP no longer end
    /// the process on their own.
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: signal(SignalKind::terminate())?,
            #[cfg(unix)]
            hangup: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for the first stop request and return its name.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            Ok(()) = tokio::signal::ctrl_c() => "SIGINT",
            Some(()) = self.terminate.recv() => "SIGTERM",
            Some(()) = self.hangup.recv() => "SIGHUP",
            else => std::future::pending().await,
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "Ctrl-C",
            Err(_) => std::future::pending().await,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_sigterm_is_a_stop_request() {
        let mut shutdown = Shutdown::install().unwrap();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let signal = tokio::time::timeout(Duration::from_secs(5), shutdown.recv())
            .await
            .expect("SIGTERM should be reported");
        assert_eq!(signal, "SIGTERM");
    }
}
