//! Player IPC transport.
//!
//! Spawns the external player with its stdin piped, writes segment bytes in
//! bounded chunks, and tears it down gracefully-then-forcefully on
//! cancellation or normal end. Grounded in the spawn/stop sequence used for
//! launching decoder subprocesses elsewhere in this codebase: close stdin,
//! wait a bounded time, then kill.

use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::PlayerConfig;
use crate::error::IpcError;

/// An external player process reachable over its stdin pipe.
pub struct PlayerHandle {
    child: Child,
    config: PlayerConfig,
}

impl PlayerHandle {
    /// Launches `command` (already split into program + args) with a piped
    /// stdin; stdout/stderr are inherited so the player's own UI still works.
    /// The engine never parses player output.
    pub fn spawn(command: &str, args: &[String]) -> Result<Self, IpcError> {
        let mut cmd = process_utils::tokio_command(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().map_err(|e| IpcError::Launch {
            reason: e.to_string(),
        })?;

        Ok(Self {
            child,
            config: PlayerConfig::default(),
        })
    }

    pub fn with_config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    /// Writes `bytes` to the player's stdin in chunks of at most
    /// `write_chunk_size`, racing cancellation between chunks.
    pub async fn write(&mut self, bytes: &[u8], cancel: &CancellationToken) -> Result<(), IpcError> {
        let stdin = self.child.stdin.as_mut().ok_or(IpcError::Disconnected)?;

        for chunk in bytes.chunks(self.config.write_chunk_size) {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(IpcError::Cancelled),
                result = stdin.write_all(chunk) => {
                    result.map_err(IpcError::from_write_error)?;
                }
            }
        }
        Ok(())
    }

    /// True while the process has not yet exited.
    pub async fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Closes stdin, waits up to `graceful_shutdown_timeout` for the process
    /// to exit on its own, then force-kills it.
    pub async fn close(mut self) {
        if let Some(mut stdin) = self.child.stdin.take() {
            let _ = stdin.shutdown().await;
        }

        match tokio::time::timeout(self.config.graceful_shutdown_timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(target: "tardsplaya::ipc", %status, "player exited");
            }
            Ok(Err(err)) => {
                warn!(target: "tardsplaya::ipc", error = %err, "error waiting for player exit");
            }
            Err(_) => {
                warn!(target: "tardsplaya::ipc", "player did not exit within grace period, killing");
                let _ = self.child.kill().await;
            }
        }
    }
}
