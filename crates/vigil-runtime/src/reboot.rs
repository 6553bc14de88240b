//! Host reboot capability.
//!
//! Rebooting is irreversible and usually needs root. The engine invokes it
//! at most once per escalation episode and never waits for the host to go
//! down; if the process survives the call, monitoring simply continues.

use std::path::PathBuf;

use tracing::{debug, error, warn};

use vigil_core::BoxFuture;

use crate::error::RebootError;

/// Capability to reboot the machine running the monitor.
pub trait HostReboot: Send + Sync {
    fn reboot(&self) -> BoxFuture<'_, Result<(), RebootError>>;
}

/// Runs `sync` to flush filesystem buffers, then the system reboot command.
#[derive(Debug, Clone)]
pub struct SystemReboot {
    sync_command: PathBuf,
    command: PathBuf,
}

impl Default for SystemReboot {
    fn default() -> Self {
        Self {
            sync_command: PathBuf::from("sync"),
            command: PathBuf::from("/sbin/reboot"),
        }
    }
}

impl SystemReboot {
    /// Use a different reboot executable.
    pub fn with_command(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Use a different flush executable.
    pub fn with_sync_command(mut self, sync_command: impl Into<PathBuf>) -> Self {
        self.sync_command = sync_command.into();
        self
    }

    /// Flush buffers. A failed flush is logged and the reboot goes ahead.
    async fn sync(&self) {
        let sync = self.sync_command.display().to_string();
        match tokio::process::Command::new(&self.sync_command).status().await {
            Ok(status) if status.success() => debug!(command = %sync, "filesystems synced"),
            Ok(status) => warn!(command = %sync, %status, "sync failed; rebooting anyway"),
            Err(e) => warn!(command = %sync, error = %e, "could not run sync; rebooting anyway"),
        }
    }

    async fn run(&self) -> Result<(), RebootError> {
        let command = self.command.display().to_string();
        warn!(%command, "attempting host reboot");

        self.sync().await;

        let status = tokio::process::Command::new(&self.command)
            .status()
            .await
            .map_err(|e| RebootError::Spawn {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        if status.success() {
            Ok(())
        } else {
            error!(%command, %status, "reboot command failed");
            Err(RebootError::Exit {
                command,
                status: status.to_string(),
            })
        }
    }
}

impl HostReboot for SystemReboot {
    fn reboot(&self) -> BoxFuture<'_, Result<(), RebootError>> {
        Box::pin(self.run())
    }
}
