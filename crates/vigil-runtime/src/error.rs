//! Error types for the runtime capabilities.

use std::time::Duration;

use thiserror::Error;

/// Failures talking to the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("connect to {socket}: {reason}")]
    Connect { socket: String, reason: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("runtime did not answer within {0:?}")]
    Timeout(Duration),

    #[error("runtime returned {status}: {message}")]
    Status { status: u16, message: String },
}

/// Failures invoking the host reboot.
#[derive(Debug, Error)]
pub enum RebootError {
    #[error("failed to run {command}: {reason}")]
    Spawn { command: String, reason: String },

    #[error("{command} exited with {status}")]
    Exit { command: String, status: String },
}
