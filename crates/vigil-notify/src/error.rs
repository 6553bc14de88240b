//! Error types for notification delivery.

use std::time::Duration;

use thiserror::Error;

/// Reasons an SMTP delivery attempt failed.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("authentication rejected: {code} {message}")]
    Auth { code: u16, message: String },

    #[error("relay offers no supported auth mechanism (offered: '{0}')")]
    NoAuthMechanism(String),

    #[error("unexpected reply to {command}: {code} {message}")]
    Reply {
        command: &'static str,
        code: u16,
        message: String,
    },

    #[error("no recipients in '{0}'")]
    NoRecipients(String),

    #[error("malformed reply: {0}")]
    Malformed(String),

    #[error("delivery task failed: {0}")]
    Task(String),

    #[error("delivery did not finish within {0:?}")]
    Timeout(Duration),
}
