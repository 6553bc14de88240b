//! Error types for configuration validation.

use thiserror::Error;

/// Errors raised while validating a [`crate::MonitorConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid target url '{url}': {reason}")]
    TargetUrl { url: String, reason: String },

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("workload identifier must not be empty")]
    EmptyWorkload,
}
