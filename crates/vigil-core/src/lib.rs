//! vigil-core — shared types for the Vigil liveness monitor.
//!
//! Holds the immutable [`MonitorConfig`] that every component receives at
//! startup, the reportable [`HealthStatus`], and small host helpers.

pub mod config;
pub mod error;
pub mod types;

pub use config::{MonitorConfig, SmtpConfig, SmtpCredentials, Timing};
pub use error::ConfigError;
pub use types::*;
