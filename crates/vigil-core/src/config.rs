//! Monitor configuration.
//!
//! Built once at startup (the daemon fills it from CLI flags and the
//! environment) and shared read-only as `Arc<MonitorConfig>`.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Immutable configuration for one monitored target.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Absolute `http://` or `https://` URL probed every tick.
    pub target_url: String,
    /// Steady-state delay between ticks.
    pub poll_interval: Duration,
    /// Consecutive failures before the recovery ladder runs.
    pub failure_threshold: u32,
    /// Maximum restart attempts per ladder.
    pub retry_restart_count: u32,
    /// Reboot the host once the ladder is exhausted.
    pub reboot_on_failure: bool,
    /// Name of the container to restart.
    pub workload: String,
    /// Path of the container runtime control socket.
    pub runtime_socket: PathBuf,
    pub timing: Timing,
    pub smtp: SmtpConfig,
}

/// Fixed waits and timeouts used inside a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Upper bound for a single health probe.
    pub probe_timeout: Duration,
    /// Grace period the runtime gives the workload to stop on restart.
    pub restart_timeout: Duration,
    /// Wait after a restart before re-probing.
    pub post_restart_grace: Duration,
    /// Wait between two restart attempts.
    pub retry_delay: Duration,
    /// Wait after an escalation tick, instead of the poll interval.
    pub cooldown: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(10),
            restart_timeout: Duration::from_secs(10),
            post_restart_grace: Duration::from_secs(10),
            retry_delay: Duration::from_secs(5),
            cooldown: Duration::from_secs(30),
        }
    }
}

/// SMTP relay settings. Every field except the port is optional; delivery
/// is skipped unless all of them are present.
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub timeout: Duration,
}

/// A complete set of SMTP settings, extracted from [`SmtpConfig`].
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for SmtpCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SmtpConfig {
    /// Returns the settings only if host, credentials, and both addresses
    /// are configured and non-empty.
    pub fn credentials(&self) -> Option<SmtpCredentials> {
        fn present(v: &Option<String>) -> Option<String> {
            v.as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
        }

        Some(SmtpCredentials {
            host: present(&self.host)?,
            port: self.port,
            username: present(&self.username)?,
            password: present(&self.password)?,
            from: present(&self.from)?,
            to: present(&self.to)?,
            timeout: self.timeout,
        })
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
            username: None,
            password: None,
            from: None,
            to: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("from", &self.from)
            .field("to", &self.to)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            target_url: "http://app:8000/health".to_string(),
            poll_interval: Duration::from_secs(15),
            failure_threshold: 3,
            retry_restart_count: 2,
            reboot_on_failure: false,
            workload: "sample_app".to_string(),
            runtime_socket: PathBuf::from("/var/run/docker.sock"),
            timing: Timing::default(),
            smtp: SmtpConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Check that the target is an absolute http(s) URL and that every count
    /// and duration is positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url_err = |reason: &str| ConfigError::TargetUrl {
            url: self.target_url.clone(),
            reason: reason.to_string(),
        };
        let uri: http::Uri = self
            .target_url
            .parse()
            .map_err(|e: http::uri::InvalidUri| url_err(&e.to_string()))?;
        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            Some(other) => return Err(url_err(&format!("unsupported scheme '{other}'"))),
            None => return Err(url_err("missing scheme")),
        }
        if uri.host().is_none() {
            return Err(url_err("missing host"));
        }

        if self.failure_threshold == 0 {
            return Err(ConfigError::NotPositive("failure threshold"));
        }
        if self.retry_restart_count == 0 {
            return Err(ConfigError::NotPositive("restart retry count"));
        }
        if self.workload.trim().is_empty() {
            return Err(ConfigError::EmptyWorkload);
        }

        let durations = [
            ("poll interval", self.poll_interval),
            ("probe timeout", self.timing.probe_timeout),
            ("restart timeout", self.timing.restart_timeout),
            ("post-restart grace period", self.timing.post_restart_grace),
            ("retry delay", self.timing.retry_delay),
            ("cool-down interval", self.timing.cooldown),
            ("smtp timeout", self.smtp.timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::NotPositive(name));
            }
        }
        if self.smtp.port == 0 {
            return Err(ConfigError::NotPositive("smtp port"));
        }

        Ok(())
    }
}
