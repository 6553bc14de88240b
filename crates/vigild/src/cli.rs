//! Command-line and environment configuration.
//!
//! Every monitor option can be given as a flag or through the environment
//! variable named next to it; flags win. Defaults match a stock deployment
//! next to a container called `sample_app`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use vigil_core::{ConfigError, MonitorConfig, SmtpConfig, Timing};

#[derive(Debug, Parser)]
#[command(name = "vigild", about = "Vigil liveness monitor daemon", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Monitor the target until interrupted.
    Run {
        #[command(flatten)]
        monitor: MonitorArgs,

        /// Serve /healthz and /status on this address.
        #[arg(long, env = "STATUS_ADDR")]
        status_addr: Option<SocketAddr>,
    },
    /// Probe the target once and exit non-zero unless it is healthy.
    Probe {
        #[command(flatten)]
        monitor: MonitorArgs,
    },
    /// Send a test notification through the configured relay.
    NotifyTest {
        #[command(flatten)]
        monitor: MonitorArgs,
    },
}

#[derive(Debug, Clone, Args)]
pub struct MonitorArgs {
    /// URL probed on every tick.
    #[arg(long, env = "TARGET_URL", default_value = "http://app:8000/health")]
    pub target_url: String,

    /// Seconds between probes while not escalating.
    #[arg(long, env = "CHECK_INTERVAL", default_value_t = 15)]
    pub check_interval: u64,

    /// Consecutive failures before escalating.
    #[arg(long, env = "FAILURE_THRESHOLD", default_value_t = 3)]
    pub failure_threshold: u32,

    /// Restart attempts per escalation.
    #[arg(long, env = "RETRY_RESTART", default_value_t = 2)]
    pub retry_restart: u32,

    /// Reboot the host when restarts do not help.
    #[arg(
        long,
        env = "REBOOT_ON_FAILURE",
        default_value = "false",
        value_parser = parse_flag,
        action = clap::ArgAction::Set
    )]
    pub reboot_on_failure: bool,

    /// Container to restart.
    #[arg(long, env = "CONTAINER_NAME", default_value = "sample_app")]
    pub container_name: String,

    /// Container runtime control socket.
    #[arg(long, env = "DOCKER_SOCKET", default_value = "/var/run/docker.sock")]
    pub docker_socket: PathBuf,

    /// Seconds before a probe gives up.
    #[arg(long, env = "PROBE_TIMEOUT", default_value_t = 10)]
    pub probe_timeout: u64,

    /// Seconds the container gets to stop during a restart.
    #[arg(long, env = "RESTART_TIMEOUT", default_value_t = 10)]
    pub restart_timeout: u64,

    /// Seconds to wait after a restart before re-probing.
    #[arg(long, env = "RESTART_GRACE", default_value_t = 10)]
    pub restart_grace: u64,

    /// Seconds between restart attempts.
    #[arg(long, env = "RETRY_DELAY", default_value_t = 5)]
    pub retry_delay: u64,

    /// Seconds to wait after an escalation before probing again.
    #[arg(long, env = "COOLDOWN", default_value_t = 30)]
    pub cooldown: u64,

    #[arg(long, env = "SMTP_HOST")]
    pub smtp_host: Option<String>,

    #[arg(long, env = "SMTP_PORT", default_value_t = 587)]
    pub smtp_port: u16,

    #[arg(long, env = "SMTP_USER")]
    pub smtp_user: Option<String>,

    #[arg(long, env = "SMTP_PASS", hide_env_values = true)]
    pub smtp_pass: Option<String>,

    #[arg(long, env = "ALERT_FROM")]
    pub alert_from: Option<String>,

    /// Comma-separated recipients.
    #[arg(long, env = "ALERT_TO")]
    pub alert_to: Option<String>,

    #[arg(long, env = "SMTP_TIMEOUT", default_value_t = 10)]
    pub smtp_timeout: u64,
}

impl MonitorArgs {
    /// Build and validate the immutable monitor configuration.
    pub fn into_config(self) -> Result<MonitorConfig, ConfigError> {
        let config = MonitorConfig {
            target_url: self.target_url,
            poll_interval: Duration::from_secs(self.check_interval),
            failure_threshold: self.failure_threshold,
            retry_restart_count: self.retry_restart,
            reboot_on_failure: self.reboot_on_failure,
            workload: self.container_name,
            runtime_socket: self.docker_socket,
            timing: Timing {
                probe_timeout: Duration::from_secs(self.probe_timeout),
                restart_timeout: Duration::from_secs(self.restart_timeout),
                post_restart_grace: Duration::from_secs(self.restart_grace),
                retry_delay: Duration::from_secs(self.retry_delay),
                cooldown: Duration::from_secs(self.cooldown),
            },
            smtp: SmtpConfig {
                host: self.smtp_host,
                port: self.smtp_port,
                username: self.smtp_user,
                password: self.smtp_pass,
                from: self.alert_from,
                to: self.alert_to,
                timeout: Duration::from_secs(self.smtp_timeout),
            },
        };
        config.validate()?;
        Ok(config)
    }
}

/// Anything other than true/1/yes/on (any case) reads as false.
fn parse_flag(s: &str) -> Result<bool, std::convert::Infallible> {
    Ok(matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    ))
}
