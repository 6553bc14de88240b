//! vigild — the Vigil daemon.
//!
//! # Usage
//!
//! ```text
//! TARGET_URL=http://app:8000/health CONTAINER_NAME=sample_app vigild run
//! vigild probe --target-url http://127.0.0.1:8000/health
//! vigild notify-test
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use vigil_core::host_identity;
use vigil_engine::{Capabilities, EscalationEngine, Scheduler};
use vigil_notify::{Notifier, SmtpNotifier};
use vigil_probe::HttpProbe;
use vigil_runtime::{DockerController, SystemReboot};
use vigild::cli::{Cli, Command, LogFormat, MonitorArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file = vigild::load_env_file();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match env_file {
        Ok(Some(path)) => info!(path = %path.display(), "loaded environment file"),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "failed to load environment file"),
    }

    match cli.command {
        Command::Run {
            monitor,
            status_addr,
        } => run(monitor, status_addr).await,
        Command::Probe { monitor } => probe_once(monitor).await,
        Command::NotifyTest { monitor } => notify_test(monitor).await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,vigild=debug,vigil=debug"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

async fn run(monitor: MonitorArgs, status_addr: Option<SocketAddr>) -> anyhow::Result<()> {
    let config = Arc::new(monitor.into_config().context("invalid configuration")?);
    info!(
        target = %config.target_url,
        interval_secs = config.poll_interval.as_secs(),
        threshold = config.failure_threshold,
        retries = config.retry_restart_count,
        reboot = config.reboot_on_failure,
        workload = %config.workload,
        "Vigil monitor starting"
    );

    // ── Capabilities ───────────────────────────────────────────

    let notifier =
        SmtpNotifier::new(config.smtp.clone()).context("building smtp tls configuration")?;
    if !notifier.is_configured() {
        warn!("email configuration incomplete; alerts will only be logged");
    }

    let controller = DockerController::connect(&config.runtime_socket).await;

    let probe = HttpProbe::new().context("building tls client configuration")?;

    let caps = Capabilities {
        probe: Arc::new(probe),
        notifier: Arc::new(notifier),
        controller: Arc::new(controller),
        reboot: Arc::new(SystemReboot::default()),
    };

    let engine = EscalationEngine::new(Arc::clone(&config), caps);
    let (status_tx, status_rx) = watch::channel(engine.snapshot());
    let engine = engine.with_status_channel(status_tx);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Status API ─────────────────────────────────────────────

    let status_handle = match status_addr {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("binding status server to {addr}"))?;
            let shutdown = shutdown_rx.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = vigild::status::serve(listener, status_rx, shutdown).await {
                    warn!(error = %e, "status server stopped");
                }
            }))
        }
        None => None,
    };

    // ── Monitor loop ───────────────────────────────────────────

    let monitor_handle = tokio::spawn(Scheduler::new(engine).run(shutdown_rx));

    shutdown_signal().await;
    info!("shutdown signal received; waiting for the current tick to finish");
    let _ = shutdown_tx.send(true);

    monitor_handle.await.context("monitor loop panicked")?;
    if let Some(handle) = status_handle {
        let _ = handle.await;
    }

    info!("Vigil monitor stopped");
    Ok(())
}

async fn probe_once(monitor: MonitorArgs) -> anyhow::Result<()> {
    let config = monitor.into_config().context("invalid configuration")?;
    let result = vigil_probe::check(&config.target_url, config.timing.probe_timeout).await;
    println!("{}: {}", config.target_url, result.outcome);
    if !result.is_success() {
        anyhow::bail!("{} is not healthy", config.target_url);
    }
    Ok(())
}

async fn notify_test(monitor: MonitorArgs) -> anyhow::Result<()> {
    let config = monitor.into_config().context("invalid configuration")?;
    let notifier =
        SmtpNotifier::new(config.smtp.clone()).context("building smtp tls configuration")?;
    if !notifier.is_configured() {
        anyhow::bail!("SMTP_HOST, SMTP_USER, SMTP_PASS, ALERT_FROM and ALERT_TO must all be set");
    }

    let body = format!(
        "Test notification from vigil on host {} monitoring {}.",
        host_identity(),
        config.target_url
    );
    if !notifier.notify("Vigil test notification", &body).await {
        anyhow::bail!("notification was not delivered; see the log for the cause");
    }
    println!("notification delivered");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
