//! The escalation engine: one probe per tick, and the recovery ladder once
//! the failure threshold is reached.
//!
//! Nothing inside a tick can fail the process. Collaborators report through
//! typed outcomes (`ProbeOutcome`, `bool` from the notifier, `RestartOutcome`,
//! `Result` from the reboot), which the engine logs and acts on.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use vigil_core::{HealthStatus, MonitorConfig, host_identity};
use vigil_notify::Notifier;
use vigil_probe::{Probe, ProbeResult};
use vigil_runtime::{ContainerController, HostReboot, RestartOutcome};

use crate::messages::{self, Alert};
use crate::state::{EngineState, HealthState, Transition};

/// The collaborators the engine drives.
#[derive(Clone)]
pub struct Capabilities {
    pub probe: Arc<dyn Probe>,
    pub notifier: Arc<dyn Notifier>,
    pub controller: Arc<dyn ContainerController>,
    pub reboot: Arc<dyn HostReboot>,
}

/// One restart attempt within a ladder.
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationAttempt {
    pub attempt_number: u32,
    pub restart_issued: bool,
    pub restart: RestartOutcome,
    /// Only present when the restart was issued.
    pub post_restart_probe: Option<ProbeResult>,
}

/// How the restart ladder ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LadderOutcome {
    /// A post-restart probe succeeded.
    Recovered { attempt: u32, status: u16 },
    /// The workload does not exist; remaining attempts were skipped.
    NotFound { attempt: u32 },
    /// Every attempt ran without recovery.
    Exhausted,
}

/// Result of [`EscalationEngine::run_ladder`].
#[derive(Debug, Clone, PartialEq)]
pub struct LadderReport {
    pub outcome: LadderOutcome,
    pub attempts: Vec<EscalationAttempt>,
}

/// What happened about the host reboot after a ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebootDecision {
    /// The ladder recovered the target or found no workload to restart.
    Skipped,
    /// Exhausted, but rebooting is disabled.
    Disabled,
    /// The reboot command ran.
    Invoked,
    /// The reboot command failed; nothing further is attempted.
    Failed(String),
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Healthy { recovered: bool },
    Accumulating { failures: u32 },
    Escalated {
        failures: u32,
        ladder: LadderReport,
        reboot: RebootDecision,
    },
}

impl TickOutcome {
    /// Whether the recovery ladder ran during this tick.
    pub fn escalated(&self) -> bool {
        matches!(self, TickOutcome::Escalated { .. })
    }
}

/// Read-only view of the engine published after every tick.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub target: String,
    pub state: EngineState,
    pub last_status: HealthStatus,
    pub consecutive_failures: u32,
    pub last_probe: Option<ProbeResult>,
    /// Number of ladders run since startup.
    pub episodes: u64,
}

/// Owns the [`HealthState`] and sequences the escalation ladder.
pub struct EscalationEngine {
    config: Arc<MonitorConfig>,
    caps: Capabilities,
    state: HealthState,
    host: String,
    last_probe: Option<ProbeResult>,
    episodes: u64,
    status_tx: Option<watch::Sender<StatusSnapshot>>,
}

impl EscalationEngine {
    pub fn new(config: Arc<MonitorConfig>, caps: Capabilities) -> Self {
        let state = HealthState::new(config.failure_threshold);
        Self {
            config,
            caps,
            state,
            host: host_identity(),
            last_probe: None,
            episodes: 0,
            status_tx: None,
        }
    }

    /// Publish a [`StatusSnapshot`] on `tx` after every tick.
    pub fn with_status_channel(mut self, tx: watch::Sender<StatusSnapshot>) -> Self {
        tx.send_replace(self.snapshot());
        self.status_tx = Some(tx);
        self
    }

    /// Override the host name used in alert bodies.
    pub fn with_host_identity(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn state(&self) -> &HealthState {
        &self.state
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            target: self.config.target_url.clone(),
            state: self.state.state(),
            last_status: self.state.last_status(),
            consecutive_failures: self.state.consecutive_failures(),
            last_probe: self.last_probe.clone(),
            episodes: self.episodes,
        }
    }

    /// Run one tick: probe, update the counter, escalate if needed.
    pub async fn tick(&mut self) -> TickOutcome {
        let url = self.config.target_url.clone();
        info!(%url, "checking target");

        let result = self
            .caps
            .probe
            .check(&url, self.config.timing.probe_timeout)
            .await;
        let status = result.status_code();
        let transition = self.state.record(result.is_success());
        self.last_probe = Some(result.clone());

        let outcome = match transition {
            Transition::Healthy { recovered } => {
                if recovered {
                    info!(%url, "target recovered");
                    let alert = messages::recovered(&url, status.unwrap_or_default(), &self.host);
                    self.send(alert).await;
                }
                TickOutcome::Healthy { recovered }
            }
            Transition::Accumulating { failures } => {
                warn!(failures, outcome = %result.outcome, "probe failed");
                TickOutcome::Accumulating { failures }
            }
            Transition::Escalating { failures } => {
                warn!(failures, outcome = %result.outcome, "probe failed");
                self.escalate(failures).await
            }
        };

        self.publish();
        outcome
    }

    /// Alert, run the restart ladder, then reboot if it is exhausted and
    /// rebooting is enabled.
    async fn escalate(&mut self, failures: u32) -> TickOutcome {
        let url = self.config.target_url.clone();
        self.episodes += 1;
        warn!(%url, failures, host = %self.host, "threshold exceeded; escalating");
        self.send(messages::down(&url, failures, &self.host)).await;

        let ladder = self.run_ladder().await;

        let reboot = match &ladder.outcome {
            LadderOutcome::Recovered { attempt, status } => {
                info!(attempt, "target recovered after restart");
                self.send(messages::recovered_after_restart(&url, *status))
                    .await;
                self.state.reset();
                if let Some(probe) = ladder.attempts.last().and_then(|a| a.post_restart_probe.clone()) {
                    self.last_probe = Some(probe);
                }
                RebootDecision::Skipped
            }
            LadderOutcome::NotFound { attempt } => {
                warn!(
                    attempt,
                    workload = %self.config.workload,
                    "workload not found; restart ladder stopped"
                );
                RebootDecision::Skipped
            }
            LadderOutcome::Exhausted if self.config.reboot_on_failure => {
                warn!("restart attempts failed; rebooting host");
                self.send(messages::rebooting(&url, &self.host)).await;
                match self.caps.reboot.reboot().await {
                    Ok(()) => RebootDecision::Invoked,
                    Err(e) => {
                        error!(error = %e, "failed to reboot host");
                        RebootDecision::Failed(e.to_string())
                    }
                }
            }
            LadderOutcome::Exhausted => {
                warn!(
                    failures = self.state.consecutive_failures(),
                    "restart attempts failed; reboot disabled, will retry after cool-down"
                );
                RebootDecision::Disabled
            }
        };

        TickOutcome::Escalated {
            failures,
            ladder,
            reboot,
        }
    }

    /// Up to `retry_restart_count` restart attempts. Stops early when a
    /// post-restart probe succeeds or the workload does not exist. Does not
    /// touch the health state.
    pub async fn run_ladder(&self) -> LadderReport {
        let timing = self.config.timing;
        let retries = self.config.retry_restart_count;
        let workload = self.config.workload.as_str();
        let mut attempts = Vec::new();

        for attempt in 1..=retries {
            info!(attempt, retries, %workload, "restart attempt");
            let restart = self
                .caps
                .controller
                .restart(workload, timing.restart_timeout)
                .await;
            let mut record = EscalationAttempt {
                attempt_number: attempt,
                restart_issued: restart == RestartOutcome::Restarted,
                restart: restart.clone(),
                post_restart_probe: None,
            };

            match restart {
                RestartOutcome::Restarted => {
                    info!(grace = ?timing.post_restart_grace, "waiting for workload to recover");
                    tokio::time::sleep(timing.post_restart_grace).await;

                    let probe = self
                        .caps
                        .probe
                        .check(&self.config.target_url, timing.probe_timeout)
                        .await;
                    let recovered = match probe.outcome {
                        vigil_probe::ProbeOutcome::Success(status) => Some(status),
                        _ => None,
                    };
                    if recovered.is_none() {
                        warn!(attempt, outcome = %probe.outcome, "still failing after restart");
                    }
                    record.post_restart_probe = Some(probe);
                    attempts.push(record);

                    if let Some(status) = recovered {
                        return LadderReport {
                            outcome: LadderOutcome::Recovered { attempt, status },
                            attempts,
                        };
                    }
                }
                RestartOutcome::NotFound => {
                    attempts.push(record);
                    return LadderReport {
                        outcome: LadderOutcome::NotFound { attempt },
                        attempts,
                    };
                }
                RestartOutcome::Unavailable(cause) => {
                    warn!(attempt, %cause, "cannot restart workload");
                    attempts.push(record);
                }
            }

            if attempt < retries {
                tokio::time::sleep(timing.retry_delay).await;
            }
        }

        LadderReport {
            outcome: LadderOutcome::Exhausted,
            attempts,
        }
    }

    async fn send(&self, alert: Alert) {
        if !self.caps.notifier.notify(alert.subject, &alert.body).await {
            warn!(subject = alert.subject, "notification not delivered");
        }
    }

    fn publish(&self) {
        if let Some(tx) = &self.status_tx {
            tx.send_replace(self.snapshot());
        }
    }
}
