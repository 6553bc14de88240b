//! Failure tracking for the monitored target.

use serde::Serialize;
use tracing::{debug, warn};

use vigil_core::HealthStatus;

/// Where the engine stands relative to the failure threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// No failures since the last success.
    Healthy,
    /// Some failures, still below the threshold.
    Accumulating,
    /// Threshold reached; the recovery ladder runs on every failing tick.
    Escalating,
}

impl EngineState {
    pub fn status(self) -> HealthStatus {
        match self {
            EngineState::Healthy => HealthStatus::Healthy,
            EngineState::Accumulating => HealthStatus::Degraded,
            EngineState::Escalating => HealthStatus::Down,
        }
    }
}

/// What recording one probe result did to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Success. `recovered` is set when the previous state was not healthy.
    Healthy { recovered: bool },
    /// Failure below the threshold.
    Accumulating { failures: u32 },
    /// Failure at or above the threshold; the ladder must run.
    Escalating { failures: u32 },
}

/// Consecutive-failure counter. Mutated once per tick, never persisted.
#[derive(Debug, Clone)]
pub struct HealthState {
    consecutive_failures: u32,
    state: EngineState,
    threshold: u32,
}

impl HealthState {
    /// Fresh state: healthy, no failures.
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_failures: 0,
            state: EngineState::Healthy,
            threshold,
        }
    }

    /// Record the outcome of the tick's probe.
    pub fn record(&mut self, success: bool) -> Transition {
        if success {
            let recovered = self.state != EngineState::Healthy;
            if recovered {
                debug!(
                    failures = self.consecutive_failures,
                    "target recovered to healthy"
                );
            }
            self.reset();
            return Transition::Healthy { recovered };
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= self.threshold {
            if self.state != EngineState::Escalating {
                warn!(
                    failures = self.consecutive_failures,
                    threshold = self.threshold,
                    "failure threshold reached"
                );
            }
            self.state = EngineState::Escalating;
            Transition::Escalating {
                failures: self.consecutive_failures,
            }
        } else {
            self.state = EngineState::Accumulating;
            Transition::Accumulating {
                failures: self.consecutive_failures,
            }
        }
    }

    /// Back to healthy with a zero counter (probe or post-restart success).
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.state = EngineState::Healthy;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn last_status(&self) -> HealthStatus {
        self.state.status()
    }
}
