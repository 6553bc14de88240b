//! Tick timing.
//!
//! Ticks never overlap: each one runs to completion, then the scheduler
//! sleeps the poll interval, or the cool-down after an escalation. A
//! shutdown request is only observed while sleeping, so a running ladder
//! always finishes.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::engine::{EscalationEngine, TickOutcome};

/// Drives an [`EscalationEngine`] on the configured schedule.
pub struct Scheduler {
    engine: EscalationEngine,
    poll_interval: Duration,
    cooldown: Duration,
}

impl Scheduler {
    pub fn new(engine: EscalationEngine) -> Self {
        let poll_interval = engine.config().poll_interval;
        let cooldown = engine.config().timing.cooldown;
        Self {
            engine,
            poll_interval,
            cooldown,
        }
    }

    /// Delay before the tick that follows `outcome`.
    pub fn delay_after(&self, outcome: &TickOutcome) -> Duration {
        if outcome.escalated() {
            self.cooldown
        } else {
            self.poll_interval
        }
    }

    /// Tick until `shutdown` flips to `true` (or its sender is dropped).
    /// Returns the engine so callers can inspect the final state.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> EscalationEngine {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            cooldown_secs = self.cooldown.as_secs(),
            target = %self.engine.config().target_url,
            "monitor loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = self.engine.tick().await;
            let delay = self.delay_after(&outcome);
            debug!(?delay, escalated = outcome.escalated(), "tick complete");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    break;
                }
            }
        }

        info!("monitor loop shutting down");
        self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use vigil_core::MonitorConfig;

    use crate::engine::{Capabilities, LadderOutcome, LadderReport, RebootDecision};
    use crate::fakes::*;

    fn engine(probe: Arc<ScriptedProbe>, controller: Arc<ScriptedController>) -> EscalationEngine {
        let caps = Capabilities {
            probe,
            notifier: Arc::new(RecordingNotifier::new(true)),
            controller,
            reboot: Arc::new(RecordingReboot::new(true)),
        };
        EscalationEngine::new(Arc::new(MonitorConfig::default()), caps)
    }

    #[test]
    fn escalation_uses_cooldown() {
        let scheduler = Scheduler::new(engine(
            Arc::new(ScriptedProbe::default()),
            Arc::new(ScriptedController::default()),
        ));

        assert_eq!(
            scheduler.delay_after(&TickOutcome::Healthy { recovered: false }),
            Duration::from_secs(15)
        );
        assert_eq!(
            scheduler.delay_after(&TickOutcome::Accumulating { failures: 2 }),
            Duration::from_secs(15)
        );
        let escalated = TickOutcome::Escalated {
            failures: 3,
            ladder: LadderReport {
                outcome: LadderOutcome::Exhausted,
                attempts: Vec::new(),
            },
            reboot: RebootDecision::Disabled,
        };
        assert_eq!(scheduler.delay_after(&escalated), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_on_poll_interval_until_shutdown() {
        let probe = Arc::new(ScriptedProbe::new(vec![ok(), ok(), ok(), ok()]));
        let scheduler = Scheduler::new(engine(probe.clone(), Arc::new(ScriptedController::default())));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(scheduler.run(rx));

        // Ticks at t = 0, 15, 30.
        tokio::time::sleep(Duration::from_secs(31)).await;
        tx.send(true).unwrap();
        let engine = handle.await.unwrap();

        assert_eq!(probe.calls(), 3);
        assert_eq!(engine.state().consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn escalation_tick_is_followed_by_cooldown() {
        // Default threshold 3, two retries with nothing to restart.
        let probe = Arc::new(ScriptedProbe::default());
        let controller = Arc::new(ScriptedController::default());
        let scheduler = Scheduler::new(engine(probe.clone(), controller.clone()));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(scheduler.run(rx));

        // t=0, 15, 30 (escalates; ladder sleeps 5s between attempts, ends
        // at 35), then the next tick waits for the 30s cool-down: t=65.
        tokio::time::sleep(Duration::from_secs(64)).await;
        assert_eq!(probe.calls(), 3);
        assert_eq!(controller.calls(), 2);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(probe.calls(), 4);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn already_shut_down_runs_no_tick() {
        let probe = Arc::new(ScriptedProbe::default());
        let scheduler = Scheduler::new(engine(probe.clone(), Arc::new(ScriptedController::default())));
        let (_tx, rx) = watch::channel(true);

        scheduler.run(rx).await;
        assert_eq!(probe.calls(), 0);
    }
}
