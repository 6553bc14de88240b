//! vigil-engine — the monitoring and escalation loop.
//!
//! # Architecture
//!
//! ```text
//! Scheduler (one tick at a time)
//!   └── EscalationEngine::tick
//!       ├── Probe::check → ProbeResult
//!       ├── HealthState::record (Healthy / Accumulating / Escalating)
//!       └── threshold crossed:
//!           ├── Notifier: "down" alert
//!           ├── run_ladder: restart → grace → re-probe, up to N attempts
//!           │     stops early on recovery or NotFound
//!           └── exhausted + reboot enabled → Notifier + HostReboot
//! ```
//!
//! The failure counter only resets on a successful probe. An exhausted
//! ladder leaves it untouched, so every following failing tick runs the
//! ladder again after the cool-down.

pub mod engine;
pub mod messages;
pub mod scheduler;
pub mod state;

#[cfg(test)]
pub(crate) mod fakes;

pub use engine::{
    Capabilities, EscalationAttempt, EscalationEngine, LadderOutcome, LadderReport,
    RebootDecision, StatusSnapshot, TickOutcome,
};
pub use scheduler::Scheduler;
pub use state::{EngineState, HealthState, Transition};
