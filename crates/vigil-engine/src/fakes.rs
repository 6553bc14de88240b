//! Deterministic capability fakes for engine and scheduler tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use vigil_core::BoxFuture;
use vigil_notify::Notifier;
use vigil_probe::{Probe, ProbeOutcome, ProbeResult};
use vigil_runtime::{ContainerController, HostReboot, RebootError, RestartOutcome};

/// Replays scripted outcomes; refuses connections once the script runs out.
#[derive(Default)]
pub struct ScriptedProbe {
    script: Mutex<VecDeque<ProbeOutcome>>,
    calls: AtomicU32,
}

impl ScriptedProbe {
    pub fn new(script: impl IntoIterator<Item = ProbeOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Probe for ScriptedProbe {
    fn check<'a>(&'a self, _url: &'a str, _timeout: Duration) -> BoxFuture<'a, ProbeResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ProbeOutcome::TransportError("connection refused".into()));
        Box::pin(async move { ProbeResult::now(outcome) })
    }
}

pub fn refused() -> ProbeOutcome {
    ProbeOutcome::TransportError("connection refused".into())
}

pub fn ok() -> ProbeOutcome {
    ProbeOutcome::Success(200)
}

/// Records every message; `delivers` decides the return value.
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    delivers: bool,
}

impl RecordingNotifier {
    pub fn new(delivers: bool) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            delivers,
        }
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn count(&self, subject: &str) -> usize {
        self.subjects().iter().filter(|s| *s == subject).count()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, b)| b.clone()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify<'a>(&'a self, subject: &'a str, body: &'a str) -> BoxFuture<'a, bool> {
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        let delivers = self.delivers;
        Box::pin(async move { delivers })
    }
}

/// Replays scripted restart outcomes; `Unavailable` once exhausted.
#[derive(Default)]
pub struct ScriptedController {
    script: Mutex<VecDeque<RestartOutcome>>,
    calls: AtomicU32,
}

impl ScriptedController {
    pub fn new(script: impl IntoIterator<Item = RestartOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ContainerController for ScriptedController {
    fn restart<'a>(&'a self, _workload: &'a str, _timeout: Duration) -> BoxFuture<'a, RestartOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| RestartOutcome::Unavailable("no runtime".into()));
        Box::pin(async move { outcome })
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Counts reboot invocations.
pub struct RecordingReboot {
    calls: AtomicU32,
    succeeds: bool,
}

impl RecordingReboot {
    pub fn new(succeeds: bool) -> Self {
        Self {
            calls: AtomicU32::new(0),
            succeeds,
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HostReboot for RecordingReboot {
    fn reboot(&self) -> BoxFuture<'_, Result<(), RebootError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = if self.succeeds {
            Ok(())
        } else {
            Err(RebootError::Exit {
                command: "/sbin/reboot".into(),
                status: "exit status: 1".into(),
            })
        };
        Box::pin(async move { result })
    }
}
