//! End-to-end recovery: a real HTTP probe against a local target and the
//! Docker controller against a fake engine socket. Restarting the "container"
//! makes the target healthy again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener};

use vigil_core::{BoxFuture, MonitorConfig, Timing};
use vigil_engine::{Capabilities, EscalationEngine, LadderOutcome, TickOutcome};
use vigil_notify::Notifier;
use vigil_probe::HttpProbe;
use vigil_runtime::{DockerController, SystemReboot};

#[derive(Default)]
struct Inbox(Mutex<Vec<String>>);

impl Notifier for Inbox {
    fn notify<'a>(&'a self, subject: &'a str, _body: &'a str) -> BoxFuture<'a, bool> {
        self.0.lock().unwrap().push(subject.to_string());
        Box::pin(async { true })
    }
}

async fn read_head(stream: &mut (impl AsyncReadExt + Unpin)) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Target answering 503 until `healthy` is set, then 200.
async fn start_target(healthy: Arc<AtomicBool>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let healthy = Arc::clone(&healthy);
            tokio::spawn(async move {
                read_head(&mut stream).await;
                let status = if healthy.load(Ordering::SeqCst) {
                    "200 OK"
                } else {
                    "503 Service Unavailable"
                };
                let resp = format!(
                    "HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                );
                let _ = stream.write_all(resp.as_bytes()).await;
            });
        }
    });
    format!("http://{addr}/health")
}

/// Fake container runtime; a restart of `sample_app` heals the target.
fn start_runtime(dir: &tempfile::TempDir, healthy: Arc<AtomicBool>) -> std::path::PathBuf {
    let socket = dir.path().join("docker.sock");
    let listener = UnixListener::bind(&socket).unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let healthy = Arc::clone(&healthy);
            tokio::spawn(async move {
                let head = read_head(&mut stream).await;
                let line = head.lines().next().unwrap_or_default().to_string();
                let resp = if line.starts_with("GET /_ping") {
                    "HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nOK".to_string()
                } else if line.starts_with("GET /containers/sample_app/json") {
                    let body = r#"{"Id":"abcdef0123456789"}"#;
                    format!(
                        "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    )
                } else if line.starts_with("POST /containers/sample_app/restart") {
                    healthy.store(true, Ordering::SeqCst);
                    "HTTP/1.1 204 No Content\r\nconnection: close\r\n\r\n".to_string()
                } else {
                    let body = r#"{"message":"No such container"}"#;
                    format!(
                        "HTTP/1.1 404 Not Found\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    )
                };
                let _ = stream.write_all(resp.as_bytes()).await;
            });
        }
    });
    socket
}

fn fast_config(target_url: String, socket: std::path::PathBuf, workload: &str) -> MonitorConfig {
    MonitorConfig {
        target_url,
        poll_interval: Duration::from_millis(20),
        failure_threshold: 2,
        retry_restart_count: 2,
        reboot_on_failure: false,
        workload: workload.to_string(),
        runtime_socket: socket,
        timing: Timing {
            probe_timeout: Duration::from_secs(2),
            restart_timeout: Duration::from_secs(1),
            post_restart_grace: Duration::from_millis(20),
            retry_delay: Duration::from_millis(20),
            cooldown: Duration::from_millis(50),
        },
        ..MonitorConfig::default()
    }
}

#[tokio::test]
async fn restart_heals_target_and_resets_counter() {
    let healthy = Arc::new(AtomicBool::new(false));
    let dir = tempfile::tempdir().unwrap();
    let url = start_target(Arc::clone(&healthy)).await;
    let socket = start_runtime(&dir, Arc::clone(&healthy));

    let config = Arc::new(fast_config(url, socket.clone(), "sample_app"));
    let inbox = Arc::new(Inbox::default());
    let caps = Capabilities {
        probe: Arc::new(HttpProbe::new().unwrap()),
        notifier: inbox.clone(),
        controller: Arc::new(DockerController::connect(&socket).await),
        reboot: Arc::new(SystemReboot::with_command("false")),
    };
    let mut engine = EscalationEngine::new(config, caps);

    assert_eq!(engine.tick().await, TickOutcome::Accumulating { failures: 1 });
    let TickOutcome::Escalated { ladder, .. } = engine.tick().await else {
        panic!("expected escalation at the threshold");
    };

    assert_eq!(
        ladder.outcome,
        LadderOutcome::Recovered {
            attempt: 1,
            status: 200
        }
    );
    assert_eq!(engine.state().consecutive_failures(), 0);
    assert_eq!(
        *inbox.0.lock().unwrap(),
        vec!["Website DOWN alert", "Website recovered after restart"]
    );

    assert_eq!(engine.tick().await, TickOutcome::Healthy { recovered: false });
}

#[tokio::test]
async fn unknown_container_stops_after_first_attempt() {
    let healthy = Arc::new(AtomicBool::new(false));
    let dir = tempfile::tempdir().unwrap();
    let url = start_target(Arc::clone(&healthy)).await;
    let socket = start_runtime(&dir, Arc::clone(&healthy));

    let config = Arc::new(fast_config(url, socket.clone(), "missing_app"));
    let caps = Capabilities {
        probe: Arc::new(HttpProbe::new().unwrap()),
        notifier: Arc::new(Inbox::default()),
        controller: Arc::new(DockerController::connect(&socket).await),
        reboot: Arc::new(SystemReboot::with_command("false")),
    };
    let mut engine = EscalationEngine::new(config, caps);

    engine.tick().await;
    let TickOutcome::Escalated { ladder, .. } = engine.tick().await else {
        panic!("expected escalation at the threshold");
    };
    assert_eq!(ladder.outcome, LadderOutcome::NotFound { attempt: 1 });
    assert_eq!(ladder.attempts.len(), 1);
    assert_eq!(engine.state().consecutive_failures(), 2);
    assert!(!healthy.load(Ordering::SeqCst));
}
