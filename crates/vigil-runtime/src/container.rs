//! Container restart capability.
//!
//! [`DockerController`] speaks HTTP/1.1 to the Docker Engine API over a Unix
//! socket. Every call opens its own connection and drops it when done.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::BodyExt;
use serde::Deserialize;
use tracing::{debug, info, warn};

use vigil_core::BoxFuture;

use crate::error::RuntimeError;

/// Deadline for calls that do not wait on the workload (ping, inspect).
const API_TIMEOUT: Duration = Duration::from_secs(10);

/// Extra time the runtime may take beyond the stop timeout to finish a restart.
const RESTART_SLACK: Duration = Duration::from_secs(30);

/// Result of one restart request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    /// The runtime accepted and completed the restart.
    Restarted,
    /// No workload with that name exists. Retrying will not help.
    NotFound,
    /// The runtime could not be reached or refused the request.
    Unavailable(String),
}

/// Capability to restart a named workload.
pub trait ContainerController: Send + Sync {
    /// Restart `workload`, giving it `timeout` to stop before it is killed.
    fn restart<'a>(&'a self, workload: &'a str, timeout: Duration) -> BoxFuture<'a, RestartOutcome>;

    /// Whether the runtime was reachable when the controller was created.
    fn is_available(&self) -> bool;
}

/// Docker Engine API client over a Unix control socket.
#[derive(Debug, Clone)]
pub struct DockerController {
    socket: PathBuf,
    /// `Err(cause)` when the startup ping failed; cached for the process lifetime.
    availability: Result<(), String>,
}

#[derive(Deserialize)]
struct ContainerInspect {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl DockerController {
    /// Probe the runtime once and return a controller that remembers
    /// whether it was reachable.
    pub async fn connect(socket: impl Into<PathBuf>) -> Self {
        let socket = socket.into();
        let availability = match request(&socket, http::Method::GET, "/_ping", API_TIMEOUT).await {
            Ok((status, _)) if status.is_success() => {
                info!(socket = %socket.display(), "container runtime reachable");
                Ok(())
            }
            Ok((status, body)) => Err(format!("ping returned {status}: {}", error_message(&body))),
            Err(e) => Err(e.to_string()),
        };
        if let Err(cause) = &availability {
            warn!(
                socket = %socket.display(),
                %cause,
                "could not reach container runtime; restarts are disabled. \
                 Mount the runtime socket to enable them"
            );
        }
        Self {
            socket,
            availability,
        }
    }

    /// A controller with no runtime behind it.
    pub fn unavailable(cause: impl Into<String>) -> Self {
        Self {
            socket: PathBuf::new(),
            availability: Err(cause.into()),
        }
    }

    async fn restart_workload(&self, workload: &str, timeout: Duration) -> RestartOutcome {
        if let Err(cause) = &self.availability {
            debug!(%workload, "no container runtime; restart skipped");
            return RestartOutcome::Unavailable(cause.clone());
        }
        if !valid_name(workload) {
            warn!(%workload, "workload name is not a valid container name");
            return RestartOutcome::NotFound;
        }

        let inspect_path = format!("/containers/{workload}/json");
        let id = match request(&self.socket, http::Method::GET, &inspect_path, API_TIMEOUT).await {
            Ok((status, body)) if status.is_success() => serde_json::from_slice::<ContainerInspect>(&body)
                .map(|c| c.id.chars().take(12).collect::<String>())
                .unwrap_or_default(),
            Ok((status, _)) if status == http::StatusCode::NOT_FOUND => {
                warn!(%workload, "container not found");
                return RestartOutcome::NotFound;
            }
            Ok((status, body)) => {
                let e = RuntimeError::Status {
                    status: status.as_u16(),
                    message: error_message(&body),
                };
                warn!(%workload, error = %e, "container inspect failed");
                return RestartOutcome::Unavailable(e.to_string());
            }
            Err(e) => {
                warn!(%workload, error = %e, "container inspect failed");
                return RestartOutcome::Unavailable(e.to_string());
            }
        };

        info!(%workload, id = %id, "restarting container");
        let restart_path = format!("/containers/{workload}/restart?t={}", timeout.as_secs());
        match request(
            &self.socket,
            http::Method::POST,
            &restart_path,
            timeout + RESTART_SLACK,
        )
        .await
        {
            Ok((status, _)) if status.is_success() => {
                info!(%workload, "container restart command issued");
                RestartOutcome::Restarted
            }
            Ok((status, _)) if status == http::StatusCode::NOT_FOUND => {
                warn!(%workload, "container disappeared before restart");
                RestartOutcome::NotFound
            }
            Ok((status, body)) => {
                let e = RuntimeError::Status {
                    status: status.as_u16(),
                    message: error_message(&body),
                };
                warn!(%workload, error = %e, "error restarting container");
                RestartOutcome::Unavailable(e.to_string())
            }
            Err(e) => {
                warn!(%workload, error = %e, "error restarting container");
                RestartOutcome::Unavailable(e.to_string())
            }
        }
    }
}

impl ContainerController for DockerController {
    fn restart<'a>(&'a self, workload: &'a str, timeout: Duration) -> BoxFuture<'a, RestartOutcome> {
        Box::pin(self.restart_workload(workload, timeout))
    }

    fn is_available(&self) -> bool {
        self.availability.is_ok()
    }
}

/// Send one request over a fresh connection and collect the response.
async fn request(
    socket: &Path,
    method: http::Method,
    path: &str,
    timeout: Duration,
) -> Result<(http::StatusCode, Bytes), RuntimeError> {
    let exchange = async {
        let stream = tokio::net::UnixStream::connect(socket)
            .await
            .map_err(|e| RuntimeError::Connect {
                socket: socket.display().to_string(),
                reason: e.to_string(),
            })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| RuntimeError::Http(format!("handshake: {e}")))?;

        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method(method)
            .uri(path)
            // The engine ignores the host, but HTTP/1.1 requires one.
            .header(http::header::HOST, "docker")
            .header(http::header::USER_AGENT, "vigil-runtime/0.1")
            .body(http_body_util::Empty::<Bytes>::new())
            .map_err(|e| RuntimeError::Http(format!("build request: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| RuntimeError::Http(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| RuntimeError::Http(format!("read body: {e}")))?
            .to_bytes();
        Ok::<_, RuntimeError>((status, body))
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| RuntimeError::Timeout(timeout))?
}

fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<ErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string())
}

/// Container names are `[a-zA-Z0-9][a-zA-Z0-9_.-]*`; ids are hex.
fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;

    type Handler = fn(&str) -> String;

    /// Fake engine: records each request line and answers via `handler`.
    fn start_engine(dir: &tempfile::TempDir, handler: Handler) -> (PathBuf, Arc<Mutex<Vec<String>>>) {
        let socket = dir.path().join("docker.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let server_log = Arc::clone(&log);

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let log = Arc::clone(&server_log);
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&buf[..n]),
                        }
                    }
                    let text = String::from_utf8_lossy(&head);
                    let request_line = text.lines().next().unwrap_or_default().to_string();
                    log.lock().unwrap().push(request_line.clone());
                    let _ = stream.write_all(handler(&request_line).as_bytes()).await;
                });
            }
        });

        (socket, log)
    }

    fn respond(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn healthy_engine(line: &str) -> String {
        if line.starts_with("GET /_ping") {
            respond("200 OK", "OK")
        } else if line.starts_with("GET /containers/sample_app/json") {
            respond("200 OK", r#"{"Id":"0123456789abcdef0123","Name":"/sample_app"}"#)
        } else if line.starts_with("POST /containers/sample_app/restart") {
            "HTTP/1.1 204 No Content\r\nconnection: close\r\n\r\n".to_string()
        } else {
            respond("404 Not Found", r#"{"message":"No such container"}"#)
        }
    }

    fn failing_engine(line: &str) -> String {
        if line.starts_with("GET /_ping") {
            respond("200 OK", "OK")
        } else if line.starts_with("GET /containers/") {
            respond("200 OK", r#"{"Id":"0123456789abcdef"}"#)
        } else {
            respond("500 Internal Server Error", r#"{"message":"cannot restart"}"#)
        }
    }

    #[tokio::test]
    async fn restart_issues_inspect_then_restart() {
        let dir = tempfile::tempdir().unwrap();
        let (socket, log) = start_engine(&dir, healthy_engine);

        let controller = DockerController::connect(&socket).await;
        assert!(controller.is_available());

        let outcome = controller
            .restart("sample_app", Duration::from_secs(10))
            .await;
        assert_eq!(outcome, RestartOutcome::Restarted);

        let log = log.lock().unwrap().clone();
        assert_eq!(log.len(), 3);
        assert!(log[1].starts_with("GET /containers/sample_app/json"));
        assert!(log[2].starts_with("POST /containers/sample_app/restart?t=10"));
    }

    #[tokio::test]
    async fn missing_container_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (socket, log) = start_engine(&dir, healthy_engine);
        let controller = DockerController::connect(&socket).await;

        let outcome = controller.restart("ghost", Duration::from_secs(10)).await;
        assert_eq!(outcome, RestartOutcome::NotFound);
        assert!(!log.lock().unwrap().iter().any(|l| l.starts_with("POST")));
    }

    #[tokio::test]
    async fn runtime_error_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let (socket, _log) = start_engine(&dir, failing_engine);
        let controller = DockerController::connect(&socket).await;

        match controller.restart("sample_app", Duration::from_secs(1)).await {
            RestartOutcome::Unavailable(cause) => assert!(cause.contains("cannot restart")),
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_socket_disables_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let controller = DockerController::connect(dir.path().join("absent.sock")).await;
        assert!(!controller.is_available());

        let outcome = controller
            .restart("sample_app", Duration::from_secs(10))
            .await;
        assert!(matches!(outcome, RestartOutcome::Unavailable(_)));
    }

    #[tokio::test]
    async fn unavailable_controller_never_connects() {
        let dir = tempfile::tempdir().unwrap();
        let (_socket, log) = start_engine(&dir, healthy_engine);

        let controller = DockerController::unavailable("no runtime configured");
        let outcome = controller
            .restart("sample_app", Duration::from_secs(10))
            .await;
        assert_eq!(
            outcome,
            RestartOutcome::Unavailable("no runtime configured".into())
        );
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_name_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (socket, log) = start_engine(&dir, healthy_engine);
        let controller = DockerController::connect(&socket).await;

        let outcome = controller
            .restart("../images/json", Duration::from_secs(10))
            .await;
        assert_eq!(outcome, RestartOutcome::NotFound);
        assert_eq!(log.lock().unwrap().len(), 1, "only the startup ping");
    }

    #[test]
    fn error_message_prefers_json_message() {
        assert_eq!(error_message(br#"{"message":"boom"}"#), "boom");
        assert_eq!(error_message(b"plain text\n"), "plain text");
    }
}
