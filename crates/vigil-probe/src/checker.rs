//! Health check probe logic.
//!
//! Performs a single HTTP GET with a hard deadline and classifies the
//! response. `https://` targets are reached through rustls.

use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;
use tracing::debug;

use vigil_core::{BoxFuture, epoch_secs};

/// Classified outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// The target answered with a 2xx status.
    Success(u16),
    /// The target answered, but not with 2xx.
    HttpError(u16),
    /// The request never produced a response (refused, DNS, timeout, ...).
    TransportError(String),
}

/// Result of one probe, stamped with the time it completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub outcome: ProbeOutcome,
    /// Unix timestamp (seconds).
    pub timestamp: u64,
}

impl ProbeResult {
    /// Stamp an outcome with the current time.
    pub fn now(outcome: ProbeOutcome) -> Self {
        Self {
            outcome,
            timestamp: epoch_secs(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Success(_))
    }

    /// Status code, if the target answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self.outcome {
            ProbeOutcome::Success(code) | ProbeOutcome::HttpError(code) => Some(code),
            ProbeOutcome::TransportError(_) => None,
        }
    }
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeOutcome::Success(code) => write!(f, "success (status {code})"),
            ProbeOutcome::HttpError(code) => write!(f, "non-2xx response (status {code})"),
            ProbeOutcome::TransportError(cause) => write!(f, "request error: {cause}"),
        }
    }
}

/// Health probe capability, swappable for tests.
pub trait Probe: Send + Sync {
    /// Probe `url`, giving up after `timeout`.
    fn check<'a>(&'a self, url: &'a str, timeout: Duration) -> BoxFuture<'a, ProbeResult>;
}

/// The production probe: a real HTTP/1.1 GET, over TLS for `https://`.
#[derive(Clone)]
pub struct HttpProbe {
    tls: TlsConnector,
}

impl std::fmt::Debug for HttpProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProbe").finish_non_exhaustive()
    }
}

impl HttpProbe {
    /// A probe that verifies https targets against the Mozilla roots.
    pub fn new() -> Result<Self, rustls::Error> {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
        Ok(Self::with_tls_config(Arc::new(config)))
    }

    /// A probe with a caller-supplied TLS client configuration, e.g. one
    /// trusting a private CA.
    pub fn with_tls_config(config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            tls: TlsConnector::from(config),
        }
    }

    /// Perform one probe against `url`.
    ///
    /// The whole exchange (DNS, connect, TLS, handshake, response head) must
    /// finish within `timeout`. The response body is not read.
    pub async fn probe(&self, url: &str, timeout: Duration) -> ProbeResult {
        let outcome = match tokio::time::timeout(timeout, self.get_status(url)).await {
            Ok(Ok(status)) if (200..300).contains(&status) => ProbeOutcome::Success(status),
            Ok(Ok(status)) => {
                debug!(status, %url, "health probe non-2xx");
                ProbeOutcome::HttpError(status)
            }
            Ok(Err(cause)) => {
                debug!(error = %cause, %url, "health probe failed");
                ProbeOutcome::TransportError(cause)
            }
            Err(_) => {
                debug!(%url, ?timeout, "health probe timed out");
                ProbeOutcome::TransportError(format!("timed out after {timeout:?}"))
            }
        };
        ProbeResult::now(outcome)
    }

    /// Issue the GET and return the response status code.
    async fn get_status(&self, url: &str) -> Result<u16, String> {
        let uri: http::Uri = url.parse().map_err(|e| format!("invalid url: {e}"))?;
        let secure = match uri.scheme_str() {
            Some("http") => false,
            Some("https") => true,
            _ => return Err(format!("unsupported scheme in {url}")),
        };
        let host = uri.host().ok_or_else(|| format!("missing host in {url}"))?;
        let port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });
        let address = format!("{host}:{port}");
        let host_header = uri
            .authority()
            .map(|a| a.as_str().to_string())
            .unwrap_or_else(|| address.clone());
        let path = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .to_string();

        let stream = tokio::net::TcpStream::connect(&address)
            .await
            .map_err(|e| format!("connect to {address}: {e}"))?;

        if !secure {
            return send_get(stream, &path, host_header).await;
        }

        // IPv6 literals keep their brackets in the authority.
        let name = host.trim_start_matches('[').trim_end_matches(']');
        let server_name = ServerName::try_from(name.to_string())
            .map_err(|e| format!("invalid tls server name '{name}': {e}"))?;
        let tls_stream = self
            .tls
            .connect(server_name, stream)
            .await
            .map_err(|e| format!("tls handshake with {address}: {e}"))?;
        send_get(tls_stream, &path, host_header).await
    }
}

impl Probe for HttpProbe {
    fn check<'a>(&'a self, url: &'a str, timeout: Duration) -> BoxFuture<'a, ProbeResult> {
        Box::pin(self.probe(url, timeout))
    }
}

/// Probe `url` once with a default [`HttpProbe`].
pub async fn check(url: &str, timeout: Duration) -> ProbeResult {
    match HttpProbe::new() {
        Ok(probe) => probe.probe(url, timeout).await,
        Err(e) => ProbeResult::now(ProbeOutcome::TransportError(format!("tls setup: {e}"))),
    }
}

/// Run the HTTP/1.1 exchange on an established connection.
async fn send_get<S>(stream: S, path: &str, host_header: String) -> Result<u16, String>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| format!("handshake: {e}"))?;

    // Drive the connection in the background; it ends with the sender.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let req = http::Request::builder()
        .method(http::Method::GET)
        .uri(path)
        .header(http::header::HOST, host_header)
        .header(http::header::USER_AGENT, "vigil-probe/0.1")
        .header(http::header::CONNECTION, "close")
        .body(http_body_util::Empty::<bytes::Bytes>::new())
        .map_err(|e| format!("build request: {e}"))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| format!("request: {e}"))?;
    Ok(resp.status().as_u16())
}
