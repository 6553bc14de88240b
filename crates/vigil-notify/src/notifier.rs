//! Notifier capability and its SMTP implementation.

use std::sync::Arc;

use tracing::{info, warn};

use vigil_core::{BoxFuture, SmtpConfig, host_identity};

use crate::error::NotifyError;
use crate::smtp::{self, Envelope};

/// A session makes roughly this many round trips; each one may use the
/// full per-operation timeout before the whole delivery is abandoned.
const DELIVERY_DEADLINE_FACTOR: u32 = 6;

/// Best-effort alert sink.
pub trait Notifier: Send + Sync {
    /// Deliver one message. `true` means the sink accepted it; `false`
    /// means delivery was skipped or failed. Never panics or errors.
    fn notify<'a>(&'a self, subject: &'a str, body: &'a str) -> BoxFuture<'a, bool>;
}

/// Sends alerts through an SMTP relay, one connection per message.
#[derive(Clone)]
pub struct SmtpNotifier {
    smtp: SmtpConfig,
    /// Client side of the STARTTLS upgrade.
    tls: Arc<rustls::ClientConfig>,
    /// Name announced in EHLO.
    helo_name: String,
}

impl std::fmt::Debug for SmtpNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpNotifier")
            .field("smtp", &self.smtp)
            .field("helo_name", &self.helo_name)
            .finish_non_exhaustive()
    }
}

impl SmtpNotifier {
    /// Create a notifier that verifies the relay against the Mozilla roots.
    pub fn new(smtp: SmtpConfig) -> Result<Self, NotifyError> {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| NotifyError::Tls(format!("protocol versions: {e}")))?
        .with_root_certificates(roots)
        .with_no_client_auth();
        Ok(Self::with_tls_config(smtp, Arc::new(tls)))
    }

    /// Create a notifier with a caller-supplied TLS client configuration,
    /// e.g. one trusting a private relay CA.
    pub fn with_tls_config(smtp: SmtpConfig, tls: Arc<rustls::ClientConfig>) -> Self {
        Self {
            smtp,
            tls,
            helo_name: host_identity(),
        }
    }

    /// Whether every setting needed for delivery is present.
    pub fn is_configured(&self) -> bool {
        self.smtp.credentials().is_some()
    }

    async fn send(&self, subject: &str, body: &str) -> bool {
        let Some(creds) = self.smtp.credentials() else {
            info!(%subject, "email configuration incomplete; skipping notification");
            return false;
        };
        let envelope = match Envelope::new(&creds.from, &creds.to, subject, body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, %subject, "cannot build notification");
                return false;
            }
        };

        let deadline = creds.timeout * DELIVERY_DEADLINE_FACTOR;
        let tls = Arc::clone(&self.tls);
        let helo_name = self.helo_name.clone();
        let task = tokio::task::spawn_blocking(move || {
            smtp::deliver(&creds, &helo_name, &tls, &envelope)
        });

        // On timeout the blocking session is left to its socket timeouts.
        let result = match tokio::time::timeout(deadline, task).await {
            Ok(Ok(delivered)) => delivered,
            Ok(Err(e)) => Err(NotifyError::Task(e.to_string())),
            Err(_) => Err(NotifyError::Timeout(deadline)),
        };

        match result {
            Ok(()) => {
                info!(%subject, "alert email sent");
                true
            }
            Err(e) => {
                warn!(error = %e, %subject, "failed to send alert email");
                false
            }
        }
    }
}

impl Notifier for SmtpNotifier {
    fn notify<'a>(&'a self, subject: &'a str, body: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(self.send(subject, body))
    }
}
