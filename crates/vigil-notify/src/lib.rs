//! vigil-notify — alert delivery for the Vigil monitor.
//!
//! Notifications are best effort. [`Notifier::notify`] answers `true` when
//! the relay accepted the message and `false` when delivery was skipped
//! (incomplete configuration) or failed; it never returns an error and
//! never retries.
//!
//! # SMTP session
//!
//! ```text
//! connect → 220 → EHLO → STARTTLS → [TLS] → EHLO → AUTH PLAIN | LOGIN
//!         → MAIL FROM → RCPT TO (each) → DATA → message → QUIT
//! ```
//!
//! The AUTH mechanism is picked from the post-STARTTLS EHLO reply. A fresh
//! connection is opened for every message, and the whole session runs under
//! one deadline.

pub mod error;
pub mod notifier;
pub mod smtp;

pub use error::NotifyError;
pub use notifier::{Notifier, SmtpNotifier};
