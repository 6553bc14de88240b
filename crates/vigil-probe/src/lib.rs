//! vigil-probe — the health probe for the Vigil monitor.
//!
//! One probe is one bounded-time HTTP GET against the target URL, over
//! rustls when the URL is `https://`. The outcome is classified purely by
//! status code:
//!
//! ```text
//! 2xx                         → Success(status)
//! any other status            → HttpError(status)
//! refused / DNS / timeout / … → TransportError(cause)
//! ```
//!
//! Probing never fails past its boundary; every failure mode is a value.

pub mod checker;

pub use checker::{HttpProbe, Probe, ProbeOutcome, ProbeResult, check};
