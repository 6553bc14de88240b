//! vigil-runtime — the host-side capabilities the monitor can invoke.
//!
//! - [`ContainerController`]: restart a named workload. The production
//!   implementation, [`DockerController`], talks to the Docker Engine API
//!   over its Unix control socket. Availability is decided once, at
//!   construction; an unavailable controller answers every restart with
//!   [`RestartOutcome::Unavailable`] without touching the socket.
//! - [`HostReboot`]: the last-resort, irreversible host reboot.

pub mod container;
pub mod error;
pub mod reboot;

pub use container::{ContainerController, DockerController, RestartOutcome};
pub use error::{RebootError, RuntimeError};
pub use reboot::{HostReboot, SystemReboot};
