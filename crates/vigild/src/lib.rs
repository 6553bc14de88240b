//! vigild — the Vigil liveness monitor daemon.
//!
//! Wires the probe, notifier, container controller, and reboot capability
//! into an [`vigil_engine::EscalationEngine`], runs it on its own task, and
//! optionally serves a small status API for the monitor itself.

pub mod cli;
pub mod status;

use std::path::PathBuf;

/// Load a `.env` file into the process environment without overriding
/// variables that are already set.
///
/// `VIGIL_ENV_FILE` names the file explicitly; otherwise `./monitor/.env` is
/// used when present, then `./.env`. Returns the loaded path, if any.
pub fn load_env_file() -> Result<Option<PathBuf>, dotenvy::Error> {
    if let Ok(path) = std::env::var("VIGIL_ENV_FILE") {
        let path = PathBuf::from(path);
        dotenvy::from_path(&path)?;
        return Ok(Some(path));
    }

    let monitor_env = PathBuf::from("./monitor/.env");
    if monitor_env.exists() {
        dotenvy::from_path(&monitor_env)?;
        return Ok(Some(monitor_env));
    }

    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
