use common::error::AppError;
use staging::StateSnapshot;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Reads the previous run's state; a missing file is an empty state.
pub fn load_state(path: Option<&Path>) -> Result<StateSnapshot, AppError> {
    let Some(path) = path else {
        return Ok(StateSnapshot::new());
    };
    if !path.exists() {
        debug!("No state at {}, starting fresh", path.display());
        return Ok(StateSnapshot::new());
    }
    let raw = fs::read_to_string(path).map_err(AppError::init)?;
    if raw.trim().is_empty() {
        return Ok(StateSnapshot::new());
    }
    serde_json::from_str(&raw).map_err(|err| {
        AppError::init_msg(format!("state file {} is corrupt: {err}", path.display()))
    })
}

pub fn save_state(path: Option<&Path>, state: &StateSnapshot) -> Result<(), AppError> {
    let Some(path) = path else {
        return Ok(());
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(AppError::run)?;
    }
    let body = serde_json::to_string_pretty(state).map_err(AppError::run)?;
    fs::write(path, body).map_err(AppError::run)?;
    info!("Saved state for {} source(s) to {}", state.len(), path.display());
    Ok(())
}
