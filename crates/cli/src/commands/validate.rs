use common::config::loader::read_config;
use common::error::AppError;
use staging::SourceSpec;
use std::path::PathBuf;
use tracing::info;

/// Loads the project and validates its input mapping offline.
pub fn handle_validate(config_path: Option<PathBuf>) -> Result<(), AppError> {
    let config = read_config(config_path).map_err(AppError::init)?;
    let specs = SourceSpec::from_mapping(&config.input).map_err(AppError::init)?;
    info!(
        "Input mapping is valid: {} source(s) staged into {:?}",
        specs.len(),
        config.target
    );
    Ok(())
}
