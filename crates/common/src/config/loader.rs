use crate::config::components::project::{StagerConfig, StorageConfig};
use crate::config::components::target::TargetConfig;
use crate::config::error::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

pub const PROJECT_FILE_NAME: &str = "stager.yml";

/// Load `stager.yml`.
///
/// `config_path` may point at the file itself or at the directory holding it;
/// without it the file is looked up in the working directory. Relative paths
/// inside the file are resolved against the directory the file lives in.
pub fn read_config(config_path: Option<PathBuf>) -> Result<StagerConfig, ConfigError> {
    let project_file_path = match config_path {
        Some(path) if path.is_dir() => path.join(PROJECT_FILE_NAME),
        Some(path) => path,
        None => PathBuf::from(PROJECT_FILE_NAME),
    };
    if !project_file_path.exists() {
        return Err(ConfigError::incorrect_path(&project_file_path));
    }

    let project_file = fs::File::open(&project_file_path)?;
    let mut config: StagerConfig = serde_yaml::from_reader(project_file)?;

    let config_root = project_file_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    if let TargetConfig::Local { path } = &mut config.target {
        *path = resolve_path(&config_root, path);
    }
    config.state_path = config
        .state_path
        .as_ref()
        .map(|state| resolve_path(&config_root, state));

    validate(&config)?;
    Ok(config)
}

fn validate(config: &StagerConfig) -> Result<(), ConfigError> {
    if config.storage.url.trim().is_empty() {
        return Err(ConfigError::invalid("storage.url must not be empty"));
    }
    if config.polling.interval_ms == 0 {
        return Err(ConfigError::invalid("polling.interval_ms must be positive"));
    }
    if config.input.tables.is_empty() && config.input.files.is_empty() {
        return Err(ConfigError::invalid(
            "input mapping declares neither tables nor files",
        ));
    }
    Ok(())
}

/// Read the storage token from the environment variable named in the config.
pub fn storage_token(storage: &StorageConfig) -> Result<String, ConfigError> {
    std::env::var(&storage.token_env)
        .ok()
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| ConfigError::missing_token(&storage.token_env))
}

fn resolve_path(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
