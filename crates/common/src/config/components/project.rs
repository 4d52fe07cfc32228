use crate::config::components::inputs::InputMappingConfig;
use crate::config::components::target::TargetConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TOKEN_ENV: &str = "STORAGE_API_TOKEN";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 3_600;

// ---------------- project config ----------------
#[derive(Debug, Clone, Deserialize)]
pub struct StagerConfig {
    pub storage: StorageConfig,
    /// Overrides the branch the token is scoped to.
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub polling: PollingConfig,
    pub target: TargetConfig,
    #[serde(default)]
    pub state_path: Option<PathBuf>,
    #[serde(default)]
    pub input: InputMappingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub url: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_POLL_TIMEOUT_SECS
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
