/*!
 * Supervisor Configuration
 * Immutable settings loaded once at start-up and shared by reference
 */

use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Directory searched for `<name>.lua` executables when none is configured
pub const DEFAULT_INSTANCES_DIR: &str = "/etc/supervisor/instances";

/// Grace period given to an instance before escalation
pub const DEFAULT_TERMINATION_TIMEOUT: Duration = Duration::from_secs(30);

/// The HTTP layer is given this many grace periods to drain on shutdown
const SERVICE_TERMINATION_FACTOR: u32 = 5;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Supervisor settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Root under which instance executables are resolved by name
    pub instances_dir: PathBuf,
    /// Time an instance gets to exit after SIGINT; given in seconds in JSON
    #[serde(deserialize_with = "duration_from_secs")]
    pub termination_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instances_dir: PathBuf::from(DEFAULT_INSTANCES_DIR),
            termination_timeout: DEFAULT_TERMINATION_TIMEOUT,
        }
    }
}

impl Config {
    pub fn new(instances_dir: impl Into<PathBuf>, termination_timeout: Duration) -> Self {
        Self {
            instances_dir: instances_dir.into(),
            termination_timeout,
        }
    }

    /// Load and validate a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate a JSON config document
    pub fn from_json(raw: &str) -> ConfigResult<Self> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.termination_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "termination_timeout must be at least one second".into(),
            ));
        }
        if self.instances_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("instances_dir is empty".into()));
        }
        Ok(())
    }

    /// Upper bound for draining the command layer during service shutdown
    pub fn service_termination_timeout(&self) -> Duration {
        self.termination_timeout * SERVICE_TERMINATION_FACTOR
    }
}

fn duration_from_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(secs))
}
