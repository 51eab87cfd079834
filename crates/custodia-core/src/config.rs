//! Operator configuration, loaded from TOML.
//!
//! Every field has a default so an empty file (or no file at all) yields a
//! working configuration pointing at `custodia.db` in the working directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or serializing configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}")]
    Read {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be rendered back to TOML.
    #[error("failed to serialize config")]
    Serialize(#[from] toml::ser::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct CustodiaConfig {
    /// Storage settings.
    pub store: StoreConfig,
    /// Append retry policy.
    pub append: AppendConfig,
    /// Actor resolution settings.
    pub identity: IdentityConfig,
}

/// Where and how the SQLite store is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Database file path.
    pub path: PathBuf,
    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("custodia.db"),
            busy_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    /// Busy timeout as a [`Duration`].
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Retry policy for appends that lose a tail race.
///
/// The appender itself never retries; this policy is applied by callers
/// around the whole read-compute-write cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppendConfig {
    /// Retries after the initial attempt. 0 disables retrying.
    pub max_retries: u32,
    /// Base backoff between attempts in milliseconds; doubles per attempt.
    pub backoff_ms: u64,
}

impl Default for AppendConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 25,
        }
    }
}

/// How the acting principal is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    /// Environment variable consulted for the actor id.
    pub actor_env: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            actor_env: "CUSTODIA_ACTOR".to_string(),
        }
    }
}

impl CustodiaConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid TOML for this schema.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on invalid TOML or unknown fields.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if the value cannot be rendered.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
