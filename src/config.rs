/// Runtime configuration for the ingestion service.
///
/// Resolution order (later wins):
///   1. Built-in defaults
///   2. TOML file (`sources.toml` by default)
///   3. Environment (`BROWNCLAW_*`, after `.env` is loaded by the binary)
///
/// A file with no `[[sources]]` table uses the built-in source registry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::ingest::FallbackPolicy;
use crate::ingest::fetch::{DEFAULT_USER_AGENT, FetchConfig};
use crate::inventory::InventorySource;
use crate::sources::{self, SourceDescriptor, SourceRegistry};

pub const ENV_TIMEOUT_SECS: &str = "BROWNCLAW_TIMEOUT_SECS";
pub const ENV_CONCURRENCY_LIMIT: &str = "BROWNCLAW_CONCURRENCY_LIMIT";
pub const ENV_LOG_LEVEL: &str = "BROWNCLAW_LOG_LEVEL";
pub const ENV_LOG_FILE: &str = "BROWNCLAW_LOG_FILE";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

pub const DEFAULT_CONFIG_PATH: &str = "sources.toml";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("source registry is empty")]
    EmptyRegistry,

    #[error("source {name}: url_template lacks the {{station_id}} placeholder")]
    MissingPlaceholder { name: String },

    #[error("source {name}: url_template does not render to a valid URL: {reason}")]
    InvalidUrl { name: String, reason: String },

    #[error("more than one source has priority {priority}")]
    DuplicatePriority { priority: u32 },

    #[error("more than one source is named {name}")]
    DuplicateName { name: String },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("environment variable {var}={value:?} is not valid")]
    InvalidEnv { var: &'static str, value: String },

    #[error("concurrency_limit must be at least 1")]
    ZeroConcurrency,

    #[error("timeout_secs must be at least 1")]
    ZeroTimeout,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    pub timeout_secs: u64,
    pub concurrency_limit: usize,
    pub user_agent: String,
    pub fall_back_on_malformed: bool,
    pub stop_on_not_found: bool,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub sources: Option<Vec<SourceDescriptor>>,
    pub inventory: InventorySource,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            concurrency_limit: 8,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            fall_back_on_malformed: false,
            stop_on_not_found: false,
            log_level: "info".to_string(),
            log_file: None,
            sources: None,
            inventory: InventorySource::default(),
        }
    }
}

impl IngestConfig {
    /// Reads a TOML file. A missing file is an error; use
    /// [`IngestConfig::default`] when no file is wanted.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Applies `BROWNCLAW_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_env_overrides_from(|var| std::env::var(var).ok())
    }

    /// Applies overrides using `lookup` in place of the process environment.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_TIMEOUT_SECS) {
            self.timeout_secs = parse_env(ENV_TIMEOUT_SECS, value)?;
        }
        if let Some(value) = lookup(ENV_CONCURRENCY_LIMIT) {
            self.concurrency_limit = parse_env(ENV_CONCURRENCY_LIMIT, value)?;
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.log_level = value;
        }
        if let Some(value) = lookup(ENV_LOG_FILE) {
            self.log_file = (!value.trim().is_empty()).then(|| PathBuf::from(value));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency_limit == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        let registry = self.registry()?;
        if registry.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }
        self.inventory.validate()
    }

    /// The configured sources, or the built-in defaults when none are listed.
    pub fn registry(&self) -> Result<SourceRegistry, ConfigError> {
        match &self.sources {
            Some(descriptors) => SourceRegistry::new(descriptors.clone()),
            None => sources::default_registry(),
        }
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        FallbackPolicy {
            fall_back_on_malformed: self.fall_back_on_malformed,
            stop_on_not_found: self.stop_on_not_found,
        }
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}
