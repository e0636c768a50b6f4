//! Configuration loading
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `REPSCORE_CONFIG` environment variable
//! 3. Platform config dir (`~/.config/repscore/config.toml` on Linux)
//! 4. Compiled defaults (fallback)
//!
//! A missing default file is not an error; an explicitly named file that
//! cannot be read is. After the file is loaded, a few `REPSCORE_*`
//! variables override individual fields.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::calculator::GradeRule;
use crate::freshness::FreshnessPolicy;
use crate::{Error, Result};

pub const CONFIG_ENV_VAR: &str = "REPSCORE_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub fetch: FetchConfig,
    pub freshness: FreshnessConfig,
    pub jobs: JobsConfig,
    pub scoring: ScoringConfig,
    pub reports: ReportsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:5780".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir().join("repscore.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub base_url: String,
    pub bearer_token: Option<String>,
    pub timeout_secs: u64,
    /// Minimum spacing between upstream requests
    pub min_interval_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.twitter.com/1.1".to_string(),
            bearer_token: None,
            timeout_secs: 15,
            min_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
    pub max_age_days: i64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            max_age_days: crate::freshness::MAX_AGE_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Run the maintenance jobs on a timer inside `serve`
    pub enabled: bool,
    pub time_budget_secs: u64,
    /// Jobs stop once elapsed time exceeds budget minus margin
    pub margin_secs: u64,
    pub refresh_interval_secs: u64,
    pub cleanup_interval_secs: u64,
    /// Records older than this are refresh candidates
    pub refresh_min_age_hours: i64,
    pub refresh_batch: usize,
    pub cleanup_page_size: usize,
    pub worker_concurrency: usize,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            time_budget_secs: 600,
            margin_secs: 10,
            refresh_interval_secs: 3600,
            cleanup_interval_secs: 86_400,
            refresh_min_age_hours: 24,
            refresh_batch: 1000,
            cleanup_page_size: 500,
            worker_concurrency: 4,
            max_attempts: 5,
            retry_delay_secs: 60,
        }
    }
}

impl JobsConfig {
    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.time_budget_secs)
    }

    pub fn margin(&self) -> Duration {
        Duration::from_secs(self.margin_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub rules: Vec<GradeRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    /// Hosts left out of `/v1/worst_unknown_websites.csv`
    pub known_websites: Vec<String>,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            known_websites: crate::reports::DEFAULT_KNOWN_WEBSITES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Resolve, load and env-override the configuration
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(cli_path) {
            ConfigSource::Explicit(path) => Self::from_file(&path)?,
            ConfigSource::Default(path) => {
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    warn!(
                        "No config file at {}, using compiled defaults",
                        path.display()
                    );
                    Self::default()
                }
            }
            ConfigSource::None => {
                warn!("Could not determine config directory, using compiled defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Apply `REPSCORE_*` field overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("REPSCORE_DATABASE") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(listen) = std::env::var("REPSCORE_LISTEN") {
            self.server.listen = listen;
        }
        if let Ok(url) = std::env::var("REPSCORE_FETCH_URL") {
            self.fetch.base_url = url;
        }
        if let Ok(token) = std::env::var("REPSCORE_FETCH_TOKEN") {
            if !token.trim().is_empty() {
                self.fetch.bearer_token = Some(token);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.freshness.max_age_days <= 0 {
            return Err(Error::Config("freshness.max_age_days must be positive".to_string()));
        }
        if self.jobs.margin_secs >= self.jobs.time_budget_secs {
            return Err(Error::Config(
                "jobs.margin_secs must be smaller than jobs.time_budget_secs".to_string(),
            ));
        }
        if self.jobs.refresh_batch == 0 || self.jobs.cleanup_page_size == 0 {
            return Err(Error::Config("job batch sizes must be positive".to_string()));
        }
        if self.jobs.worker_concurrency == 0 || self.jobs.max_attempts == 0 {
            return Err(Error::Config(
                "jobs.worker_concurrency and jobs.max_attempts must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn freshness_policy(&self) -> FreshnessPolicy {
        FreshnessPolicy::new(chrono::Duration::days(self.freshness.max_age_days))
    }
}

enum ConfigSource {
    Explicit(PathBuf),
    Default(PathBuf),
    None,
}

fn resolve_config_path(cli_path: Option<&Path>) -> ConfigSource {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return ConfigSource::Explicit(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return ConfigSource::Explicit(PathBuf::from(path));
    }

    // Priority 3: platform config dir
    match dirs::config_dir() {
        Some(dir) => ConfigSource::Default(dir.join("repscore").join("config.toml")),
        None => ConfigSource::None,
    }
}

/// OS-dependent default data folder
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("repscore"))
        .unwrap_or_else(|| PathBuf::from("./repscore_data"))
}
