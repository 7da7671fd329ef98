//! Service configuration.
//!
//! Configuration is stored as TOML at `$RANGEPULL_CONFIG`, or
//! `~/.config/rangepull/service.toml` when the variable is unset.
//! A missing file yields the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use rangepull_engine::{DEFAULT_POLL_INTERVAL, EngineConfig};
use rangepull_remote::{DEFAULT_COMMAND_TIMEOUT, SshTarget};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "RANGEPULL_CONFIG";

/// Service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub ssh: SshSection,
    #[serde(default)]
    pub service: ServiceSection,
}

/// Transfer engine options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_part_size")]
    pub part_size_bytes: i64,

    /// Minimum free space in percent; unset disables the gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_space_percentage_threshold: Option<u8>,

    /// Filesystem (as reported by `df`) the threshold applies to; unset disables the gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_space_filesystem: Option<String>,

    #[serde(default = "default_poll_interval")]
    pub free_space_poll_interval_seconds: u64,

    /// Parts fetched at once per job; unset fetches every part at once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_fetch_concurrency_limit: Option<usize>,
}

/// How remote servers are reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SshSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Directory holding the identity files named by `destination.credentials`.
    #[serde(default = "default_identity_dir")]
    pub identity_dir: PathBuf,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,

    /// Extra `-o Key=Value` options passed to every connection.
    #[serde(default)]
    pub options: Vec<String>,
}

/// Queue front-end options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSection {
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

fn default_part_size() -> i64 {
    EngineConfig::default().part_size_bytes
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_identity_dir() -> PathBuf {
    home_dir().join(".ssh")
}

fn default_command_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT.as_secs()
}

fn default_max_concurrent_jobs() -> usize {
    4
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            part_size_bytes: default_part_size(),
            free_space_percentage_threshold: None,
            free_space_filesystem: None,
            free_space_poll_interval_seconds: default_poll_interval(),
            part_fetch_concurrency_limit: None,
        }
    }
}

impl Default for SshSection {
    fn default() -> Self {
        Self {
            user: None,
            port: None,
            identity_dir: default_identity_dir(),
            command_timeout_seconds: default_command_timeout(),
            options: Vec::new(),
        }
    }
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

impl EngineSection {
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            part_size_bytes: self.part_size_bytes,
            free_space_percentage_threshold: self.free_space_percentage_threshold,
            free_space_filesystem: self.free_space_filesystem.clone(),
            free_space_poll_interval: Duration::from_secs(self.free_space_poll_interval_seconds),
            part_fetch_concurrency_limit: self.part_fetch_concurrency_limit,
        }
    }
}

impl SshSection {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }

    /// Builds the connection target for `host`, authenticating with the
    /// identity file `credentials` inside [`identity_dir`](Self::identity_dir).
    pub fn target_for(&self, host: &str, credentials: &str) -> anyhow::Result<SshTarget> {
        if host.is_empty() || host.starts_with('-') {
            anyhow::bail!("invalid destination host: {host:?}");
        }
        if credentials.is_empty()
            || credentials.contains('/')
            || credentials == "."
            || credentials == ".."
        {
            anyhow::bail!("invalid credentials name: {credentials:?}");
        }
        Ok(SshTarget {
            host: host.to_string(),
            user: self.user.clone(),
            port: self.port,
            identity_file: Some(self.identity_dir.join(credentials)),
            options: self.options.clone(),
        })
    }
}

impl Config {
    /// Loads configuration from [`config_path`], falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.engine.part_size_bytes <= 0 {
            anyhow::bail!("engine.part_size_bytes must be positive");
        }
        if self
            .engine
            .free_space_percentage_threshold
            .is_some_and(|t| t > 100)
        {
            anyhow::bail!("engine.free_space_percentage_threshold must be within 0-100");
        }
        if self.service.max_concurrent_jobs == 0 {
            anyhow::bail!("service.max_concurrent_jobs must be at least 1");
        }
        Ok(())
    }
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".into()))
}

/// Returns the configuration file path.
pub fn config_path() -> PathBuf {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => PathBuf::from(path),
        None => home_dir()
            .join(".config")
            .join("rangepull")
            .join("service.toml"),
    }
}
