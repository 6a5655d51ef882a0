//! Engine configuration
//!
//! Loaded from `shardline.toml`. A `.env` file next to it is read first, and
//! the following environment variables override the file:
//!
//! - `SHARDLINE_PORT` - HTTP port
//! - `SHARDLINE_MODE` - `connection` or `forward`
//! - `SHARDLINE_EXECUTOR_SIZE` - worker pool size
//! - `SHARDLINE_BACKEND_TIMEOUT` - forwarded reply timeout, in seconds
//! - `SHARDLINE_SHOW_SQL` - log every physical statement

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::executor::ConnectionMode;
use crate::transaction::TransactionType;

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "shardline.toml";

/// Environment variable names
pub const ENV_PORT: &str = "SHARDLINE_PORT";
pub const ENV_MODE: &str = "SHARDLINE_MODE";
pub const ENV_EXECUTOR_SIZE: &str = "SHARDLINE_EXECUTOR_SIZE";
pub const ENV_BACKEND_TIMEOUT: &str = "SHARDLINE_BACKEND_TIMEOUT";
pub const ENV_SHOW_SQL: &str = "SHARDLINE_SHOW_SQL";

/// How physical statements reach the backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// The engine owns one connection per data source per statement
    #[default]
    Connection,
    /// Units are forwarded over shared channels and replies are collected
    Forward,
}

impl DispatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchMode::Connection => "connection",
            DispatchMode::Forward => "forward",
        }
    }
}

impl std::str::FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "connection" => Ok(DispatchMode::Connection),
            "forward" => Ok(DispatchMode::Forward),
            other => Err(format!("unknown dispatch mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub mode: DispatchMode,
    #[serde(default)]
    pub connection_mode: ConnectionMode,
    /// Worker pool size for non-first unit groups
    #[serde(default = "default_executor_size")]
    pub executor_size: usize,
    /// How long a forwarded statement waits for all replies
    #[serde(default = "default_backend_timeout_secs")]
    pub backend_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Rows per fetch when streaming results
    #[serde(default = "default_fetch_size")]
    pub fetch_size: u32,
    #[serde(default)]
    pub show_sql: bool,
    #[serde(default)]
    pub transaction_type: TransactionType,
    /// Data source name -> backend `host:port`
    #[serde(default)]
    pub data_sources: BTreeMap<String, String>,
}

fn default_port() -> u16 {
    3310
}

fn default_executor_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(4)
}

fn default_backend_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

fn default_fetch_size() -> u32 {
    1000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            mode: DispatchMode::default(),
            connection_mode: ConnectionMode::default(),
            executor_size: default_executor_size(),
            backend_timeout_secs: default_backend_timeout_secs(),
            connect_timeout_ms: default_connect_timeout_ms(),
            fetch_size: default_fetch_size(),
            show_sql: false,
            transaction_type: TransactionType::default(),
            data_sources: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `path`, or from `shardline.toml` in the
    /// working directory when it exists. Defaults apply otherwise.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Configuration file not found: {}", p.display());
                }
                Some(p.to_path_buf())
            }
            None => {
                let default = Path::new(CONFIG_FILE_NAME);
                default.exists().then(|| default.to_path_buf())
            }
        };

        // Load env file if present (ignore errors)
        let env_dir = config_path
            .as_deref()
            .and_then(|p| p.parent())
            .unwrap_or_else(|| Path::new("."));
        let env_path = env_dir.join(".env");
        if env_path.exists() {
            let _ = dotenvy::from_path(&env_path);
        }

        let mut config = match &config_path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides to the configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var(ENV_PORT) {
            if let Ok(port) = port.parse::<u16>() {
                self.port = port;
            }
        }

        if let Ok(mode) = std::env::var(ENV_MODE) {
            match mode.parse::<DispatchMode>() {
                Ok(mode) => self.mode = mode,
                Err(e) => tracing::warn!("Ignoring {}: {}", ENV_MODE, e),
            }
        }

        if let Ok(size) = std::env::var(ENV_EXECUTOR_SIZE) {
            if let Ok(size) = size.parse::<usize>() {
                self.executor_size = size;
            }
        }

        if let Ok(secs) = std::env::var(ENV_BACKEND_TIMEOUT) {
            if let Ok(secs) = secs.parse::<u64>() {
                self.backend_timeout_secs = secs;
            }
        }

        if let Ok(show) = std::env::var(ENV_SHOW_SQL) {
            self.show_sql = matches!(show.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.executor_size == 0 {
            anyhow::bail!("executor_size must be at least 1");
        }
        if self.backend_timeout_secs == 0 {
            anyhow::bail!("backend_timeout_secs must be at least 1");
        }
        if self.fetch_size == 0 {
            anyhow::bail!("fetch_size must be at least 1");
        }
        for (name, addr) in &self.data_sources {
            if !addr.contains(':') {
                anyhow::bail!("data source '{}' has no port in address '{}'", name, addr);
            }
        }
        Ok(())
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
