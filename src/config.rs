use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

pub const CONFIG_PATH_ENV: &str = "EARNING_REPORT_CONFIG";
const DATABASE_URI_ENV: &str = "EARNING_REPORT_DATABASE_URI";
const POOL_RECYCLE_ENV: &str = "EARNING_REPORT_POOL_RECYCLE_SECS";
const STRICT_EXIT_ENV: &str = "EARNING_REPORT_STRICT_EXIT";
const INCLUDE_END_BOUNDARY_ENV: &str = "EARNING_REPORT_INCLUDE_END_BOUNDARY";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Defaults, then the TOML file (explicit path or `./earning-report.toml`), then env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else {
            let default_path = PathBuf::from("earning-report.toml");
            if default_path.exists() {
                Self::from_file(&default_path)?
            } else {
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self =
            toml::from_str(&contents).with_context(|| "failed to parse configuration TOML")?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(uri) = env::var(DATABASE_URI_ENV) {
            if !uri.trim().is_empty() {
                self.database.uri = uri;
            }
        }
        if let Ok(recycle) = env::var(POOL_RECYCLE_ENV) {
            if let Ok(value) = recycle.trim().parse::<u64>() {
                self.database.pool_recycle_secs = value;
            }
        }
        if let Some(value) = env_flag(STRICT_EXIT_ENV) {
            self.report.strict_exit = value;
        }
        if let Some(value) = env_flag(INCLUDE_END_BOUNDARY_ENV) {
            self.report.include_end_boundary = value;
        }
    }
}

fn env_flag(key: &str) -> Option<bool> {
    let raw = env::var(key).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_uri")]
    pub uri: String,
    /// Connections older than this are closed and reopened.
    #[serde(default = "default_pool_recycle")]
    pub pool_recycle_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: default_database_uri(),
            pool_recycle_secs: default_pool_recycle(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// Exit non-zero when the run fails instead of only logging the error.
    #[serde(default)]
    pub strict_exit: bool,
    /// Count ledger entries stamped exactly at the next day's midnight.
    #[serde(default = "default_include_end_boundary")]
    pub include_end_boundary: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            strict_exit: false,
            include_end_boundary: default_include_end_boundary(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_database_uri() -> String {
    "sqlite://earning-report.db".to_string()
}

fn default_pool_recycle() -> u64 {
    500
}

fn default_max_connections() -> u32 {
    1
}

fn default_include_end_boundary() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}
