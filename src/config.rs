use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::UserDirs;
use serde::{Deserialize, Serialize};

use crate::error::VizError;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_READ_RETRIES: usize = 3;
pub const API_URL_ENV: &str = "EQVIZ_API_URL";
const CONFIG_FILE: &str = "eqviz.json";

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub read_retries: Option<usize>,
    #[serde(default)]
    pub download_dir: Option<String>,
}

/// Values that win over the config file, in increasing priority.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub env_api_url: Option<String>,
    pub cli_api_url: Option<String>,
}

impl ConfigOverrides {
    pub fn from_env(cli_api_url: Option<String>) -> Self {
        Self {
            env_api_url: std::env::var(API_URL_ENV)
                .ok()
                .filter(|value| !value.trim().is_empty()),
            cli_api_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout: Duration,
    pub read_retries: usize,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub api: ApiSettings,
    pub download_dir: Utf8PathBuf,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, VizError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| VizError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content).map_err(|err| VizError::ConfigParse(err.to_string()))?
        };

        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, VizError> {
        let base_url = overrides
            .cli_api_url
            .or(overrides.env_api_url)
            .or(config.api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let base_url = normalize_base_url(&base_url)?;

        let timeout_secs = config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(VizError::ConfigParse(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }

        let download_dir = match config.download_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => default_download_dir()?,
        };

        Ok(ResolvedConfig {
            api: ApiSettings {
                base_url,
                timeout: Duration::from_secs(timeout_secs),
                read_retries: config.read_retries.unwrap_or(DEFAULT_READ_RETRIES),
            },
            download_dir,
        })
    }
}

fn normalize_base_url(value: &str) -> Result<String, VizError> {
    let trimmed = value.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(VizError::ConfigParse(format!(
            "api url must start with http:// or https://: {value}"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn default_download_dir() -> Result<Utf8PathBuf, VizError> {
    if let Some(dir) = UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(|dir| dir.to_path_buf()))
        .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
    {
        return Ok(dir);
    }
    let cwd = std::env::current_dir().map_err(|err| VizError::Filesystem(err.to_string()))?;
    Utf8PathBuf::from_path_buf(cwd)
        .map_err(|_| VizError::Filesystem("invalid working directory path".to_string()))
}
