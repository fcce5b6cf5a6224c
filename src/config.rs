use serde::Deserialize;
use std::time::Duration;
use config::{Config as ConfigLoader, Environment, File};
use url::Url;

use crate::error::{AppError, Result};
use crate::http::rate_limiter::MIN_WINDOW;
use crate::utils::time::TimeUnit;

pub const DEFAULT_API_URL: &str = "https://ismp.crpt.ru/api/v3/lk/documents/create";
pub const DEFAULT_REQUEST_LIMIT: usize = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // General
    pub log_level: String,
    pub log_format: LogFormat,

    // Registration service
    pub api_url: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,

    // Rate limit: at most `request_limit` calls per one `time_unit`
    pub time_unit: TimeUnit,
    pub request_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            api_url: DEFAULT_API_URL.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            time_unit: TimeUnit::Seconds,
            request_limit: DEFAULT_REQUEST_LIMIT,
        }
    }
}

impl Config {
    /// Load from an optional `crpt.{toml,yaml,json}` file, then `CRPT_*`
    /// environment variables (a `.env` file is read first if present).
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let defaults = Self::default();
        let loader = ConfigLoader::builder()
            .set_default("log_level", defaults.log_level)?
            .set_default("log_format", "text")?
            .set_default("api_url", defaults.api_url)?
            .set_default("connect_timeout_secs", defaults.connect_timeout_secs)?
            .set_default("request_timeout_secs", defaults.request_timeout_secs)?
            .set_default("time_unit", defaults.time_unit.to_string())?
            .set_default("request_limit", defaults.request_limit as u64)?
            .add_source(File::with_name("crpt").required(false))
            .add_source(Environment::with_prefix("CRPT").try_parsing(true))
            .build()?;

        let config: Config = loader.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_limit == 0 {
            return Err(AppError::Init("request_limit must be positive".into()));
        }
        if self.window() < MIN_WINDOW {
            return Err(AppError::Init(format!(
                "time_unit {} is shorter than the minimum window of {:?}",
                self.time_unit, MIN_WINDOW
            )));
        }
        if self.connect_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(AppError::Init("HTTP timeouts must be positive".into()));
        }

        let url = Url::parse(&self.api_url)
            .map_err(|e| AppError::Init(format!("Invalid api_url: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::Init(format!("Unsupported api_url scheme: {}", url.scheme())));
        }

        Ok(())
    }

    pub fn window(&self) -> Duration {
        self.time_unit.as_duration()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
