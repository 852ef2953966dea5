//! Client configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is honoured for local use.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Log output format for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Client configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Apps Script web app URL (the `.../exec` endpoint)
    pub backend_url: String,
    /// Directory holding the secure store and the local cache
    pub data_dir: PathBuf,
    /// Connect/read/write timeout for backend calls
    pub http_timeout: Duration,
    /// Sync interval while the app is in the foreground
    pub sync_foreground_interval: Duration,
    /// Sync interval while the app is in the background
    pub sync_background_interval: Duration,
    /// Oldest QR login code that is still accepted
    pub qr_max_age: Duration,
    pub log_format: LogFormat,
}

impl ClientConfig {
    /// Config for tests: points at `backend_url` and stores data in `data_dir`.
    pub fn test_default(backend_url: &str, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend_url: backend_url.to_string(),
            data_dir: data_dir.into(),
            http_timeout: Duration::from_secs(5),
            sync_foreground_interval: Duration::from_secs(30),
            sync_background_interval: Duration::from_secs(900),
            qr_max_age: Duration::from_secs(7 * 24 * 60 * 60),
            log_format: LogFormat::Pretty,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let backend_url = env::var("CHOREQUEST_BACKEND_URL")
            .map(|v| v.trim().to_string())
            .map_err(|_| ConfigError::Missing("CHOREQUEST_BACKEND_URL"))?;
        if !backend_url.starts_with("http://") && !backend_url.starts_with("https://") {
            return Err(ConfigError::Invalid(
                "CHOREQUEST_BACKEND_URL",
                backend_url.clone(),
            ));
        }

        let log_format = match env::var("CHOREQUEST_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("pretty") | Err(_) => LogFormat::Pretty,
            Ok(other) => {
                return Err(ConfigError::Invalid(
                    "CHOREQUEST_LOG_FORMAT",
                    other.to_string(),
                ))
            }
        };

        Ok(Self {
            backend_url,
            data_dir: env::var("CHOREQUEST_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./chorequest-data")),
            http_timeout: secs_var("CHOREQUEST_HTTP_TIMEOUT_SECS", 60)?,
            sync_foreground_interval: secs_var("CHOREQUEST_SYNC_FOREGROUND_SECS", 30)?,
            sync_background_interval: secs_var("CHOREQUEST_SYNC_BACKGROUND_SECS", 900)?,
            qr_max_age: secs_var("CHOREQUEST_QR_MAX_AGE_SECS", 7 * 24 * 60 * 60)?,
            log_format,
        })
    }
}

fn secs_var(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
