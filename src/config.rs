//! Service configuration, read once from the environment at startup.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_OCR_SERVICE_URL: &str = "http://ia-service:8001/ocr";
const DEFAULT_UPLOAD_DIR: &str = "/tmp/uploads";
const DEFAULT_DATABASE_PATH: &str = "documents.db";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:9090";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Everything the service needs to wire itself together.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub ocr_service_url: String,
    pub upload_dir: PathBuf,
    pub database_path: PathBuf,
    pub bind_addr: String,
    pub max_upload_bytes: usize,
    /// Outbound OCR call timeout. `None` leaves the call unbounded.
    pub ocr_timeout: Option<Duration>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ocr_service_url: DEFAULT_OCR_SERVICE_URL.to_string(),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            ocr_timeout: None,
        }
    }
}

impl ServiceConfig {
    /// Build the config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let ocr_timeout = parse_var::<u64>(&lookup, "OCR_TIMEOUT_SECS")?.map(Duration::from_secs);

        Ok(Self {
            ocr_service_url: lookup("OCR_SERVICE_URL").unwrap_or(defaults.ocr_service_url),
            upload_dir: lookup("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            database_path: lookup("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_upload_bytes: parse_var(&lookup, "MAX_UPLOAD_BYTES")?
                .unwrap_or(defaults.max_upload_bytes),
            ocr_timeout,
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {}: {:?}", key, raw))
        })
        .transpose()
}
