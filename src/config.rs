//! Runtime configuration.
//!
//! API credentials come from the environment; analytics settings (segment
//! names, cache periods) live in the `app_config` table so they can be changed
//! with `newsletterdw config set`.
use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::error::{Error, Result};
use crate::storage::repository;
use crate::window::Window;

pub const ENV_API_KEY: &str = "BEEHIIV_API_KEY";
pub const ENV_API_BASE: &str = "BEEHIIV_API_BASE";
pub const ENV_API_DELAY_MS: &str = "NEWSLETTERDW_API_DELAY_MS";

pub const DEFAULT_API_BASE: &str = "https://api.beehiiv.com/v2/";
/// Keeps a sequential caller under ~180 requests/minute.
pub const DEFAULT_API_DELAY_MS: u64 = 350;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub const KEY_SEGMENT_A: &str = "segment_a";
pub const KEY_SEGMENT_B: &str = "segment_b";
pub const KEY_PERIODS: &str = "periods";

pub const DEFAULT_SEGMENT_A: &str = "morning";
pub const DEFAULT_SEGMENT_B: &str = "night";
pub const DEFAULT_PERIODS: &[u32] = &[7, 30, 90];

/// Settings for the publication API client.
#[derive(Clone)]
pub struct ApiConfig {
    pub api_key: String,
    pub base_url: Url,
    pub base_delay: Duration,
    pub max_retries: u32,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("base_delay", &self.base_delay)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl ApiConfig {
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::NotConfigured(format!("{ENV_API_KEY} is empty")));
        }
        Ok(Self {
            api_key,
            base_url: parse_base_url(base_url)?,
            base_delay: Duration::from_millis(DEFAULT_API_DELAY_MS),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Read the API settings from the environment. A missing key is fatal.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(ENV_API_KEY)
            .map_err(|_| Error::NotConfigured(format!("{ENV_API_KEY} is not set")))?;
        let base = std::env::var(ENV_API_BASE).unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let mut cfg = Self::new(api_key, &base)?;
        if let Ok(raw) = std::env::var(ENV_API_DELAY_MS) {
            let ms: u64 = raw
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{ENV_API_DELAY_MS} must be an integer: {raw}")))?;
            cfg.base_delay = Duration::from_millis(ms);
        }
        Ok(cfg)
    }
}

/// `Url::join` drops the last path segment unless the base ends in `/`.
fn parse_base_url(raw: &str) -> Result<Url> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| Error::Config(format!("invalid API base URL {raw}: {e}")))
}

/// Which two segments the overlap calculator compares, and which trailing
/// windows the cache refresher maintains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyticsConfig {
    pub segment_a: String,
    pub segment_b: String,
    pub periods: Vec<u32>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            segment_a: DEFAULT_SEGMENT_A.to_string(),
            segment_b: DEFAULT_SEGMENT_B.to_string(),
            periods: DEFAULT_PERIODS.to_vec(),
        }
    }
}

impl AnalyticsConfig {
    /// Load from `app_config`, falling back to defaults for unset keys.
    pub fn load(conn: &rusqlite::Connection) -> Result<Self> {
        let defaults = Self::default();
        let segment_a = repository::get_config(conn, KEY_SEGMENT_A)?.unwrap_or(defaults.segment_a);
        let segment_b = repository::get_config(conn, KEY_SEGMENT_B)?.unwrap_or(defaults.segment_b);
        let periods = match repository::get_config(conn, KEY_PERIODS)? {
            Some(raw) => Window::parse_list(&raw)?,
            None => defaults.periods,
        };
        if segment_a == segment_b {
            return Err(Error::Config(format!(
                "{KEY_SEGMENT_A} and {KEY_SEGMENT_B} must differ (both are '{segment_a}')"
            )));
        }
        Ok(Self {
            segment_a,
            segment_b,
            periods,
        })
    }
}

/// Reject config values that would make `AnalyticsConfig::load` fail later.
pub fn validate_config_value(key: &str, value: &str) -> Result<()> {
    match key {
        KEY_PERIODS => Window::parse_list(value).map(|_| ()),
        KEY_SEGMENT_A | KEY_SEGMENT_B if value.trim().is_empty() => {
            Err(Error::Config(format!("{key} must be non-empty")))
        }
        _ => Ok(()),
    }
}
