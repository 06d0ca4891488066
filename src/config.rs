//! Environment configuration.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use resource_cache::{CacheError, FileKvStore, ResourceCache};
use server_api::url::DEFAULT_BASE_URL;
use server_api::ApiConfig;

pub const DEFAULT_POLL_SECS: u64 = 5;
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub base_url: String,
    /// Directory for the persistent resource cache; `None` keeps it in memory.
    pub cache_dir: Option<PathBuf>,
    pub poll_interval: Duration,
    pub request_timeout: Option<Duration>,
    pub log_filter: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_dir: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECS),
            request_timeout: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_string_opt("WORKBENCH_SYNC_BASE_URL").unwrap_or(defaults.base_url),
            cache_dir: env_string_opt("WORKBENCH_SYNC_CACHE_DIR").map(PathBuf::from),
            poll_interval: env_secs("WORKBENCH_SYNC_POLL_SECS")
                .filter(|interval| !interval.is_zero())
                .unwrap_or(defaults.poll_interval),
            request_timeout: env_secs("WORKBENCH_SYNC_TIMEOUT_SECS"),
            log_filter: env_string_opt("WORKBENCH_SYNC_LOG").unwrap_or(defaults.log_filter),
        }
    }

    pub fn api_config(&self) -> ApiConfig {
        let config = ApiConfig::new(self.base_url.clone());
        match self.request_timeout {
            Some(timeout) => config.with_timeout(timeout),
            None => config,
        }
    }

    /// File-backed cache under `cache_dir`, or an in-memory one without it.
    pub fn open_cache(&self) -> Result<ResourceCache, CacheError> {
        match &self.cache_dir {
            Some(dir) => Ok(ResourceCache::new(Arc::new(FileKvStore::open(dir)?))),
            None => Ok(ResourceCache::in_memory()),
        }
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value.trim().to_string())
        }
    })
}

fn env_secs(key: &str) -> Option<Duration> {
    let value = env_string_opt(key)?;
    match value.parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            tracing::warn!(key, value = %value, "ignoring non-numeric duration");
            None
        }
    }
}
