//! Dispatch configuration
//!
//! Every knob has a built-in default and can be overridden through the
//! environment:
//!
//! ```bash
//! RASTERHUB_CHUNK_SIZE=512 RASTERHUB_WORKERS=2 ./my_app
//! ```
//!
//! | variable | field |
//! |---|---|
//! | `RASTERHUB_POOL_CAPACITY` | [`DispatchConfig::pool_capacity`] |
//! | `RASTERHUB_CHUNK_SIZE` | [`DispatchConfig::chunk_size`] |
//! | `RASTERHUB_WORKERS` | [`DispatchConfig::max_workers`] |
//! | `RASTERHUB_TIMEOUT_SECS` | [`DispatchConfig::call_timeout`] |
//! | `RASTERHUB_BATCH_TIMEOUT_SECS` | [`DispatchConfig::chunk_timeout`] |
//! | `RASTERHUB_CACHE_SIZE` | [`DispatchConfig::cache_size`] |
//! | `RASTERHUB_SESSION` | [`DispatchConfig::session_enabled`] |
//! | `RASTERHUB_BIN` | [`DispatchConfig::binary`] |

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use rasterhub_core::limits::MAX_JOBS_PER_SPEC;

pub const DEFAULT_POOL_CAPACITY: usize = 64;
pub const DEFAULT_CHUNK_SIZE: usize = 2048;
pub const DEFAULT_CACHE_SIZE: usize = 512;
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(120);

/// Environment variable naming the backend binary.
pub const BIN_ENV: &str = "RASTERHUB_BIN";

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Maximum pooled engine instances
    pub pool_capacity: usize,
    /// Jobs per job-spec document sent to the backend
    pub chunk_size: usize,
    /// Upper bound on concurrently dispatched chunks
    pub max_workers: usize,
    /// Timeout for one single-render subprocess call
    pub call_timeout: Duration,
    /// Timeout for one batch chunk
    pub chunk_timeout: Duration,
    /// Font cache size passed to sessions and the backend
    pub cache_size: usize,
    /// Whether the in-process session engine may be selected
    pub session_enabled: bool,
    /// Explicit backend binary; discovery runs when unset
    pub binary: Option<PathBuf>,
}

/// `max(2, min(4, cpus / 2))`: the backend process is the bottleneck, not the CPU.
pub fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    (cpus / 2).clamp(2, 4)
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pool_capacity: DEFAULT_POOL_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_workers: default_workers(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
            cache_size: DEFAULT_CACHE_SIZE,
            session_enabled: true,
            binary: None,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => {
            log::info!("{} set via environment: {}", name, raw.trim());
            Some(value)
        }
        Err(_) => {
            log::warn!("Ignoring malformed {}={:?}", name, raw);
            None
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            log::warn!("Ignoring malformed {}={:?}", name, raw);
            None
        }
    }
}

impl DispatchConfig {
    /// Defaults overlaid with any `RASTERHUB_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_parse::<usize>("RASTERHUB_POOL_CAPACITY").filter(|n| *n > 0) {
            config.pool_capacity = n;
        }
        if let Some(n) = env_parse::<usize>("RASTERHUB_CHUNK_SIZE").filter(|n| *n > 0) {
            config.chunk_size = n;
        }
        if let Some(n) = env_parse::<usize>("RASTERHUB_WORKERS").filter(|n| *n > 0) {
            config.max_workers = n;
        }
        if let Some(secs) = env_parse::<u64>("RASTERHUB_TIMEOUT_SECS").filter(|n| *n > 0) {
            config.call_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("RASTERHUB_BATCH_TIMEOUT_SECS").filter(|n| *n > 0) {
            config.chunk_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse::<usize>("RASTERHUB_CACHE_SIZE").filter(|n| *n > 0) {
            config.cache_size = n;
        }
        if let Some(enabled) = env_flag("RASTERHUB_SESSION") {
            config.session_enabled = enabled;
        }
        if let Ok(bin) = std::env::var(BIN_ENV) {
            if !bin.trim().is_empty() {
                config.binary = Some(PathBuf::from(bin.trim()));
            }
        }
        config.normalized()
    }

    /// Clamp values into the ranges the backend accepts.
    pub fn normalized(mut self) -> Self {
        self.pool_capacity = self.pool_capacity.max(1);
        self.chunk_size = self.chunk_size.clamp(1, MAX_JOBS_PER_SPEC);
        self.max_workers = self.max_workers.max(1);
        self.cache_size = self.cache_size.max(1);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self.normalized()
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self.normalized()
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }
}

static GLOBAL: OnceLock<DispatchConfig> = OnceLock::new();

/// Process-wide configuration, read from the environment on first use.
pub fn global() -> &'static DispatchConfig {
    GLOBAL.get_or_init(DispatchConfig::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.pool_capacity, 64);
        assert_eq!(config.chunk_size, 2048);
        assert_eq!(config.cache_size, 512);
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert_eq!(config.chunk_timeout, Duration::from_secs(120));
        assert!((2..=4).contains(&config.max_workers));
        assert!(config.session_enabled);
    }

    #[test]
    fn test_normalized_clamps() {
        let config = DispatchConfig {
            pool_capacity: 0,
            chunk_size: MAX_JOBS_PER_SPEC * 2,
            max_workers: 0,
            cache_size: 0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.pool_capacity, 1);
        assert_eq!(config.chunk_size, MAX_JOBS_PER_SPEC);
        assert_eq!(config.max_workers, 1);
        assert_eq!(config.cache_size, 1);
    }

    #[test]
    fn test_builders() {
        let config = DispatchConfig::default()
            .with_chunk_size(0)
            .with_max_workers(3)
            .with_binary("/opt/rasterhub");
        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.binary, Some(PathBuf::from("/opt/rasterhub")));
    }
}
