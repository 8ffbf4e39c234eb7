use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use inv_core::config::{env_duration_ms, env_string, env_usize};
use inv_idempotency::IdempotencyConfig;
use inv_resilience::{BulkheadConfig, CircuitSettings, RateLimitConfig};
use inv_storage::RetryPolicy;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub addr: SocketAddr,
    pub data_dir: PathBuf,
    pub api_pool: BulkheadConfig,
    pub sync_pool: BulkheadConfig,
    pub fs_pool: BulkheadConfig,
    pub rate_limit: RateLimitConfig,
    pub breaker: CircuitSettings,
    pub retry: RetryPolicy,
    pub load_shed_queue_max: usize,
    pub idempotency: IdempotencyConfig,
    pub sync_interval: Duration,
    pub snapshot_every: usize,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let addr = env_string("BIND_ADDR", "0.0.0.0:8080")
            .parse()
            .context("invalid BIND_ADDR")?;
        Ok(Self {
            addr,
            data_dir: PathBuf::from(env_string("DATA_DIR", "./data")),
            api_pool: BulkheadConfig::api_from_env(),
            sync_pool: BulkheadConfig::sync_from_env(),
            fs_pool: BulkheadConfig::filesystem(),
            rate_limit: RateLimitConfig::from_env(),
            breaker: CircuitSettings::from_env(),
            retry: RetryPolicy::from_env(),
            load_shed_queue_max: env_usize("LOAD_SHED_QUEUE_MAX", 100),
            idempotency: IdempotencyConfig::from_env(),
            sync_interval: env_duration_ms("SYNC_INTERVAL_MS", 5_000),
            snapshot_every: env_usize("SNAPSHOT_EVERY_N_EVENTS", 100).max(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    fn env_guard() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|err| err.into_inner())
    }

    #[test]
    fn defaults_without_env() {
        let _guard = env_guard();
        for var in ["BIND_ADDR", "DATA_DIR", "CONCURRENCY_API", "SYNC_INTERVAL_MS"] {
            unsafe {
                std::env::remove_var(var);
            }
        }
        let config = GatewayConfig::from_env().unwrap();
        assert_eq!(config.addr.port(), 8080);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.api_pool.limit, 16);
        assert_eq!(config.sync_pool.limit, 4);
        assert_eq!(config.fs_pool.limit, 8);
        assert_eq!(config.load_shed_queue_max, 100);
        assert_eq!(config.sync_interval, Duration::from_secs(5));
        assert_eq!(config.snapshot_every, 100);
    }

    #[test]
    fn env_overrides_apply() {
        let _guard = env_guard();
        unsafe {
            std::env::set_var("CONCURRENCY_API", "2");
            std::env::set_var("SYNC_INTERVAL_MS", "100");
        }
        let config = GatewayConfig::from_env().unwrap();
        assert_eq!(config.api_pool.limit, 2);
        assert_eq!(config.sync_interval, Duration::from_millis(100));
        unsafe {
            std::env::remove_var("CONCURRENCY_API");
            std::env::remove_var("SYNC_INTERVAL_MS");
        }
    }

    #[test]
    fn invalid_bind_addr_is_an_error() {
        let _guard = env_guard();
        unsafe {
            std::env::set_var("BIND_ADDR", "not-an-addr");
        }
        assert!(GatewayConfig::from_env().is_err());
        unsafe {
            std::env::remove_var("BIND_ADDR");
        }
    }
}
