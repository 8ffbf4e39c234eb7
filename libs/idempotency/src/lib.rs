//! In-memory idempotency cache for mutating commands.
//!
//! Each entry maps an opaque client key to the committed command result, its
//! payload hash, and an expiry. A live entry with an identical payload is a
//! replay; the same key with a different payload is a conflict. Expired
//! entries are removed lazily on access and by a periodic sweep task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use inv_core::CommandResult;
use inv_core::config::env_duration_ms;
use inv_telemetry::counters;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::debug;

pub mod hash;

pub use hash::payload_hash;

#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl IdempotencyConfig {
    /// TTL from `IDEMP_TTL_MS` (default 10 minutes); the sweep runs at a
    /// tenth of the TTL, clamped to [1s, 60s].
    pub fn from_env() -> Self {
        let ttl = env_duration_ms("IDEMP_TTL_MS", 600_000);
        let sweep_interval = (ttl / 10).clamp(Duration::from_secs(1), Duration::from_secs(60));
        Self { ttl, sweep_interval }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    result: CommandResult,
    payload_hash: Option<String>,
    expires_at: Instant,
}

/// Outcome of probing the cache ahead of command execution.
#[derive(Debug, Clone, PartialEq)]
pub enum IdempotencyOutcome {
    /// First sighting; proceed and record the result afterwards.
    Proceed,
    /// Live entry with an identical payload; return the stored result.
    Replay(CommandResult),
    /// Live entry recorded under a different payload hash.
    Conflict,
}

pub struct IdempotencyCache {
    entries: DashMap<String, Entry>,
    default_ttl: Duration,
}

impl IdempotencyCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    /// Returns the stored result for a live key, dropping expired entries.
    pub fn get(&self, key: &str) -> Option<CommandResult> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.result),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    /// Stores (or overwrites) the result for `key`.
    pub fn set(
        &self,
        key: &str,
        result: CommandResult,
        payload_hash: Option<String>,
        ttl: Option<Duration>,
    ) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.entries.insert(key.to_string(), Entry {
            result,
            payload_hash,
            expires_at: Instant::now() + ttl,
        });
    }

    /// Probes `key` against the payload about to be executed.
    pub fn check(&self, key: &str, payload: &Value) -> IdempotencyOutcome {
        let hash = payload_hash(payload);
        let expired = match self.entries.get(key) {
            None => return IdempotencyOutcome::Proceed,
            Some(entry) if entry.expires_at <= Instant::now() => true,
            Some(entry) => {
                match &entry.payload_hash {
                    Some(stored) if *stored != hash => return IdempotencyOutcome::Conflict,
                    _ => {}
                }
                counters::record_counter(counters::IDEMPOTENT_HITS, 1);
                return IdempotencyOutcome::Replay(entry.result);
            }
        };
        if expired {
            self.entries.remove(key);
        }
        IdempotencyOutcome::Proceed
    }

    /// Removes `key` explicitly. Returns whether an entry existed.
    pub fn clear(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops every expired entry; returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Handle to the periodic expiry sweep; `stop` terminates the task.
pub struct IdempotencySweeper {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl IdempotencySweeper {
    pub fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        self.handle.abort();
    }
}

pub fn spawn_sweeper(cache: Arc<IdempotencyCache>, interval: Duration) -> IdempotencySweeper {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    let handle = tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.tick().await;
        while flag.load(Ordering::SeqCst) {
            timer.tick().await;
            let removed = cache.purge_expired();
            if removed > 0 {
                debug!(removed, remaining = cache.len(), "idempotency sweep");
            }
        }
    });
    IdempotencySweeper { running, handle }
}
