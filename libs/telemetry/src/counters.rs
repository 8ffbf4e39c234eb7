use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

pub const REQUESTS: &str = "inventory_requests_total";
pub const ERRORS: &str = "inventory_errors_total";
pub const CONFLICTS: &str = "inventory_conflicts_total";
pub const IDEMPOTENT_HITS: &str = "inventory_idempotent_hits_total";
pub const RATE_LIMITED: &str = "inventory_rate_limited_total";
pub const SHED: &str = "inventory_shed_total";
pub const FS_RETRIES: &str = "inventory_fs_retries_total";
pub const BREAKER_OPENINGS: &str = "inventory_breaker_openings_total";

#[derive(Default)]
struct Stats {
    requests: AtomicU64,
    errors: AtomicU64,
    conflicts: AtomicU64,
    idempotent_hits: AtomicU64,
    rate_limited: AtomicU64,
    shed: AtomicU64,
    fs_retries: AtomicU64,
    breaker_openings: AtomicU64,
}

static STATS: OnceLock<Stats> = OnceLock::new();

fn stats() -> &'static Stats {
    STATS.get_or_init(Stats::default)
}

/// Increments a named counter in both the `metrics` facade and the local
/// snapshot registry. Unknown names go to the facade only.
pub fn record_counter(name: &'static str, value: u64) {
    metrics::counter!(name).increment(value);
    let stats = stats();
    let cell = match name {
        REQUESTS => &stats.requests,
        ERRORS => &stats.errors,
        CONFLICTS => &stats.conflicts,
        IDEMPOTENT_HITS => &stats.idempotent_hits,
        RATE_LIMITED => &stats.rate_limited,
        SHED => &stats.shed,
        FS_RETRIES => &stats.fs_retries,
        BREAKER_OPENINGS => &stats.breaker_openings,
        _ => return,
    };
    cell.fetch_add(value, Ordering::Relaxed);
}

/// Point-in-time view of the service counters, sampled without locks.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub conflicts: u64,
    pub idempotent_hits: u64,
    pub rate_limited: u64,
    pub shed: u64,
    pub fs_retries: u64,
    pub breaker_openings: u64,
}

pub fn snapshot() -> StatsSnapshot {
    let stats = stats();
    StatsSnapshot {
        requests: stats.requests.load(Ordering::Relaxed),
        errors: stats.errors.load(Ordering::Relaxed),
        conflicts: stats.conflicts.load(Ordering::Relaxed),
        idempotent_hits: stats.idempotent_hits.load(Ordering::Relaxed),
        rate_limited: stats.rate_limited.load(Ordering::Relaxed),
        shed: stats.shed.load(Ordering::Relaxed),
        fs_retries: stats.fs_retries.load(Ordering::Relaxed),
        breaker_openings: stats.breaker_openings.load(Ordering::Relaxed),
    }
}
