//! Process wiring: the process-lifetime singletons, outbox recovery at
//! startup, and the background task lifecycles.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use inv_engine::{CommandEngine, recover};
use inv_idempotency::{IdempotencyCache, IdempotencySweeper, spawn_sweeper};
use inv_resilience::{Bulkhead, CircuitBreaker, LoadShedder, RateLimiter};
use inv_storage::{EventLog, StockStore};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::GatewayConfig;
use crate::sync::SyncWorker;

/// How long a client's rate-limit bucket may sit idle before eviction.
const BUCKET_MAX_IDLE: Duration = Duration::from_secs(600);
const BUCKET_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct AppState {
    pub engine: CommandEngine,
    pub stock: Arc<StockStore>,
    pub events: Arc<EventLog>,
    pub limiter: Arc<RateLimiter>,
    pub shedder: LoadShedder,
    pub api_pool: Arc<Bulkhead>,
    pub sync_pool: Arc<Bulkhead>,
    pub fs_pool: Arc<Bulkhead>,
    pub persistence_breaker: Arc<CircuitBreaker>,
    pub sync_breaker: Arc<CircuitBreaker>,
    pub idempotency: Arc<IdempotencyCache>,
}

/// A bootstrapped gateway: shared state plus handles to the background tasks.
pub struct App {
    pub state: Arc<AppState>,
    sweeper: Option<IdempotencySweeper>,
    sync_worker: Arc<SyncWorker>,
    sync_task: JoinHandle<()>,
    bucket_sweep: JoinHandle<()>,
}

impl App {
    /// Constructs every singleton, runs outbox recovery against the data
    /// directory, and starts the sweeper and sync worker.
    pub async fn bootstrap(config: GatewayConfig) -> Result<App> {
        let api_pool = Bulkhead::new("api", config.api_pool);
        let sync_pool = Bulkhead::new("sync", config.sync_pool);
        let fs_pool = Bulkhead::new("filesystem", config.fs_pool);
        let persistence_breaker = Arc::new(CircuitBreaker::new(
            "persistence",
            config.breaker.clone(),
        ));
        let sync_breaker = Arc::new(CircuitBreaker::new("sync", config.breaker.clone()));

        let events = Arc::new(
            EventLog::new(config.data_dir.clone(), config.retry.clone())
                .with_guards(fs_pool.clone(), persistence_breaker.clone()),
        );
        let stock = Arc::new(
            StockStore::new(config.data_dir.clone(), config.retry.clone())
                .with_guards(fs_pool.clone(), persistence_breaker.clone()),
        );

        let report = recover(&events, &stock)
            .await
            .context("outbox recovery failed")?;
        info!(
            scanned = report.scanned,
            replayed = report.replayed,
            data_dir = %config.data_dir.display(),
            "storage ready"
        );

        let idempotency = Arc::new(IdempotencyCache::new(config.idempotency.ttl));
        let sweeper = spawn_sweeper(idempotency.clone(), config.idempotency.sweep_interval);

        let engine = CommandEngine::new(
            stock.clone(),
            events.clone(),
            idempotency.clone(),
            config.idempotency.ttl,
        );
        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        let shedder = LoadShedder::new(
            config.load_shed_queue_max,
            vec![api_pool.clone(), sync_pool.clone()],
        );

        let sync_worker = Arc::new(SyncWorker::new(
            events.clone(),
            config.data_dir.clone(),
            config.retry.clone(),
            sync_pool.clone(),
            sync_breaker.clone(),
            config.sync_interval,
            config.snapshot_every,
        ));
        let sync_task = sync_worker.clone().spawn();

        let bucket_sweep = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let mut timer = tokio::time::interval(BUCKET_SWEEP_INTERVAL);
                timer.tick().await;
                loop {
                    timer.tick().await;
                    limiter.evict_idle(BUCKET_MAX_IDLE);
                }
            })
        };

        let state = Arc::new(AppState {
            engine,
            stock,
            events,
            limiter,
            shedder,
            api_pool,
            sync_pool,
            fs_pool,
            persistence_breaker,
            sync_breaker,
            idempotency,
        });

        Ok(App {
            state,
            sweeper: Some(sweeper),
            sync_worker,
            sync_task,
            bucket_sweep,
        })
    }

    /// Stops the sweeper, the sync worker, and the bucket eviction task.
    pub fn shutdown(mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop();
        }
        self.sync_worker.stop();
        self.sync_task.abort();
        self.bucket_sweep.abort();
        info!("background tasks stopped");
    }
}
