//! Persisted map of (storeId, sku) → stock record.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use inv_core::{InventoryError, Sku, StockRecord, StoreId};
use inv_resilience::{Bulkhead, CircuitBreaker};
use tokio::sync::Mutex;

use crate::durable::{RetryPolicy, read_json, write_json};

pub const STOCK_FILE: &str = "store-inventory.json";

type StockDocument = BTreeMap<String, BTreeMap<String, StockRecord>>;

pub struct StockStore {
    path: PathBuf,
    retry: RetryPolicy,
    write_lock: Mutex<()>,
    fs_pool: Option<Arc<Bulkhead>>,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl StockStore {
    pub fn new(data_dir: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            path: data_dir.into().join(STOCK_FILE),
            retry,
            write_lock: Mutex::new(()),
            fs_pool: None,
            breaker: None,
        }
    }

    /// Routes writes through the filesystem bulkhead and persistence breaker.
    pub fn with_guards(mut self, fs_pool: Arc<Bulkhead>, breaker: Arc<CircuitBreaker>) -> Self {
        self.fs_pool = Some(fs_pool);
        self.breaker = Some(breaker);
        self
    }

    /// Point read; absent records are a `NotFoundError`.
    pub async fn get(&self, store_id: &StoreId, sku: &Sku) -> Result<StockRecord, InventoryError> {
        self.find(store_id, sku)
            .await?
            .ok_or_else(|| InventoryError::NotFound {
                store_id: store_id.to_string(),
                sku: sku.to_string(),
            })
    }

    /// Point read where absence is not an error; used by the command core and
    /// recovery.
    pub async fn find(
        &self,
        store_id: &StoreId,
        sku: &Sku,
    ) -> Result<Option<StockRecord>, InventoryError> {
        let doc = self.load().await?;
        Ok(doc
            .get(store_id.as_str())
            .and_then(|skus| skus.get(sku.as_str()))
            .cloned())
    }

    /// Creates or replaces the record. The caller guarantees per-identity
    /// serialization.
    pub async fn upsert(&self, record: StockRecord) -> Result<(), InventoryError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await?;
        doc.entry(record.store_id.to_string())
            .or_default()
            .insert(record.sku.to_string(), record);
        self.store(&doc).await
    }

    /// Removes the record; returns whether one existed.
    pub async fn delete(&self, store_id: &StoreId, sku: &Sku) -> Result<bool, InventoryError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await?;
        let Some(skus) = doc.get_mut(store_id.as_str()) else {
            return Ok(false);
        };
        let removed = skus.remove(sku.as_str()).is_some();
        if skus.is_empty() {
            doc.remove(store_id.as_str());
        }
        if removed {
            self.store(&doc).await?;
        }
        Ok(removed)
    }

    pub async fn list_by_store(
        &self,
        store_id: &StoreId,
    ) -> Result<Vec<StockRecord>, InventoryError> {
        let doc = self.load().await?;
        Ok(doc
            .get(store_id.as_str())
            .map(|skus| skus.values().cloned().collect())
            .unwrap_or_default())
    }

    pub async fn list_stores(&self) -> Result<Vec<String>, InventoryError> {
        let doc = self.load().await?;
        Ok(doc.keys().cloned().collect())
    }

    pub async fn total_count(&self) -> Result<usize, InventoryError> {
        let doc = self.load().await?;
        Ok(doc.values().map(|skus| skus.len()).sum())
    }

    async fn load(&self) -> Result<StockDocument, InventoryError> {
        read_json(&self.path).await
    }

    async fn store(&self, doc: &StockDocument) -> Result<(), InventoryError> {
        let write = async { write_json(&self.path, doc, &self.retry).await };
        let op = async {
            match &self.fs_pool {
                Some(pool) => pool.run(write).await.and_then(|inner| inner),
                None => write.await,
            }
        };
        match &self.breaker {
            Some(breaker) => breaker.guard(op).await,
            None => op.await,
        }
    }
}
