//! Per-key write serialization: FIFO per sku, parallel across skus.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

/// Keyed async mutex. Operations on the same key run one at a time in arrival
/// order; operations on distinct keys proceed in parallel. Memory is bounded
/// by the number of keys with work in flight.
#[derive(Default)]
pub struct KeyedSerializer {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `fut` while holding the exclusive lock for `key`. The lock is
    /// held until `fut` has fully settled, success or failure.
    pub async fn run<F, T>(&self, key: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let out = {
            let _guard = lock.lock().await;
            fut.await
        };

        // Drop the map entry once we hold the only handle besides the map's
        // own; anyone racing to acquire blocks on the shard until this check
        // settles.
        self.locks.remove_if(key, |_, existing| {
            Arc::ptr_eq(existing, &lock) && Arc::strong_count(existing) == 2
        });

        out
    }

    /// Number of keys with a lock currently materialized.
    pub fn active_keys(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_operations_are_serialized() {
        let serializer = Arc::new(KeyedSerializer::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let serializer = serializer.clone();
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            tasks.push(tokio::spawn(async move {
                serializer
                    .run("SKU123", async {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_run_in_parallel() {
        let serializer = Arc::new(KeyedSerializer::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for n in 0..8 {
            let serializer = serializer.clone();
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            tasks.push(tokio::spawn(async move {
                serializer
                    .run(&format!("SKU{n}"), async {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(max_seen.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn idle_keys_are_released() {
        let serializer = KeyedSerializer::new();
        serializer.run("SKU123", async {}).await;
        assert_eq!(serializer.active_keys(), 0);
    }

    #[tokio::test]
    async fn lock_survives_while_waiters_exist() {
        let serializer = Arc::new(KeyedSerializer::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut tasks = Vec::new();
        for n in 0..5u32 {
            let serializer = serializer.clone();
            let order = order.clone();
            tasks.push(tokio::spawn(async move {
                serializer
                    .run("K", async {
                        order.lock().await.push(n);
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    })
                    .await;
            }));
            // Stagger arrivals so FIFO ordering is observable.
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(*order.lock().await, vec![0, 1, 2, 3, 4]);
        assert_eq!(serializer.active_keys(), 0);
    }
}
