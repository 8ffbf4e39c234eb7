//! Atomic JSON file persistence with bounded retry.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use inv_core::InventoryError;
use inv_core::config::{env_u32, env_u64};
use inv_telemetry::counters;
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::warn;

/// Retry policy for filesystem writes: exponential backoff
/// `base * 2^(attempt-1)` plus uniform jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base: Duration,
    pub times: u32,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(50),
            times: 3,
            jitter: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    /// Reads `RETRY_BASE_MS`, `RETRY_TIMES`, and `RETRY_JITTER_MS`.
    pub fn from_env() -> Self {
        Self {
            base: Duration::from_millis(env_u64("RETRY_BASE_MS", 50)),
            times: env_u32("RETRY_TIMES", 3).max(1),
            jitter: Duration::from_millis(env_u64("RETRY_JITTER_MS", 25)),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let base = self.base.saturating_mul(1u32 << shift);
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::rng().random_range(0..jitter_ms))
    }
}

/// Reads a JSON document, returning `T::default()` when the file does not
/// exist yet.
pub async fn read_json<T>(path: &Path) -> Result<T, InventoryError>
where
    T: DeserializeOwned + Default,
{
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
            InventoryError::persistence(format!("parse {}: {err}", path.display()))
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(err) => Err(InventoryError::persistence(format!(
            "read {}: {err}",
            path.display()
        ))),
    }
}

/// Atomically replaces `path` with the JSON encoding of `value`, creating the
/// parent directory as needed and retrying transient failures per `retry`.
pub async fn write_json<T: Serialize>(
    path: &Path,
    value: &T,
    retry: &RetryPolicy,
) -> Result<(), InventoryError> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|err| InventoryError::persistence(format!("encode {}: {err}", path.display())))?;

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match write_atomic(path.to_path_buf(), bytes.clone()).await {
            Ok(()) => return Ok(()),
            Err(err) if attempt >= retry.times => {
                return Err(InventoryError::persistence(format!(
                    "write {} after {attempt} attempts: {err}",
                    path.display()
                )));
            }
            Err(err) => {
                counters::record_counter(counters::FS_RETRIES, 1);
                let delay = retry.backoff(attempt);
                warn!(attempt, path = %path.display(), error = %err, "retrying file write");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn write_atomic(path: PathBuf, bytes: Vec<u8>) -> std::io::Result<()> {
    tokio::task::spawn_blocking(move || {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent)?;
        let mut tmp = NamedTempFile::new_in(&parent)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|err| err.error)?;
        Ok(())
    })
    .await
    .map_err(std::io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Doc {
        entries: Vec<String>,
        count: u64,
    }

    #[tokio::test]
    async fn missing_file_reads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let doc: Doc = read_json(&dir.path().join("absent.json")).await.unwrap();
        assert_eq!(doc, Doc::default());
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/doc.json");
        let doc = Doc {
            entries: vec!["a".into(), "b".into()],
            count: 2,
        };

        write_json(&path, &doc, &RetryPolicy::default())
            .await
            .unwrap();
        let back: Doc = read_json(&path).await.unwrap();
        assert_eq!(back, doc);
    }

    #[tokio::test]
    async fn overwrite_replaces_whole_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let retry = RetryPolicy::default();

        write_json(&path, &Doc {
            entries: vec!["old".into()],
            count: 1,
        }, &retry)
        .await
        .unwrap();
        write_json(&path, &Doc {
            entries: vec![],
            count: 0,
        }, &retry)
        .await
        .unwrap();

        let back: Doc = read_json(&path).await.unwrap();
        assert_eq!(back.count, 0);
        assert!(back.entries.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let err = read_json::<Doc>(&path).await.unwrap_err();
        assert_eq!(err.code(), "PERSISTENCE_ERROR");
    }

    #[test]
    fn backoff_grows_exponentially() {
        let retry = RetryPolicy {
            base: Duration::from_millis(50),
            times: 3,
            jitter: Duration::ZERO,
        };
        assert_eq!(retry.backoff(1), Duration::from_millis(50));
        assert_eq!(retry.backoff(2), Duration::from_millis(100));
        assert_eq!(retry.backoff(3), Duration::from_millis(200));
    }
}
