//! Periodic reclamation of expired checks and reports

use crate::metrics::CHECKS_PROCESSING;
use crate::registry::CheckRegistry;
use crate::storage::BlobStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub fn spawn_registry_sweeper(
    registry: Arc<CheckRegistry>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let sweep = registry.cleanup_expired(Utc::now());
                    // unfinished checks leave the gauge here, orphans included
                    CHECKS_PROCESSING.sub(sweep.processing as i64);
                    if sweep.removed > 0 {
                        info!(removed = sweep.removed, processing = sweep.processing, "Expired checks removed");
                    }
                }
            }
        }
        debug!("Registry sweeper stopped");
    })
}

pub fn spawn_blob_sweeper(
    store: Arc<dyn BlobStore>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => match store.cleanup_expired().await {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "Expired reports removed"),
                    Err(e) => error!(error = %e, "Report cleanup failed"),
                },
            }
        }
        debug!("Blob sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Check;
    use crate::storage::{MemoryBlobStore, StorageError};
    use uuid::Uuid;

    #[tokio::test(start_paused = true)]
    async fn test_registry_sweep_and_stop() {
        let registry = Arc::new(CheckRegistry::new());
        let expired = Check::new(Uuid::new_v4(), "0xabc", "ETH", Utc::now(), chrono::Duration::seconds(-1));
        let live = Check::new(Uuid::new_v4(), "0xdef", "ETH", Utc::now(), chrono::Duration::hours(1));
        registry.create(expired.clone()).unwrap();
        registry.create(live.clone()).unwrap();

        let shutdown = CancellationToken::new();
        let task = spawn_registry_sweeper(registry.clone(), Duration::from_secs(60), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(registry.get(&expired.id).is_none());
        assert!(registry.get(&live.id).is_some());

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_blob_sweep() {
        let store = Arc::new(MemoryBlobStore::new());
        store.put("old.pdf", vec![1], "application/pdf", chrono::Duration::seconds(-1)).await.unwrap();

        let shutdown = CancellationToken::new();
        let task = spawn_blob_sweeper(store.clone(), Duration::from_secs(60), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(matches!(store.get("old.pdf").await, Err(StorageError::NotFound(_))));

        shutdown.cancel();
        task.await.unwrap();
    }
}
