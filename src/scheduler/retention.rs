//! Retention manager for trimming old probe results.

use crate::db::Store;

use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const RETENTION_PERIOD: Duration = Duration::from_secs(3600);

/// Background task that removes results older than the retention window.
pub struct RetentionManager {
    store: Arc<Store>,
    max_age: ChronoDuration,
    stop: watch::Sender<bool>,
}

impl RetentionManager {
    pub fn new(store: Arc<Store>, max_age: ChronoDuration) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            store,
            max_age,
            stop,
        }
    }

    /// Start the retention task. Trims once immediately, then hourly.
    pub fn start(&self) -> JoinHandle<()> {
        let store = self.store.clone();
        let max_age = self.max_age;
        let mut rx = self.stop.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RETENTION_PERIOD);

            loop {
                tokio::select! {
                    _ = rx.changed() => break,
                    _ = interval.tick() => {
                        process_retention(&store, max_age);
                    }
                }
            }
        })
    }

    /// Stop the retention task.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }
}

fn process_retention(store: &Store, max_age: ChronoDuration) {
    match store.apply_retention(max_age) {
        Ok(0) => {}
        Ok(deleted) => tracing::info!(
            "RetentionManager: removed {} results older than {} days",
            deleted,
            max_age.num_days()
        ),
        Err(e) => tracing::error!("RetentionManager: failed to trim results: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ProbeResult;
    use chrono::Utc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_trims_on_start_and_stops() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path().join("results.db")).unwrap());
        let now = Utc::now();
        store
            .append(&ProbeResult::failed(now - ChronoDuration::days(45), 10.0, "timeout"))
            .unwrap();
        let fresh = ProbeResult::from_status(now, 200, 0.2, true);
        store.append(&fresh).unwrap();

        let manager = RetentionManager::new(store.clone(), ChronoDuration::days(30));
        let handle = manager.start();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store.recent(None).unwrap(), vec![fresh]);

        manager.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("retention task should stop")
            .unwrap();
    }
}
