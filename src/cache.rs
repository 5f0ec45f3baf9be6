//! Calculation progress tracking using moka
//!
//! Progress for a running billing batch is kept in a short-lived
//! in-memory cache. Entries expire 60 seconds after the last write, so
//! abandoned or crashed runs disappear on their own instead of leaving
//! stale state behind.

use moka::future::Cache;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Time-to-live restarted by every progress write
pub const PROGRESS_TTL: Duration = Duration::from_secs(60);

/// Live progress of one building-wide billing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalculationProgress {
    pub total: u32,
    pub completed: u32,
}

/// TTL-bounded store of per-building calculation progress
#[derive(Clone)]
pub struct ProgressStore {
    entries: Cache<String, CalculationProgress>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::with_ttl(PROGRESS_TTL)
    }

    /// Store with a custom TTL (expiry tests use very short windows)
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(1024)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Cache key for a building's progress entry
    pub fn progress_key(building_id: Uuid) -> String {
        format!("calculation_progress_{}", building_id)
    }

    /// Record the start of a run: all flats pending
    pub async fn begin(&self, building_id: Uuid, total: u32) {
        self.entries
            .insert(
                Self::progress_key(building_id),
                CalculationProgress {
                    total,
                    completed: 0,
                },
            )
            .await;
    }

    /// Count one more processed flat, refreshing the TTL.
    ///
    /// A no-op when the entry has already expired mid-run; the run keeps
    /// going, only its progress is no longer observable.
    pub async fn advance(&self, building_id: Uuid) {
        let key = Self::progress_key(building_id);
        if let Some(mut progress) = self.entries.get(&key).await {
            progress.completed += 1;
            self.entries.insert(key, progress).await;
        }
    }

    /// Current progress, or None when no run is live for the building
    pub async fn get(&self, building_id: Uuid) -> Option<CalculationProgress> {
        self.entries.get(&Self::progress_key(building_id)).await
    }
}

impl Default for ProgressStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_begin_and_get() {
        let store = ProgressStore::new();
        let building_id = Uuid::new_v4();

        store.begin(building_id, 5).await;
        let progress = store.get(building_id).await.unwrap();
        assert_eq!(
            progress,
            CalculationProgress {
                total: 5,
                completed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_advance_increments_completed() {
        let store = ProgressStore::new();
        let building_id = Uuid::new_v4();

        store.begin(building_id, 3).await;
        store.advance(building_id).await;
        store.advance(building_id).await;

        let progress = store.get(building_id).await.unwrap();
        assert_eq!(progress.completed, 2);
        assert_eq!(progress.total, 3);
    }

    #[tokio::test]
    async fn test_get_absent_building_is_none() {
        let store = ProgressStore::new();
        assert!(store.get(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_advance_without_entry_is_a_noop() {
        let store = ProgressStore::new();
        let building_id = Uuid::new_v4();

        store.advance(building_id).await;
        assert!(store.get(building_id).await.is_none());
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let store = ProgressStore::with_ttl(Duration::from_millis(50));
        let building_id = Uuid::new_v4();

        store.begin(building_id, 10).await;
        assert!(store.get(building_id).await.is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.get(building_id).await.is_none());
    }

    #[tokio::test]
    async fn test_writes_are_isolated_per_building() {
        let store = ProgressStore::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        store.begin(first, 4).await;
        store.begin(second, 7).await;
        store.advance(first).await;

        assert_eq!(store.get(first).await.unwrap().completed, 1);
        assert_eq!(store.get(second).await.unwrap().completed, 0);
    }
}
