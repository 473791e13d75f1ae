//! Day-bucketed cookie statistics.
//!
//! Counts allowed/cleared cookies split by party, in two buckets: a "today"
//! matrix that resets at the local-date rollover, and a cumulative total.
//! Persistence is dirty-flag driven: a background loop writes the record
//! only when it changed since the last save.

use crate::platform::StateStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use time::{Date, OffsetDateTime};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Storage key for the persisted statistics record.
pub const STATS_STORAGE_KEY: &str = "cookie_stats";

/// How often the save loop wakes up to check the dirty flag.
pub const SAVE_PERIOD: Duration = Duration::from_secs(4 * 60);

/// First/third-party counter pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartyCounts {
    pub first_party: u64,
    pub third_party: u64,
}

impl PartyCounts {
    fn bump(&mut self, first_party: bool) {
        if first_party {
            self.first_party += 1;
        } else {
            self.third_party += 1;
        }
    }
}

/// allowed × cleared matrix for one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartyMatrix {
    pub allowed: PartyCounts,
    pub cleared: PartyCounts,
}

/// The persisted statistics record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatisticsRecord {
    /// ISO date (YYYY-MM-DD) the "today" bucket belongs to.
    pub stats_today_date: String,
    pub today: PartyMatrix,
    pub total: PartyMatrix,
}

struct StatsInner {
    record: StatisticsRecord,
    last_modified: Option<Instant>,
    last_saved: Option<Instant>,
}

/// Shared statistics store.
pub struct StatisticsStore {
    self_ref: Weak<StatisticsStore>,
    inner: Mutex<StatsInner>,
    store: Arc<dyn StateStore>,
    save_task: Mutex<Option<JoinHandle<()>>>,
}

impl StatisticsStore {
    pub fn new(store: Arc<dyn StateStore>) -> Arc<Self> {
        Arc::new_cyclic(|weak| StatisticsStore {
            self_ref: weak.clone(),
            inner: Mutex::new(StatsInner {
                record: StatisticsRecord::default(),
                last_modified: None,
                last_saved: None,
            }),
            store,
            save_task: Mutex::new(None),
        })
    }

    /// Replace the in-memory record, e.g. with the value loaded from
    /// storage at startup.
    pub fn restore(&self, record: StatisticsRecord) {
        let mut inner = self.inner.lock();
        inner.record = record;
        inner.last_modified = None;
        inner.last_saved = None;
    }

    /// Bump both buckets for one observed cookie outcome.
    pub fn increase(&self, is_cleared: bool, is_first_party: bool) {
        let mut inner = self.inner.lock();
        let today = if is_cleared {
            &mut inner.record.today.cleared
        } else {
            &mut inner.record.today.allowed
        };
        today.bump(is_first_party);
        let total = if is_cleared {
            &mut inner.record.total.cleared
        } else {
            &mut inner.record.total.allowed
        };
        total.bump(is_first_party);
        inner.last_modified = Some(Instant::now());
    }

    /// Reset the "today" bucket if the stored date is not the current date.
    pub fn correct_today_stats(&self) {
        self.correct_today_stats_at(OffsetDateTime::now_utc().date());
    }

    /// Date-explicit variant of [`correct_today_stats`](Self::correct_today_stats).
    pub fn correct_today_stats_at(&self, today: Date) {
        let mut inner = self.inner.lock();
        let today = today.to_string();
        if inner.record.stats_today_date != today {
            tracing::debug!(date = %today, "rolling over today's cookie statistics");
            inner.record.stats_today_date = today;
            inner.record.today = PartyMatrix::default();
            inner.last_modified = Some(Instant::now());
        }
    }

    /// Current record, for display layers.
    pub fn snapshot(&self) -> StatisticsRecord {
        self.inner.lock().record.clone()
    }

    fn is_dirty(&self) -> bool {
        let inner = self.inner.lock();
        match (inner.last_modified, inner.last_saved) {
            (Some(modified), Some(saved)) => modified > saved,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Write the record out now, unconditionally. Failures are logged and
    /// dropped.
    pub async fn save(&self) {
        let record = {
            let mut inner = self.inner.lock();
            inner.last_saved = Some(Instant::now());
            inner.record.clone()
        };
        let value = match serde_json::to_value(&record) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode cookie statistics");
                return;
            }
        };
        if let Err(e) = self.store.save(STATS_STORAGE_KEY, value).await {
            tracing::warn!(error = %e, "failed to persist cookie statistics");
        }
    }

    /// Start the periodic dirty-checked save loop. Idempotent; the loop
    /// also re-applies the date rollover on each tick.
    pub fn start_save_loop(&self) {
        let mut guard = self.save_task.lock();
        if guard.is_some() {
            return;
        }
        let stats = self.self_ref.clone();
        *guard = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(SAVE_PERIOD).await;
                let Some(stats) = stats.upgrade() else { return };
                stats.correct_today_stats();
                if stats.is_dirty() {
                    stats.save().await;
                }
            }
        }));
    }

    /// Stop the save loop.
    pub fn stop_save_loop(&self) {
        if let Some(task) = self.save_task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for StatisticsStore {
    fn drop(&mut self) {
        if let Some(task) = self.save_task.lock().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemoryStateStore;
    use time::Month;

    fn day(year: i32, month: Month, day: u8) -> Date {
        Date::from_calendar_date(year, month, day).unwrap()
    }

    fn store() -> (Arc<MemoryStateStore>, Arc<StatisticsStore>) {
        let backing = Arc::new(MemoryStateStore::new());
        let stats = StatisticsStore::new(backing.clone());
        (backing, stats)
    }

    #[test]
    fn test_increase_updates_both_buckets() {
        let (_, stats) = store();
        stats.increase(true, false);
        stats.increase(false, true);
        stats.increase(false, true);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.today.cleared.third_party, 1);
        assert_eq!(snapshot.today.allowed.first_party, 2);
        assert_eq!(snapshot.total.cleared.third_party, 1);
        assert_eq!(snapshot.total.allowed.first_party, 2);
    }

    #[test]
    fn test_day_rollover_zeroes_today_only() {
        let (_, stats) = store();
        stats.correct_today_stats_at(day(2024, Month::March, 1));
        stats.increase(true, true);
        stats.increase(false, false);

        // Same day: nothing changes.
        stats.correct_today_stats_at(day(2024, Month::March, 1));
        assert_eq!(stats.snapshot().today.cleared.first_party, 1);

        // Next day: today resets, totals survive.
        stats.correct_today_stats_at(day(2024, Month::March, 2));
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.stats_today_date, "2024-03-02");
        assert_eq!(snapshot.today, PartyMatrix::default());
        assert_eq!(snapshot.total.cleared.first_party, 1);
        assert_eq!(snapshot.total.allowed.third_party, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_loop_only_writes_when_dirty() {
        let (backing, stats) = store();
        // Establish a clean baseline: date set, record persisted.
        stats.correct_today_stats();
        stats.save().await;
        assert_eq!(backing.write_count(), 1);

        stats.start_save_loop();

        // Nothing modified since the save: the tick must not write.
        tokio::time::sleep(SAVE_PERIOD + Duration::from_secs(1)).await;
        assert_eq!(backing.write_count(), 1);

        stats.increase(true, true);
        tokio::time::sleep(SAVE_PERIOD).await;
        assert_eq!(backing.write_count(), 2);
        let saved = backing.get(STATS_STORAGE_KEY).expect("record saved");
        assert_eq!(saved["total"]["cleared"]["firstParty"], 1);

        stats.stop_save_loop();
    }

    #[tokio::test]
    async fn test_explicit_save_roundtrip() {
        let (backing, stats) = store();
        stats.increase(false, false);
        stats.save().await;

        let value = backing.get(STATS_STORAGE_KEY).unwrap();
        let restored: StatisticsRecord = serde_json::from_value(value).unwrap();
        assert_eq!(restored.today.allowed.third_party, 1);
    }
}
