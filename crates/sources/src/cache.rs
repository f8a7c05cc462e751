use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lru::LruCache;
use rad_core::config::CacheConfig;
use rad_core::Result;
use tracing::debug;

use crate::feed::{AnomalyFeed, HistoricalAnomaly, ScorePoint, ScoreTarget};

/// Bounded LRU cache whose entries expire `ttl` after insertion.
///
/// Interior mutability lets one cache be shared between sources.
pub struct TtlCache<K: Hash + Eq, V: Clone> {
    entries: Mutex<LruCache<K, (Instant, V)>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Live value for `key`. Expired entries are dropped on the way.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let expired = match entries.get(key) {
            Some((inserted, value)) if inserted.elapsed() < self.ttl => return Some(value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.put(key, (Instant::now(), value));
    }

    pub fn invalidate(&self, key: &K) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.pop(key);
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached value, or `load()` stored and returned. `skip_cache` forces a
    /// reload that replaces the stored entry. Load errors are not cached.
    pub fn get_or_load(
        &self,
        key: K,
        skip_cache: bool,
        load: impl FnOnce() -> Result<V>,
    ) -> Result<V> {
        if !skip_cache {
            if let Some(v) = self.get(&key) {
                return Ok(v);
            }
        }
        let value = load()?;
        self.insert(key, value.clone());
        Ok(value)
    }
}

// ── Anomaly scores ────────────────────────────────────────────

type ScoreKey = (ScoreTarget, DateTime<Utc>, DateTime<Utc>);

/// Score series per (target, window), shared by every score source of a host.
pub struct AnomalyScoreCache {
    cache: TtlCache<ScoreKey, Vec<ScorePoint>>,
}

impl AnomalyScoreCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(capacity, ttl),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.score_capacity, Duration::from_secs(config.score_ttl_secs))
    }

    pub fn scores(
        &self,
        feed: &dyn AnomalyFeed,
        target: &ScoreTarget,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        skip_cache: bool,
    ) -> Result<Vec<ScorePoint>> {
        self.cache
            .get_or_load((target.clone(), start, end), skip_cache, || {
                debug!(?target, %start, %end, "Fetching anomaly scores");
                feed.anomaly_scores(target, start, end)
            })
    }

    pub fn invalidate(&self, target: &ScoreTarget, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.cache.invalidate(&(target.clone(), start, end));
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

// ── Historical anomalies ──────────────────────────────────────

/// Window of history the listing sources count anomalies over.
pub const HISTORY_DAYS: i64 = 30;

/// Anomalies of the last [`HISTORY_DAYS`] days, fetched at most once per TTL.
pub struct HistoricalAnomalyCache {
    cache: TtlCache<(), Vec<HistoricalAnomaly>>,
}

impl HistoricalAnomalyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(1, ttl),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Duration::from_secs(config.anomaly_ttl_secs))
    }

    pub fn anomalies(
        &self,
        feed: &dyn AnomalyFeed,
        now: DateTime<Utc>,
        skip_cache: bool,
    ) -> Result<Vec<HistoricalAnomaly>> {
        self.cache.get_or_load((), skip_cache, || {
            debug!(days = HISTORY_DAYS, "Fetching historical anomalies");
            feed.historical_anomalies(now - chrono::Duration::days(HISTORY_DAYS))
        })
    }

    pub fn invalidate(&self) {
        self.cache.invalidate(&());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::InMemoryFeed;
    use chrono::TimeZone;
    use uuid::Uuid;

    #[test]
    fn zero_ttl_never_hits() {
        let cache: TtlCache<&str, u32> = TtlCache::new(4, Duration::ZERO);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn live_entries_hit_until_invalidated() {
        let cache: TtlCache<&str, u32> = TtlCache::new(4, Duration::from_secs(3600));
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache: TtlCache<u32, u32> = TtlCache::new(2, Duration::from_secs(3600));
        cache.insert(1, 1);
        cache.insert(2, 2);
        cache.get(&1);
        cache.insert(3, 3);
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some(1));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn score_cache_serves_repeats_and_honors_skip() {
        let feed = InMemoryFeed::new();
        let cache = AnomalyScoreCache::new(8, Duration::from_secs(3600));
        let target = ScoreTarget::Group {
            data_miner_id: 1,
            group_name: "Pumps".into(),
        };
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        cache.scores(&feed, &target, start, end, false).unwrap();
        cache.scores(&feed, &target, start, end, false).unwrap();
        assert_eq!(feed.score_requests(), 1);

        cache.scores(&feed, &target, start, end, true).unwrap();
        assert_eq!(feed.score_requests(), 2);

        cache.invalidate(&target, start, end);
        cache.scores(&feed, &target, start, end, false).unwrap();
        assert_eq!(feed.score_requests(), 3);
    }

    #[test]
    fn history_cache_fetches_once_per_ttl() {
        let mut feed = InMemoryFeed::new();
        let now = Utc::now();
        feed.historical = vec![
            HistoricalAnomaly {
                anomaly_id: Uuid::new_v4(),
                subgroup_id: Uuid::nil(),
                start_time: now - chrono::Duration::days(1),
            },
            HistoricalAnomaly {
                anomaly_id: Uuid::new_v4(),
                subgroup_id: Uuid::nil(),
                start_time: now - chrono::Duration::days(45),
            },
        ];
        let cache = HistoricalAnomalyCache::new(Duration::from_secs(3600));
        assert_eq!(cache.anomalies(&feed, now, false).unwrap().len(), 1);
        assert_eq!(cache.anomalies(&feed, now, false).unwrap().len(), 1);
        assert_eq!(feed.history_requests(), 1);
    }
}
