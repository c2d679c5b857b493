//! Dashboard Metric Cache
//!
//! Dashboard queries arrive far more often than the underlying numbers
//! change, so each metric is cached under its own TTL: memory usage moves
//! slowly (5 min), trend metrics slower still (30 min), general
//! performance numbers quickly (1 min). Persistence latency has no TTL at
//! all: it only changes on save, so the engine invalidates it explicitly.
//!
//! A compute failure returns the last-known-good value when one exists,
//! else a safe default; the failure never reaches the dashboard caller.

use std::collections::HashMap;

use aircal_core::errors::EngineResult;
use aircal_core::time::Timestamp;

/// TTL for memory-usage metrics
pub const MEMORY_TTL_MS: u64 = 5 * 60 * 1000;

/// TTL for trend metrics
pub const TREND_TTL_MS: u64 = 30 * 60 * 1000;

/// TTL for general performance metrics
pub const PERFORMANCE_TTL_MS: u64 = 60 * 1000;

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    value: f64,
    computed_at: Timestamp,
}

/// Per-metric cache with independent TTLs
#[derive(Debug, Default)]
pub struct MetricsCache {
    entries: HashMap<&'static str, CacheEntry>,
}

impl MetricsCache {
    /// Empty cache
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Fetch `key`, recomputing when missing or older than `ttl_ms`
    ///
    /// `ttl_ms = None` means the entry never expires by age and is only
    /// refreshed after an explicit [`invalidate`](Self::invalidate). On
    /// compute failure the stale value is served if one exists, else
    /// `default`.
    pub fn get_or_compute<F>(
        &mut self,
        key: &'static str,
        ttl_ms: Option<u64>,
        now: Timestamp,
        default: f64,
        compute: F,
    ) -> f64
    where
        F: FnOnce() -> EngineResult<f64>,
    {
        if let Some(entry) = self.entries.get(key) {
            let fresh = match ttl_ms {
                Some(ttl) => now.saturating_sub(entry.computed_at) < ttl,
                None => true,
            };
            if fresh {
                return entry.value;
            }
        }

        match compute() {
            Ok(value) => {
                log::debug!("metric {} recomputed: {}", key, value);
                self.entries.insert(
                    key,
                    CacheEntry {
                        value,
                        computed_at: now,
                    },
                );
                value
            }
            Err(err) => {
                log::warn!("metric {} failed to compute: {}", key, err);
                self.entries.get(key).map(|e| e.value).unwrap_or(default)
            }
        }
    }

    /// Store a value directly (used for push-style metrics)
    pub fn put(&mut self, key: &'static str, value: f64, now: Timestamp) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                computed_at: now,
            },
        );
    }

    /// Drop a single entry so the next read recomputes
    pub fn invalidate(&mut self, key: &'static str) {
        self.entries.remove(key);
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aircal_core::errors::EngineError;

    #[test]
    fn caches_within_ttl() {
        let mut cache = MetricsCache::new();
        let mut calls = 0;

        for _ in 0..3 {
            let v = cache.get_or_compute("m", Some(1000), 0, 0.0, || {
                calls += 1;
                Ok(42.0)
            });
            assert_eq!(v, 42.0);
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn recomputes_after_ttl() {
        let mut cache = MetricsCache::new();

        assert_eq!(
            cache.get_or_compute("m", Some(1000), 0, 0.0, || Ok(1.0)),
            1.0
        );
        // Still fresh at 999ms
        assert_eq!(
            cache.get_or_compute("m", Some(1000), 999, 0.0, || Ok(2.0)),
            1.0
        );
        // Stale at 1000ms
        assert_eq!(
            cache.get_or_compute("m", Some(1000), 1000, 0.0, || Ok(2.0)),
            2.0
        );
    }

    #[test]
    fn failure_serves_last_known_good() {
        let mut cache = MetricsCache::new();

        cache.get_or_compute("m", Some(100), 0, 0.0, || Ok(7.0));
        let v = cache.get_or_compute("m", Some(100), 500, 0.0, || {
            Err(EngineError::Collaborator { what: "compute" })
        });
        assert_eq!(v, 7.0);
    }

    #[test]
    fn failure_without_history_gives_default() {
        let mut cache = MetricsCache::new();
        let v = cache.get_or_compute("m", Some(100), 0, -1.0, || {
            Err(EngineError::Collaborator { what: "compute" })
        });
        assert_eq!(v, -1.0);
    }

    #[test]
    fn no_ttl_entries_only_refresh_on_invalidate() {
        let mut cache = MetricsCache::new();

        cache.put("latency", 12.0, 0);
        let v = cache.get_or_compute("latency", None, 1_000_000_000, 0.0, || Ok(99.0));
        assert_eq!(v, 12.0);

        cache.invalidate("latency");
        let v = cache.get_or_compute("latency", None, 1_000_000_000, 0.0, || Ok(99.0));
        assert_eq!(v, 99.0);
    }
}
