//! TTL cache (§4.C).
//!
//! Keyed in-memory store with per-entry expiry and prefix-delete, with a
//! background sweep. Grounded on the teacher's `HashMap`-of-state-behind-
//! a-struct pattern (`signals/quality.rs::SignalQualityGate`) combined with
//! the `Arc<RwLock<..>>` process-wide singleton idiom from `main.rs`.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
}

/// Process-wide memoization store for idempotent upstream responses. All
/// callers route reads/writes through here — nothing short-circuits it.
pub struct TtlCache {
    entries: RwLock<HashMap<String, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TtlCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let now = Utc::now();
        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(key) {
                if now < entry.expires_at {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("cache_hits_total").increment(1);
                    return Some(entry.value.clone());
                }
            } else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("cache_misses_total").increment(1);
                return None;
            }
        }
        // Expired: drop it under a write lock, then report a miss.
        self.entries.write().remove(key);
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cache_misses_total").increment(1);
        None
    }

    pub fn get_typed<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|raw| serde_json::from_str(&raw).ok())
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(0));
        self.entries.write().insert(
            key.into(),
            Entry {
                value: value.into(),
                expires_at,
            },
        );
    }

    pub fn set_typed<T: serde::Serialize>(&self, key: impl Into<String>, value: &T, ttl: Duration) {
        if let Ok(raw) = serde_json::to_string(value) {
            self.set(key, raw, ttl);
        }
    }

    /// Erase all keys matching a literal prefix (the cache's keys are
    /// deterministic `"<symbol>:<timeframe>:<indicator>[:...]"` strings, so
    /// a prefix match is sufficient — no globbing needed).
    pub fn delete_pattern(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        before - entries.len()
    }

    /// Background sweep: remove everything already expired.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, v| v.expires_at > now);
        let removed = before - entries.len();
        metrics::gauge!("cache_entries").set(entries.len() as f64);
        removed
    }

    pub fn counters(&self) -> CacheCounters {
        CacheCounters {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Spawn the ~5 minute background sweep task against a shared cache.
pub fn spawn_sweeper(cache: Arc<TtlCache>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(300));
        loop {
            ticker.tick().await;
            let removed = cache.sweep_expired();
            if removed > 0 {
                tracing::debug!(removed, "ttl cache sweep removed expired entries");
            }
        }
    })
}

/// Deterministic key builder: `"<symbol>:<timeframe>:<indicator>[:sorted
/// params][:candleTime]"`.
pub fn build_key(
    symbol: &str,
    timeframe: &str,
    indicator: &str,
    params: &[(&str, &str)],
    candle_time: Option<i64>,
) -> String {
    let mut key = format!("{symbol}:{timeframe}:{indicator}");
    if !params.is_empty() {
        let mut sorted: Vec<_> = params.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let joined = sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        key.push(':');
        key.push_str(&joined);
    }
    if let Some(ct) = candle_time {
        key.push(':');
        key.push_str(&ct.to_string());
    }
    key
}

/// TTL bands by data class (§4.C table).
pub mod ttl {
    use crate::models::Timeframe;
    use std::time::Duration;

    pub fn ohlcv(tf: Timeframe) -> Duration {
        match tf {
            Timeframe::H1 => Duration::from_secs(5 * 60),
            Timeframe::H4 => Duration::from_secs(30 * 60),
            Timeframe::D1 => Duration::from_secs(4 * 3600),
        }
    }

    pub fn aggregated_h4() -> Duration {
        Duration::from_secs(30 * 60)
    }

    pub fn decision_trade() -> Duration {
        Duration::from_secs(5 * 60)
    }

    pub fn decision_no_trade() -> Duration {
        Duration::from_secs(2 * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips_before_expiry() {
        let cache = TtlCache::new();
        cache.set("k", "v", Duration::from_secs(60));
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        assert_eq!(cache.counters().hits, 1);
    }

    #[test]
    fn expired_entry_misses_and_is_evicted() {
        let cache = TtlCache::new();
        cache.set("k", "v", Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn delete_pattern_removes_prefix_matches_only() {
        let cache = TtlCache::new();
        cache.set("EURUSD:H1:rsi", "1", Duration::from_secs(60));
        cache.set("EURUSD:H1:atr", "2", Duration::from_secs(60));
        cache.set("GBPUSD:H1:rsi", "3", Duration::from_secs(60));
        let removed = cache.delete_pattern("EURUSD:");
        assert_eq!(removed, 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn key_builder_sorts_params_deterministically() {
        let a = build_key("EURUSD", "H1", "ema", &[("period", "20"), ("source", "close")], None);
        let b = build_key("EURUSD", "H1", "ema", &[("source", "close"), ("period", "20")], None);
        assert_eq!(a, b);
    }

    #[test]
    fn sweep_removes_only_expired() {
        let cache = TtlCache::new();
        cache.set("fresh", "1", Duration::from_secs(60));
        cache.set("stale", "1", Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        let removed = cache.sweep_expired();
        assert_eq!(removed, 1);
        assert!(cache.get("fresh").is_some());
    }
}
