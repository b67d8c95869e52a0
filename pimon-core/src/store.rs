/**
 * STORE - Cache clé → observation horodatée avec TTL / stale TTL
 *
 * ROLE:
 * Single shared keyed map written by collectors (`publish`) and read by any
 * number of handlers (`snapshot`). Freshness is derived at read time, never
 * stored.
 *
 * FONCTIONNEMENT:
 * - one lock for the whole map, held only for a single insert or a clone
 * - `publish` replaces the entry atomically (data + updated_at together)
 * - a missing key reads as "no data": `data = null, stale = true, expired = true`
 *
 * Age is measured on the tokio clock so paused-time tests drive staleness.
 */

use crate::state::{shared, Shared};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Multiplier applied to `ttl` when no stale TTL is supplied.
pub const DEFAULT_STALE_FACTOR: u32 = 3;

#[derive(Debug, Clone)]
struct Entry {
    data: Value,
    updated_at: DateTime<Utc>,
    published: Instant,
    ttl: Duration,
    stale_ttl: Duration,
}

impl Entry {
    fn new(data: Value, ttl: Duration, stale_ttl: Option<Duration>) -> Self {
        let stale_ttl = stale_ttl.unwrap_or(ttl.saturating_mul(DEFAULT_STALE_FACTOR)).max(ttl);
        Self {
            data,
            updated_at: Utc::now(),
            published: Instant::now(),
            ttl,
            stale_ttl,
        }
    }

    fn meta_at(&self, now: Instant) -> EntryMeta {
        let age = now.saturating_duration_since(self.published);
        EntryMeta {
            age: Some(age.as_secs_f64()),
            stale: age > self.ttl,
            expired: age > self.stale_ttl,
            updated_at: Some(self.updated_at),
            ttl: Some(self.ttl.as_secs_f64()),
            stale_ttl: Some(self.stale_ttl.as_secs_f64()),
        }
    }
}

/// Freshness metadata computed on every read. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryMeta {
    pub age: Option<f64>,
    pub stale: bool,
    pub expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_ttl: Option<f64>,
}

impl EntryMeta {
    /// Metadata of a key that was never published.
    pub fn missing() -> Self {
        Self {
            age: None,
            stale: true,
            expired: true,
            updated_at: None,
            ttl: None,
            stale_ttl: None,
        }
    }
}

/// Point-in-time copy of an entry: `{data, meta}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub data: Option<Value>,
    pub meta: EntryMeta,
}

/// Handle on the observation cache. Cloning shares the same map.
#[derive(Clone, Default)]
pub struct Store {
    entries: Shared<HashMap<String, Entry>>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            entries: shared(HashMap::new()),
        }
    }

    /// Overwrites the entry for `key` and resets its age. Never fails.
    ///
    /// `stale_ttl` defaults to `3 × ttl` and is clamped so it is never below `ttl`.
    pub fn publish(&self, key: &str, data: Value, ttl: Duration, stale_ttl: Option<Duration>) {
        let entry = Entry::new(data, ttl, stale_ttl);
        self.entries.lock().insert(key.to_string(), entry);
    }

    pub fn snapshot(&self, key: &str) -> Snapshot {
        let now = Instant::now();
        let entry = self.entries.lock().get(key).cloned();
        match entry {
            Some(entry) => {
                let meta = entry.meta_at(now);
                Snapshot {
                    data: Some(entry.data),
                    meta,
                }
            }
            None => Snapshot {
                data: None,
                meta: EntryMeta::missing(),
            },
        }
    }

    /// Shortcut for `snapshot(key).data`.
    pub fn data(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).map(|e| e.data.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn fresh_then_stale_then_expired() {
        let store = Store::new();
        store.publish("cpu", json!({"usage": 42}), Duration::from_secs(3), None);

        let snap = store.snapshot("cpu");
        assert_eq!(snap.data, Some(json!({"usage": 42})));
        assert!(!snap.meta.stale);
        assert!(!snap.meta.expired);

        tokio::time::advance(Duration::from_secs(4)).await;
        let snap = store.snapshot("cpu");
        assert!(snap.meta.stale);
        assert!(!snap.meta.expired);

        tokio::time::advance(Duration::from_secs(6)).await;
        let snap = store.snapshot("cpu");
        assert!(snap.meta.stale);
        assert!(snap.meta.expired);
        assert_eq!(snap.data, Some(json!({"usage": 42})));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_stale_ttl_drives_expiry() {
        let store = Store::new();
        store.publish("usb.devices", json!([]), Duration::from_secs(2), Some(Duration::from_secs(12)));
        let meta = store.snapshot("usb.devices").meta;
        assert!(!meta.stale && !meta.expired);
        assert_eq!(meta.stale_ttl, Some(12.0));

        tokio::time::advance(Duration::from_secs(3)).await;
        let meta = store.snapshot("usb.devices").meta;
        assert!(meta.stale && !meta.expired);

        // past the 3×ttl default, still inside the explicit stale TTL
        tokio::time::advance(Duration::from_secs(5)).await;
        let meta = store.snapshot("usb.devices").meta;
        assert!(meta.stale && !meta.expired);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(store.snapshot("usb.devices").meta.expired);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_is_fresh_only_at_publish_instant() {
        let store = Store::new();
        store.publish("k", json!(1), Duration::ZERO, None);
        let meta = store.snapshot("k").meta;
        assert!(!meta.stale && !meta.expired);
        assert_eq!(meta.stale_ttl, Some(0.0));

        tokio::time::advance(Duration::from_millis(1)).await;
        let meta = store.snapshot("k").meta;
        assert!(meta.stale && meta.expired);

        store.publish("j", json!(1), Duration::ZERO, Some(Duration::from_secs(1)));
        tokio::time::advance(Duration::from_millis(1)).await;
        let meta = store.snapshot("j").meta;
        assert!(meta.stale && !meta.expired);
    }

    #[test]
    fn huge_ttl_saturates() {
        let store = Store::new();
        store.publish("k", json!(1), Duration::MAX, None);
        let meta = store.snapshot("k").meta;
        assert!(!meta.stale && !meta.expired);
    }

    #[test]
    fn never_published_key_reads_as_no_data() {
        let store = Store::new();
        let snap = store.snapshot("usb.devices");
        assert!(snap.data.is_none());
        assert!(snap.meta.stale);
        assert!(snap.meta.expired);
        assert!(snap.meta.age.is_none());

        let body = serde_json::to_value(&snap).unwrap();
        assert_eq!(body, json!({"data": null, "meta": {"age": null, "stale": true, "expired": true}}));
    }

    #[test]
    fn default_stale_ttl_is_three_times_ttl() {
        let store = Store::new();
        store.publish("k", json!(1), Duration::from_secs(2), None);
        let meta = store.snapshot("k").meta;
        assert_eq!(meta.ttl, Some(2.0));
        assert_eq!(meta.stale_ttl, Some(6.0));
    }

    #[test]
    fn stale_ttl_never_below_ttl() {
        let store = Store::new();
        store.publish("k", json!(1), Duration::from_secs(5), Some(Duration::from_secs(1)));
        assert_eq!(store.snapshot("k").meta.stale_ttl, Some(5.0));
    }

    #[tokio::test(start_paused = true)]
    async fn republish_revives_entry() {
        let store = Store::new();
        store.publish("k", json!("old"), Duration::from_secs(1), None);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(store.snapshot("k").meta.expired);

        store.publish("k", json!("new"), Duration::from_secs(1), None);
        let snap = store.snapshot("k");
        assert_eq!(snap.data, Some(json!("new")));
        assert!(!snap.meta.stale);
        assert_eq!(snap.meta.age, Some(0.0));
    }

    #[test]
    fn concurrent_publishers_never_tear_entries() {
        let store = Store::new();
        store.publish("a", json!({"seq": 0, "check": 0}), Duration::from_secs(10), None);
        store.publish("b", json!({"seq": 0, "check": 0}), Duration::from_secs(10), None);

        std::thread::scope(|s| {
            for key in ["a", "b"] {
                let store = store.clone();
                s.spawn(move || {
                    for seq in 1..=2000u64 {
                        store.publish(key, json!({"seq": seq, "check": seq * 7}), Duration::from_secs(10), None);
                    }
                });
            }
            for _ in 0..4 {
                let store = store.clone();
                s.spawn(move || {
                    for _ in 0..2000 {
                        for key in ["a", "b"] {
                            let data = store.snapshot(key).data.unwrap();
                            let seq = data["seq"].as_u64().unwrap();
                            assert_eq!(data["check"].as_u64().unwrap(), seq * 7);
                        }
                    }
                });
            }
        });

        assert_eq!(store.data("a").unwrap()["seq"], 2000);
        assert_eq!(store.data("b").unwrap()["seq"], 2000);
    }
}
