//! Time-to-live cache over a string key/value store (browser local storage in
//! production, an in-memory map in tests).
//!
//! Each entry records its absolute expiry. Writes recompute it and reads
//! evaluate it, so no timer is ever armed and an old expiry can never remove
//! a newer value.

use crate::error::WidgetError;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::Duration;

/// Default lifetime of a cached UTM value.
pub const DEFAULT_TTL: Duration = Duration::from_millis(180_000);

/// Minimal string store. Interior mutability mirrors `window.localStorage`.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, WidgetError>;
    fn set(&self, key: &str, value: &str) -> Result<(), WidgetError>;
    fn remove(&self, key: &str) -> Result<(), WidgetError>;
}

/// Millisecond wall clock.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Clock advanced by hand.
#[derive(Debug, Default)]
pub struct ManualClock(Cell<u64>);

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self(Cell::new(start_ms))
    }

    pub fn advance(&self, by: Duration) {
        let by_ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.0.set(self.0.get().saturating_add(by_ms));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, WidgetError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), WidgetError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), WidgetError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    value: String,
    expires_at: u64,
}

pub struct TtlCache<S, C> {
    store: S,
    clock: C,
    ttl: Duration,
}

impl<S: KeyValueStore, C: Clock> TtlCache<S, C> {
    pub fn new(store: S, clock: C, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Store `value` with an expiry of now + ttl, replacing any earlier entry.
    pub fn put(&self, key: &str, value: &str) -> Result<(), WidgetError> {
        let ttl_ms = u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX);
        let entry = StoredEntry {
            value: value.to_string(),
            expires_at: self.clock.now_ms().saturating_add(ttl_ms),
        };
        self.store.set(key, &serde_json::to_string(&entry)?)
    }

    /// Unexpired value for `key` without touching its expiry.
    pub fn peek(&self, key: &str) -> Result<Option<String>, WidgetError> {
        Ok(self.live_entry(key)?.map(|entry| entry.value))
    }

    /// Unexpired value for `key`; a hit restarts the entry's ttl.
    pub fn get_refreshing(&self, key: &str) -> Result<Option<String>, WidgetError> {
        let Some(entry) = self.live_entry(key)? else {
            return Ok(None);
        };
        self.put(key, &entry.value)?;
        Ok(Some(entry.value))
    }

    pub fn remove(&self, key: &str) -> Result<(), WidgetError> {
        self.store.remove(key)
    }

    fn live_entry(&self, key: &str) -> Result<Option<StoredEntry>, WidgetError> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(None);
        };
        let entry = match serde_json::from_str::<StoredEntry>(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(%key, %err, "dropping unreadable cache entry");
                self.store.remove(key)?;
                return Ok(None);
            }
        };
        if self.clock.now_ms() >= entry.expires_at {
            self.store.remove(key)?;
            return Ok(None);
        }
        Ok(Some(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> TtlCache<MemoryStore, ManualClock> {
        TtlCache::new(MemoryStore::new(), ManualClock::new(1_000), DEFAULT_TTL)
    }

    #[test]
    fn value_survives_until_ttl() {
        let cache = cache();
        cache.put("utm_source-f1", "google").unwrap();
        cache.clock().advance(Duration::from_millis(179_999));
        assert_eq!(cache.peek("utm_source-f1").unwrap().as_deref(), Some("google"));
    }

    #[test]
    fn value_expires_after_ttl() {
        let cache = cache();
        cache.put("utm_source-f1", "google").unwrap();
        cache.clock().advance(DEFAULT_TTL);
        assert_eq!(cache.peek("utm_source-f1").unwrap(), None);
        assert!(cache.store().is_empty());
    }

    #[test]
    fn rewrite_pushes_expiry_forward() {
        let cache = cache();
        cache.put("k", "old").unwrap();
        cache.clock().advance(Duration::from_millis(120_000));
        cache.put("k", "new").unwrap();
        cache.clock().advance(Duration::from_millis(120_000));
        assert_eq!(cache.peek("k").unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn refreshing_read_restarts_ttl() {
        let cache = cache();
        cache.put("k", "v").unwrap();
        cache.clock().advance(Duration::from_millis(170_000));
        assert_eq!(cache.get_refreshing("k").unwrap().as_deref(), Some("v"));
        cache.clock().advance(Duration::from_millis(170_000));
        assert_eq!(cache.peek("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn huge_ttl_saturates_instead_of_wrapping() {
        let cache = TtlCache::new(
            MemoryStore::new(),
            ManualClock::new(1_700_000_000_000),
            Duration::from_millis(u64::MAX),
        );
        cache.put("k", "v").unwrap();
        assert_eq!(cache.peek("k").unwrap().as_deref(), Some("v"));
        cache.clock().advance(Duration::from_secs(86_400 * 365));
        assert_eq!(cache.peek("k").unwrap().as_deref(), Some("v"));
        assert_eq!(cache.store().len(), 1);
    }

    #[test]
    fn unreadable_entry_is_dropped() {
        let cache = cache();
        cache.store().set("k", "plain legacy value").unwrap();
        assert_eq!(cache.peek("k").unwrap(), None);
        assert!(cache.store().is_empty());
    }
}
