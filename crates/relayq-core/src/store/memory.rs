//! In-memory store implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{Activity, ActivityKey, ActivityStore, StoreError};

struct Entry {
    ns: String,
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct StoreState {
    /// All entries (single source of truth).
    entries: HashMap<ActivityKey, Entry>,

    /// Insertion order, so `read_all` is FIFO at read time.
    order: Vec<ActivityKey>,
}

impl StoreState {
    /// Drop entries whose TTL has elapsed. Ran on every read so expired
    /// entries never surface in a snapshot.
    fn reap_expired(&mut self) {
        let now = Instant::now();
        let expired: Vec<ActivityKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at.is_some_and(|at| at <= now))
            .map(|(key, _)| *key)
            .collect();
        for key in expired {
            self.entries.remove(&key);
            self.order.retain(|k| *k != key);
        }
    }
}

/// In-memory activity store.
///
/// Uses the tokio clock for expiry so tests can drive reaping with the
/// paused clock.
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Raw value for a key, if present and unexpired.
    pub async fn get(&self, key: ActivityKey) -> Option<Value> {
        let mut state = self.state.lock().await;
        state.reap_expired();
        state.entries.get(&key).map(|entry| entry.value.clone())
    }

    /// Number of live activities under a namespace.
    pub async fn len(&self, ns: &str) -> usize {
        let mut state = self.state.lock().await;
        state.reap_expired();
        state.entries.values().filter(|entry| entry.ns == ns).count()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActivityStore for InMemoryStore {
    async fn read_all(&self, ns: &str) -> Result<Vec<Activity>, StoreError> {
        let mut state = self.state.lock().await;
        state.reap_expired();
        let activities = state
            .order
            .iter()
            .filter_map(|key| {
                state.entries.get(key).and_then(|entry| {
                    (entry.ns == ns).then(|| Activity {
                        key: *key,
                        value: entry.value.clone(),
                    })
                })
            })
            .collect();
        Ok(activities)
    }

    async fn create(&self, ns: &str, value: Value) -> Result<ActivityKey, StoreError> {
        let mut state = self.state.lock().await;
        let key = ActivityKey::generate();
        state.entries.insert(
            key,
            Entry {
                ns: ns.to_string(),
                value,
                expires_at: None,
            },
        );
        state.order.push(key);
        Ok(key)
    }

    async fn write(&self, key: ActivityKey, value: Value) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        match state.entries.get_mut(&key) {
            Some(entry) => {
                entry.value = value;
                Ok(())
            }
            None => Err(StoreError::NotFound(key)),
        }
    }

    async fn delete(&self, key: ActivityKey) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.entries.remove(&key);
        state.order.retain(|k| *k != key);
        Ok(())
    }

    async fn set_expiry(&self, key: ActivityKey, ttl: Duration) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.entries.get_mut(&key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }
}
