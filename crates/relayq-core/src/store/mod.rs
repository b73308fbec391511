//! Activity store port: the persistence substrate behind the queue.
//!
//! The queue consumes the store through this narrow contract only. No
//! transactional guarantees are assumed; each call is independent and may
//! race with others. Coordination between walks is advisory, via the item
//! status field.

mod memory;

pub use memory::InMemoryStore;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use ulid::Ulid;

/// Opaque key assigned by the store when an activity is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivityKey(Ulid);

impl ActivityKey {
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for ActivityKey {
    /// Nil placeholder, replaced once the store assigns a real key.
    fn default() -> Self {
        Self(Ulid::nil())
    }
}

impl fmt::Display for ActivityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "act-{}", self.0)
    }
}

/// One persisted entry: the store's key plus the raw stored value.
///
/// The value is kept raw here on purpose: validation happens in the walker,
/// which must distinguish malformed entries from well-formed items.
#[derive(Debug, Clone)]
pub struct Activity {
    pub key: ActivityKey,
    pub value: Value,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("activity not found: {0}")]
    NotFound(ActivityKey),

    #[error("store operation failed: {0}")]
    Backend(String),
}

/// Store port (interface).
///
/// The in-memory implementation below is the development/test substrate;
/// this trait is the seam for swapping in a real one.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// All live activities under a namespace, FIFO at read time.
    async fn read_all(&self, ns: &str) -> Result<Vec<Activity>, StoreError>;

    /// Create a new activity under a namespace; the store assigns the key.
    async fn create(&self, ns: &str, value: Value) -> Result<ActivityKey, StoreError>;

    /// Overwrite an existing activity's value.
    async fn write(&self, key: ActivityKey, value: Value) -> Result<(), StoreError>;

    /// Remove an activity. Removing an absent key is not an error.
    async fn delete(&self, key: ActivityKey) -> Result<(), StoreError>;

    /// Shorten (or set) an activity's time-to-live. The store reaps the
    /// entry once the TTL elapses.
    async fn set_expiry(&self, key: ActivityKey, ttl: Duration) -> Result<(), StoreError>;
}
