//! Queue item model: payload, callback reference, and status metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::store::ActivityKey;

/// Item status (lowercase on the wire).
///
/// State transitions:
/// - `new`/`ready` -> `processing` (persisted before the handler runs)
/// - `processing` -> deleted (handler completed)
/// - `processing` -> `ready` (handler declined; eligible for re-dispatch)
///
/// Exactly one of the three at any instant. A stored value carrying any
/// other string is an [`ParseError::UnknownStatus`], never coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Freshly enqueued, never dispatched.
    New,

    /// Declined at least once, waiting for the next walk.
    Ready,

    /// In flight: a dispatch owns it, walks skip it.
    Processing,
}

impl ItemStatus {
    /// Is this item eligible for dispatch?
    pub fn is_dispatchable(self) -> bool {
        matches!(self, ItemStatus::New | ItemStatus::Ready)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::New => "new",
            ItemStatus::Ready => "ready",
            ItemStatus::Processing => "processing",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(ItemStatus::New),
            "ready" => Some(ItemStatus::Ready),
            "processing" => Some(ItemStatus::Processing),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata snapshot taken at enqueue time.
///
/// Everything except `status` is immutable after creation: the context
/// fields record what the page looked like when the item was enqueued,
/// not when it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMeta {
    pub status: ItemStatus,

    /// Page location at enqueue time.
    pub url: Option<String>,

    pub entity_bundle: Option<String>,
    pub entity_nid: Option<String>,
    pub entity_tnid: Option<String>,

    pub enqueued_at: DateTime<Utc>,
}

/// A failed read of a stored value.
///
/// The two variants are deliberately distinct: a malformed entry gets a
/// grace expiry, an unknown status is a defect worth its own log line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("bad item type or missing required properties")]
    Malformed,

    #[error("unknown item status: {0}")]
    UnknownStatus(String),
}

/// One unit of deferred work.
///
/// The `callback` path is resolved lazily against the handler registry at
/// dispatch time, so a handler may register after items referencing it were
/// enqueued. The payload is opaque to the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Store-assigned key; the store owns it, the item carries a copy.
    /// Not part of the stored value.
    #[serde(skip)]
    pub key: ActivityKey,

    /// Dotted path naming the registered handler.
    pub callback: String,

    /// Caller-supplied data, passed through unmodified.
    pub payload: Value,

    pub meta: ItemMeta,
}

impl QueueItem {
    /// Parse a stored value back into an item.
    ///
    /// The status string is checked before the full decode so an unknown
    /// status is reported as such rather than as a generic shape error.
    pub fn from_value(key: ActivityKey, value: &Value) -> Result<Self, ParseError> {
        let status = value
            .get("meta")
            .and_then(|meta| meta.get("status"))
            .and_then(Value::as_str)
            .ok_or(ParseError::Malformed)?;

        if ItemStatus::parse(status).is_none() {
            return Err(ParseError::UnknownStatus(status.to_string()));
        }

        let mut item: QueueItem =
            serde_json::from_value(value.clone()).map_err(|_| ParseError::Malformed)?;
        item.key = key;
        Ok(item)
    }

    /// Encode for storage. The key is omitted; the store tracks it.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
