//! Item processor: marks an item in-flight, runs its handler, settles the
//! result.
//!
//! Design intent:
//! - The walker decides *what* to dispatch; the processor owns the item's
//!   state transitions from there.
//! - Dispatch is fire-and-forget relative to the handler's own latency:
//!   `dispatch` persists the `processing` status, spawns the handler task,
//!   and returns. The spawned task settles the item.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::event::QueueEvent;
use crate::item::{ItemStatus, QueueItem};
use crate::registry::{Handler, HandlerRegistry};
use crate::store::{ActivityStore, StoreError};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler is registered under the item's callback path. The item
    /// stays `processing`; the condition is reported to the walker, which
    /// logs it.
    #[error("callback not registered: {0}")]
    CallbackNotRegistered(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("item encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct ItemProcessor {
    store: Arc<dyn ActivityStore>,
    registry: Arc<HandlerRegistry>,
    events: broadcast::Sender<QueueEvent>,

    /// Per-dispatch handler deadline. Expiry is treated as a decline, so a
    /// handler that never settles cannot strand its item in `processing`.
    deadline: Duration,
}

impl ItemProcessor {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        registry: Arc<HandlerRegistry>,
        events: broadcast::Sender<QueueEvent>,
        deadline: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            events,
            deadline,
        }
    }

    /// Dispatch one item.
    ///
    /// The `processing` status is persisted *before* the handler runs, so a
    /// concurrent walk observes the item as in-flight and skips it.
    pub async fn dispatch(&self, mut item: QueueItem) -> Result<(), DispatchError> {
        item.meta.status = ItemStatus::Processing;
        self.store.write(item.key, item.to_value()?).await?;

        debug!(key = %item.key, callback = %item.callback, "item callback attempt");
        let Some(handler) = self.registry.get(&item.callback) else {
            return Err(DispatchError::CallbackNotRegistered(item.callback));
        };

        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        let deadline = self.deadline;
        tokio::spawn(async move {
            settle(store, events, handler, item, deadline).await;
        });
        Ok(())
    }
}

/// Run the handler and apply the resulting state transition.
async fn settle(
    store: Arc<dyn ActivityStore>,
    events: broadcast::Sender<QueueEvent>,
    handler: Arc<dyn Handler>,
    mut item: QueueItem,
    deadline: Duration,
) {
    match tokio::time::timeout(deadline, handler.call(&item)).await {
        Ok(Ok(())) => {
            if let Err(e) = store.delete(item.key).await {
                error!(key = %item.key, error = %e, "failed to remove completed item");
                return;
            }
            info!(key = %item.key, callback = %item.callback, "callback complete");
            let _ = events.send(QueueEvent::Completed { key: item.key });
        }
        Ok(Err(reason)) => {
            debug!(key = %item.key, reason = %reason, "item callback declined");
            requeue(store.as_ref(), &events, &mut item).await;
        }
        Err(_) => {
            warn!(
                key = %item.key,
                deadline_ms = deadline.as_millis() as u64,
                "item callback deadline elapsed, treating as decline"
            );
            requeue(store.as_ref(), &events, &mut item).await;
        }
    }
}

/// `processing -> ready`: eligible for re-dispatch on the next walk.
async fn requeue(
    store: &dyn ActivityStore,
    events: &broadcast::Sender<QueueEvent>,
    item: &mut QueueItem,
) {
    item.meta.status = ItemStatus::Ready;
    let value = match item.to_value() {
        Ok(value) => value,
        Err(e) => {
            error!(key = %item.key, error = %e, "failed to encode declined item");
            return;
        }
    };
    if let Err(e) = store.write(item.key, value).await {
        error!(key = %item.key, error = %e, "failed to requeue declined item");
        return;
    }
    let _ = events.send(QueueEvent::Declined { key: item.key });
}
