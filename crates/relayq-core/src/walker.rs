//! Queue walker: drains one snapshot, dispatching ready items.
//!
//! The snapshot is fetched once per walk and never re-read mid-walk, so
//! items added during a walk cannot be double-visited or loop the drain;
//! they wait for the next trigger. The drain is an explicit work-list loop
//! rather than recursion, so large queues do not grow the call stack.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, trace};

use crate::event::QueueEvent;
use crate::item::{ItemStatus, QueueItem};
use crate::processor::ItemProcessor;
use crate::store::{Activity, ActivityKey, ActivityStore};

pub struct QueueWalker {
    store: Arc<dyn ActivityStore>,
    processor: ItemProcessor,
    events: broadcast::Sender<QueueEvent>,

    /// TTL applied to entries the walker refuses to dispatch (malformed or
    /// unknown status), so the store reaps them instead of the walker
    /// revisiting them on every trigger.
    grace_expiry: Duration,
}

impl QueueWalker {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        processor: ItemProcessor,
        events: broadcast::Sender<QueueEvent>,
        grace_expiry: Duration,
    ) -> Self {
        Self {
            store,
            processor,
            events,
            grace_expiry,
        }
    }

    /// Drain the snapshot to exhaustion, then signal `Empty`.
    ///
    /// Dispatch does not block the walk: each ready item's handler runs on
    /// its own task while the walk moves on. Failures are logged and the
    /// walk continues; nothing here interrupts the embedding.
    pub async fn drain(&self, snapshot: Vec<Activity>) {
        let mut snapshot: VecDeque<Activity> = snapshot.into();
        while let Some(activity) = snapshot.pop_front() {
            match QueueItem::from_value(activity.key, &activity.value) {
                Ok(item) if item.meta.status == ItemStatus::Processing => {
                    // In flight: another dispatch owns it.
                    trace!(key = %item.key, "skipping in-flight item");
                }
                Ok(item) => {
                    if let Err(e) = self.processor.dispatch(item).await {
                        error!(key = %activity.key, error = %e, "item error");
                    }
                }
                Err(e) => {
                    error!(key = %activity.key, error = %e, "item error");
                    self.demote(activity.key).await;
                }
            }
        }
        debug!("queue snapshot drained");
        let _ = self.events.send(QueueEvent::Empty);
    }

    async fn demote(&self, key: ActivityKey) {
        if let Err(e) = self.store.set_expiry(key, self.grace_expiry).await {
            error!(key = %key, error = %e, "failed to shorten item expiry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemMeta;
    use crate::registry::{Handler, HandlerRegistry};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    const GRACE: Duration = Duration::from_secs(10);

    struct CountingHandler {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Handler for CountingHandler {
        async fn call(&self, _item: &QueueItem) -> Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        store: Arc<InMemoryStore>,
        walker: QueueWalker,
        events: broadcast::Receiver<QueueEvent>,
        calls: Arc<AtomicU32>,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let calls = Arc::new(AtomicU32::new(0));
        let registry = Arc::new(HandlerRegistry::new());
        registry
            .register(
                "count",
                Arc::new(CountingHandler {
                    calls: Arc::clone(&calls),
                }),
            )
            .unwrap();
        let (events, rx) = broadcast::channel(16);
        let processor = ItemProcessor::new(
            Arc::clone(&store) as Arc<dyn ActivityStore>,
            registry,
            events.clone(),
            Duration::from_secs(30),
        );
        let walker = QueueWalker::new(
            Arc::clone(&store) as Arc<dyn ActivityStore>,
            processor,
            events,
            GRACE,
        );
        Harness {
            store,
            walker,
            events: rx,
            calls,
        }
    }

    fn item_value(status: ItemStatus) -> serde_json::Value {
        let item = QueueItem {
            key: ActivityKey::default(),
            callback: "count".to_string(),
            payload: json!({}),
            meta: ItemMeta {
                status,
                url: None,
                entity_bundle: None,
                entity_nid: None,
                entity_tnid: None,
                enqueued_at: Utc::now(),
            },
        };
        item.to_value().unwrap()
    }

    #[tokio::test]
    async fn empty_snapshot_emits_empty_with_no_side_effects() {
        let mut h = harness();
        h.walker.drain(Vec::new()).await;

        assert_eq!(h.events.recv().await.unwrap(), QueueEvent::Empty);
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.store.len("q").await, 0);
    }

    #[tokio::test]
    async fn dispatches_ready_items_and_skips_in_flight_ones() {
        let mut h = harness();
        // N = 4, K = 1 processing: exactly N - K dispatches.
        h.store.create("q", item_value(ItemStatus::New)).await.unwrap();
        h.store
            .create("q", item_value(ItemStatus::Processing))
            .await
            .unwrap();
        h.store.create("q", item_value(ItemStatus::Ready)).await.unwrap();
        h.store.create("q", item_value(ItemStatus::New)).await.unwrap();

        let snapshot = h.store.read_all("q").await.unwrap();
        h.walker.drain(snapshot).await;

        // Three completions, then quiescence.
        let mut completed = 0;
        loop {
            match h.events.recv().await.unwrap() {
                QueueEvent::Completed { .. } => completed += 1,
                QueueEvent::Empty => break,
                other => panic!("unexpected event: {other:?}"),
            }
        }
        // Handlers settle on their own tasks; completions may land after
        // the Empty signal, so wait for the rest.
        while completed < 3 {
            match h.events.recv().await.unwrap() {
                QueueEvent::Completed { .. } => completed += 1,
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(h.calls.load(Ordering::SeqCst), 3);
        // The in-flight item was skipped, not re-queued or touched.
        assert_eq!(h.store.len("q").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_entry_gets_the_grace_expiry() {
        let mut h = harness();
        let key = h.store.create("q", json!("garbage")).await.unwrap();

        let snapshot = h.store.read_all("q").await.unwrap();
        h.walker.drain(snapshot).await;
        assert_eq!(h.events.recv().await.unwrap(), QueueEvent::Empty);

        // Not deleted outright: it lingers for the 10-second grace window.
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(h.store.get(key).await.is_some());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(h.store.get(key).await.is_none());
        // The next walk never sees it.
        assert!(h.store.read_all("q").await.unwrap().is_empty());
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_status_gets_the_grace_expiry_too() {
        let mut h = harness();
        let mut value = item_value(ItemStatus::New);
        value["meta"]["status"] = json!("paused");
        let key = h.store.create("q", value).await.unwrap();

        let snapshot = h.store.read_all("q").await.unwrap();
        h.walker.drain(snapshot).await;
        assert_eq!(h.events.recv().await.unwrap(), QueueEvent::Empty);
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(h.store.get(key).await.is_none());
    }

    #[tokio::test]
    async fn concurrent_enqueues_are_invisible_to_an_in_flight_walk() {
        let h = harness();
        h.store.create("q", item_value(ItemStatus::New)).await.unwrap();

        let snapshot = h.store.read_all("q").await.unwrap();
        // Lands after the snapshot was taken.
        let late_key = h.store.create("q", item_value(ItemStatus::New)).await.unwrap();

        h.walker.drain(snapshot).await;
        tokio::task::yield_now().await;

        // Only the snapshotted item was dispatched; the late one still sits
        // untouched as `new` for the next trigger.
        let value = h.store.get(late_key).await.unwrap();
        assert_eq!(value["meta"]["status"], "new");
    }
}
