//! Public queue facade: enqueue, restart, startup trigger, event stream.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::context::{
    ContextReader, ENTITY_BUNDLE_FIELD, ENTITY_NID_FIELD, ENTITY_TNID_FIELD, URL_FIELD,
};
use crate::event::QueueEvent;
use crate::item::{ItemMeta, ItemStatus, QueueItem};
use crate::processor::ItemProcessor;
use crate::registry::{ECHO_PATH, EchoHandler, HandlerRegistry};
use crate::store::{ActivityKey, ActivityStore, StoreError};
use crate::walker::QueueWalker;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Store namespace holding this queue's items.
    pub namespace: String,

    /// TTL applied to malformed or unknown-status entries so the store
    /// reaps them instead of the walker revisiting them forever.
    pub grace_expiry: Duration,

    /// Per-dispatch handler deadline; expiry is treated as a decline.
    pub dispatch_deadline: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            namespace: "relayq".to_string(),
            grace_expiry: Duration::from_secs(10),
            dispatch_deadline: Duration::from_secs(30),
        }
    }
}

/// Options for [`RelayQueue::push`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PushOptions {
    /// Walk the queue as soon as the store acknowledges the write, instead
    /// of waiting for the next scheduled trigger.
    pub process_now: bool,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("item encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The queue. Owns the store, context reader, registry, and event stream.
///
/// Processing failures never propagate to the embedding: `restart` and
/// `start` log and carry on, dispatch errors surface through the log sink
/// and the event stream only. `push` does return its store error, since a
/// failed write means there is no item at all.
pub struct RelayQueue {
    store: Arc<dyn ActivityStore>,
    context: Arc<dyn ContextReader>,
    registry: Arc<HandlerRegistry>,
    events: broadcast::Sender<QueueEvent>,
    walker: QueueWalker,
    config: QueueConfig,
}

impl RelayQueue {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        context: Arc<dyn ContextReader>,
        config: QueueConfig,
    ) -> Self {
        let registry = Arc::new(HandlerRegistry::new());
        // The built-in example callback is always available as a
        // smoke-test target for the pipeline.
        registry
            .register(ECHO_PATH, Arc::new(EchoHandler::new()))
            .expect("fresh registry");

        let (events, _) = broadcast::channel(64);
        let processor = ItemProcessor::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            events.clone(),
            config.dispatch_deadline,
        );
        let walker = QueueWalker::new(
            Arc::clone(&store),
            processor,
            events.clone(),
            config.grace_expiry,
        );

        Self {
            store,
            context,
            registry,
            events,
            walker,
            config,
        }
    }

    /// Handler registry, for registering callbacks before or after startup.
    pub fn registry(&self) -> Arc<HandlerRegistry> {
        Arc::clone(&self.registry)
    }

    /// Subscribe to queue lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Enqueue one item with a snapshot of the current page context.
    ///
    /// With `process_now`, the store's acknowledgment of the write is
    /// itself the trigger: a walk over the then-current snapshot starts
    /// immediately instead of waiting for the next scheduled one.
    pub async fn push(
        &self,
        payload: Value,
        callback: &str,
        options: PushOptions,
    ) -> Result<ActivityKey, QueueError> {
        let item = QueueItem {
            key: ActivityKey::default(),
            callback: callback.to_string(),
            payload,
            meta: self.snapshot_meta(),
        };
        let value = item.to_value()?;
        let key = self.store.create(&self.config.namespace, value).await?;

        info!(
            key = %key,
            callback = %item.callback,
            payload = %item.payload,
            "item added"
        );
        let _ = self.events.send(QueueEvent::Added { key });

        if options.process_now {
            self.restart().await;
        }
        Ok(key)
    }

    /// Kick off a round of queue process attempts over the current
    /// snapshot. Safe to call at any time, e.g. after connectivity returns.
    pub async fn restart(&self) {
        let snapshot = match self.store.read_all(&self.config.namespace).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "failed to read queue snapshot");
                return;
            }
        };
        self.walker.drain(snapshot).await;
    }

    /// Startup trigger: check the queue once at load.
    pub async fn start(&self) {
        debug!(namespace = %self.config.namespace, "initial queue walk");
        self.restart().await;
    }

    fn snapshot_meta(&self) -> ItemMeta {
        ItemMeta {
            status: ItemStatus::New,
            url: self.context.get(URL_FIELD),
            entity_bundle: self.context.get(ENTITY_BUNDLE_FIELD),
            entity_nid: self.context.get(ENTITY_NID_FIELD),
            entity_tnid: self.context.get(ENTITY_TNID_FIELD),
            enqueued_at: Utc::now(),
        }
    }
}
