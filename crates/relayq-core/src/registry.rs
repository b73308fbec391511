//! Handler registry: exact-key lookup from a dotted callback path to an
//! invocable.
//!
//! Items name their callback by string so the callback does not have to
//! exist at enqueue time. Registration may happen at any point; items
//! enqueued earlier pick the handler up on the next walk (late binding).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::item::QueueItem;

/// Well-known path of the built-in example handler.
pub const ECHO_PATH: &str = "relayq.echo";

/// A callback for one dotted path.
///
/// `Err(reason)` is a decline: "conditions not yet met, try again on a
/// later walk" — not a permanent failure. Completion means the item is
/// done and gets removed from the store.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, item: &QueueItem) -> Result<(), String>;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("handler already registered for '{0}'")]
    AlreadyRegistered(String),
}

/// Registry of handlers (dotted path -> handler).
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(
        &self,
        path: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<(), RegistryError> {
        let path = path.into();
        let mut handlers = self.handlers.write().unwrap();
        if handlers.contains_key(&path) {
            return Err(RegistryError::AlreadyRegistered(path));
        }
        handlers.insert(path, handler);
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.read().unwrap().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().unwrap().is_empty()
    }
}

/// Example/test handler: logs what it was given and completes.
///
/// Registered under [`ECHO_PATH`] by default, usable as a smoke-test
/// target for the whole pipeline.
pub struct EchoHandler {
    delay: Duration,
}

impl EchoHandler {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    /// Simulate slow asynchronous work before completing.
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for EchoHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for EchoHandler {
    async fn call(&self, item: &QueueItem) -> Result<(), String> {
        warn!(
            key = %item.key,
            payload = %item.payload,
            url = item.meta.url.as_deref().unwrap_or(""),
            "echo handler used"
        );
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }
}
