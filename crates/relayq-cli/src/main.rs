use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::time::{Duration, sleep};

use relayq_core::{
    ECHO_PATH, Handler, InMemoryStore, PushOptions, QueueConfig, QueueItem, RelayQueue,
    StaticContext,
};

/// Declines the first `n` dispatches, then completes. Demonstrates the
/// retry-on-decline loop: a declined item comes back `ready` and gets
/// picked up by the next walk.
struct FlakyHandler {
    remaining_declines: AtomicU32,
}

impl FlakyHandler {
    fn new(n: u32) -> Self {
        Self {
            remaining_declines: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl Handler for FlakyHandler {
    async fn call(&self, item: &QueueItem) -> Result<(), String> {
        let left = self.remaining_declines.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_declines.fetch_sub(1, Ordering::Relaxed);
            return Err(format!("conditions not yet met (left={left})"));
        }
        println!("handled: {}", item.payload);
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relayq_core=debug".into()),
        )
        .init();

    // (A) Wire the store, page context, and queue.
    let store = Arc::new(InMemoryStore::new());
    let context = StaticContext::new()
        .with_field("url", "https://example.test/demo")
        .with_field("entityBundle", "article")
        .with_field("entityNid", "42");
    let config = QueueConfig::default();
    let namespace = config.namespace.clone();
    let queue = RelayQueue::new(store.clone(), Arc::new(context), config);

    // (B) Register a callback. The echo handler is already there.
    queue
        .registry()
        .register("demo.flaky", Arc::new(FlakyHandler::new(2)))
        .unwrap();

    // (C) Watch the event stream.
    let mut events = queue.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("event: {event:?}");
        }
    });

    // (D) Startup trigger, then push work. The second push asks for
    // immediate processing: the walk starts as soon as the write lands.
    queue.start().await;
    queue
        .push(
            serde_json::json!({"note": "smoke test"}),
            ECHO_PATH,
            PushOptions::default(),
        )
        .await
        .unwrap();
    queue
        .push(
            serde_json::json!({"id": 1}),
            "demo.flaky",
            PushOptions { process_now: true },
        )
        .await
        .unwrap();

    // (E) Keep triggering walks until the queue quiesces: declined items
    // need another trigger to be retried.
    loop {
        queue.restart().await;
        sleep(Duration::from_millis(100)).await;
        if store.len(&namespace).await == 0 {
            break;
        }
    }
    println!("queue quiesced");
}
