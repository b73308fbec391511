//! relayq-core
//!
//! A durable, client-resident task queue: callers enqueue named work items
//! with arbitrary payloads, and walks over the persisted queue dispatch
//! them to registered handlers, retrying items whose handler declines.
//!
//! Module map:
//! - **item**: queue item model and the status state machine
//! - **store**: activity store port + in-memory implementation
//! - **context**: page-context reader port (enqueue-time snapshots)
//! - **registry**: handler trait and exact-key handler registry
//! - **processor**: per-item dispatch (persist `processing`, run handler)
//! - **walker**: snapshot drain loop
//! - **event**: queue lifecycle events
//! - **queue**: public facade (`push` / `restart` / `start` / events)

pub mod context;
pub mod event;
pub mod item;
pub mod processor;
pub mod queue;
pub mod registry;
pub mod store;
pub mod walker;

pub use context::{ContextReader, StaticContext};
pub use event::QueueEvent;
pub use item::{ItemMeta, ItemStatus, ParseError, QueueItem};
pub use processor::{DispatchError, ItemProcessor};
pub use queue::{PushOptions, QueueConfig, QueueError, RelayQueue};
pub use registry::{ECHO_PATH, EchoHandler, Handler, HandlerRegistry, RegistryError};
pub use store::{Activity, ActivityKey, ActivityStore, InMemoryStore, StoreError};
pub use walker::QueueWalker;
