//! Queue lifecycle events.
//!
//! Observers subscribe through [`crate::queue::RelayQueue::subscribe`];
//! emission is fire-and-forget, a subscriber that lags or disconnects
//! never affects the queue.

use crate::store::ActivityKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    /// An item was written to the store by `push`.
    Added { key: ActivityKey },

    /// A handler completed and the item was removed from the store.
    Completed { key: ActivityKey },

    /// A handler declined (or hit its deadline); the item is `ready` again.
    Declined { key: ActivityKey },

    /// A walk fully drained its snapshot. Fired once per walk.
    Empty,
}
