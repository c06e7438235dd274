//! Durable action queue.
//!
//! Actions are captured into the queue while offline and leave it only as
//! verified or rejected outcomes. Every query is scoped to an owner so a
//! shared device never mixes users' actions.

mod db;
mod models;
mod queries;

#[cfg(test)]
mod tests;

pub use db::{DatabaseError, QueueDatabase};
pub use models::{Enqueued, QueueItem, QueueStatus};

/// Age after which a `SYNCING` item is treated as abandoned. Well above the
/// transport's request timeout, so it never catches a live drain.
pub const STALE_SYNC_SECS: i64 = 5 * 60;
