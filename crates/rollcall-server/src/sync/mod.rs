//! Offline-to-online reconciliation of captured actions.

mod payload;
mod processor;


pub use payload::{CapturedPayload, PayloadError};
pub use processor::SyncProcessor;
