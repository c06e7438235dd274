//! Rollcall Client Library
//!
//! Offline side of Rollcall:
//! - Durable per-owner action queue in `SQLite`
//! - Single-flight drainer that submits queued actions as one sync batch
//! - HTTP transport to the Rollcall server
//! - Persisted client configuration

pub mod config;
pub mod drain;
pub mod queue;
pub mod transport;
