//! Rollcall Core Library
//!
//! Shared functionality for Rollcall components:
//! - Wire types exchanged between the offline client and the sync server
//! - Configuration resolution and hierarchy
//! - `SQLite` pool helpers shared by the server store and the client queue
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;
pub mod wire;

pub use config::Config;
pub use error::{Error, Result};
pub use wire::{ActionKind, RegistrationStatus, SyncItem, SyncResult, SyncStatus};
