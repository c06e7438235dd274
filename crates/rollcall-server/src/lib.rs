//! Rollcall Server Library
//!
//! Core functionality for the Rollcall server:
//! - `SQLite` storage for events, registrations, attendance, and skill badges
//! - Signed check-in token issuance and verification
//! - Capacity-aware registration allocation
//! - Reconciliation of actions captured offline
//! - HTTP routes over all of the above

pub mod auth;
pub mod registration;
pub mod server;
pub mod storage;
pub mod sync;
