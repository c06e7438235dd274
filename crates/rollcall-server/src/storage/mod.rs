//! `SQLite` storage for the Rollcall server.
//!
//! Provides persistence for events, registrations, attendance, and skill
//! badges. Pool-level lookups live in `queries`; statements that must run
//! inside a caller's transaction live in `tx`.

mod db;
mod models;
mod queries;
pub mod tx;


pub use db::{DatabaseError, ServerDatabase};
pub use models::*;
pub use queries::CreateEventParams;
