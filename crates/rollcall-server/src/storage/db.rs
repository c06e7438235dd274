//! Database connection and initialization.

pub use rollcall_core::db::DatabaseError;

rollcall_core::define_database!(ServerDatabase, "Server database migrations complete");
