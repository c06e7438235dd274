pub use rollcall_core::db::DatabaseError;

rollcall_core::define_database!(QueueDatabase, "Queue database migrations complete");
