//! Registration state machine per (event, student) pair.

mod allocator;


pub use allocator::{AllocationError, RegistrationAllocator};
