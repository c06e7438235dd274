//! Check-in proof handling.
//!
//! Mints and verifies signed check-in tokens and validates legacy
//! unsigned payloads.

pub mod claims;
pub mod token;

pub use claims::{CheckinClaims, LegacyProof, Proof};
pub use token::{CheckinTokenManager, TokenError};
