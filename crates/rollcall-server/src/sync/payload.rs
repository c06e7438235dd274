//! Captured payload parsing.

use serde::Deserialize;

use crate::auth::LegacyProof;

/// What a device captured when scanning a check-in code.
///
/// Either a signed token wrapped in `{"token": "..."}`, or the legacy
/// `{event_id, host_secret, timestamp}` triple. Anything else is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CapturedPayload {
    Signed { token: String },
    Legacy(LegacyProof),
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("Payload is empty")]
    Empty,

    #[error("Payload is not a recognised check-in code")]
    Unrecognised,
}

impl CapturedPayload {
    pub fn parse(raw: &str) -> Result<Self, PayloadError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PayloadError::Empty);
        }
        serde_json::from_str(raw).map_err(|_| PayloadError::Unrecognised)
    }
}
