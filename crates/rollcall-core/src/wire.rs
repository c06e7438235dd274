//! JSON bodies exchanged between the offline client and the sync server.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Kind of action captured on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    #[default]
    CheckIn,
    Register,
    Unregister,
}

impl ActionKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CheckIn => "CHECK_IN",
            Self::Register => "REGISTER",
            Self::Unregister => "UNREGISTER",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CHECK_IN" => Ok(Self::CheckIn),
            "REGISTER" => Ok(Self::Register),
            "UNREGISTER" => Ok(Self::Unregister),
            other => Err(Error::UnknownVariant {
                kind: "action kind",
                value: other.to_string(),
            }),
        }
    }
}

/// One captured action submitted in a sync batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncItem {
    /// Client-generated id, echoed back in the matching [`SyncResult`].
    pub correlation_id: String,
    #[serde(default)]
    pub action: ActionKind,
    pub event_id: String,
    /// Captured payload, verbatim. Empty for register/unregister.
    #[serde(default)]
    pub payload: String,
}

/// Per-item outcome of a sync batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Verified,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub correlation_id: String,
    pub status: SyncStatus,
    /// Human-readable; for display only.
    pub message: String,
}

impl SyncResult {
    pub fn verified(correlation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            status: SyncStatus::Verified,
            message: message.into(),
        }
    }

    pub fn rejected(correlation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            status: SyncStatus::Rejected,
            message: message.into(),
        }
    }

    pub fn is_verified(&self) -> bool {
        self.status == SyncStatus::Verified
    }
}

/// Registration lifecycle state for an (event, student) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Confirmed,
    ConflictPending,
    Waitlisted,
    Rejected,
}

impl RegistrationStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::ConflictPending => "conflict_pending",
            Self::Waitlisted => "waitlisted",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(Self::Confirmed),
            "conflict_pending" => Ok(Self::ConflictPending),
            "waitlisted" => Ok(Self::Waitlisted),
            "rejected" => Ok(Self::Rejected),
            other => Err(Error::UnknownVariant {
                kind: "registration status",
                value: other.to_string(),
            }),
        }
    }
}

/// Response to a host's token request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinTokenResponse {
    pub token: String,
    pub scan_expiry_seconds: i64,
}

/// Current state of a registration after a mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub id: String,
    pub status: RegistrationStatus,
}

/// Host's verdict on a `conflict_pending` registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveAction {
    Confirm,
    Waitlist,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConflictRequest {
    pub action: ResolveAction,
}

/// JSON error body returned with every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
