//! Queue row types.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use rollcall_core::wire::{ActionKind, SyncItem};

use super::db::DatabaseError;

/// A captured action awaiting, or done with, synchronisation.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct QueueItem {
    pub seq: i64,
    /// Sent to the server as the correlation id.
    pub local_id: String,
    pub owner_id: String,
    pub action: String,
    pub event_id: String,
    pub payload: String,
    pub status: String,
    /// Server message for a finished item.
    pub reason: Option<String>,
    pub queued_at: i64,
    pub updated_at: i64,
}

impl QueueItem {
    pub fn action_kind(&self) -> Result<ActionKind, DatabaseError> {
        self.action
            .parse()
            .map_err(|e: rollcall_core::Error| DatabaseError::Query(e.to_string()))
    }

    pub fn queue_status(&self) -> Result<QueueStatus, DatabaseError> {
        self.status.parse()
    }

    pub fn to_sync_item(&self) -> Result<SyncItem, DatabaseError> {
        Ok(SyncItem {
            correlation_id: self.local_id.clone(),
            action: self.action_kind()?,
            event_id: self.event_id.clone(),
            payload: self.payload.clone(),
        })
    }
}

/// Result of an enqueue: the stored item, and whether it was newly created
/// or an unsynced duplicate already present.
#[derive(Debug, Clone)]
pub struct Enqueued {
    pub item: QueueItem,
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Pending,
    Syncing,
    Verified,
    Rejected,
}

impl QueueStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Syncing => "SYNCING",
            Self::Verified => "VERIFIED",
            Self::Rejected => "REJECTED",
        }
    }

    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Verified | Self::Rejected)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SYNCING" => Ok(Self::Syncing),
            "VERIFIED" => Ok(Self::Verified),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(DatabaseError::Query(format!("Unknown queue status: {other}"))),
        }
    }
}
