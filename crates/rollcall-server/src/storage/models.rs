//! Data models for Rollcall server storage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use rollcall_core::wire::RegistrationStatus;

use super::db::DatabaseError;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: String,
    pub host_id: String,
    pub title: String,
    pub starts_at: i64,
    pub ends_at: i64,
    /// `None` means unlimited.
    pub capacity: Option<i64>,
    pub slots_remaining: Option<i64>,
    pub status: String,
    #[serde(skip_serializing)]
    pub host_secret: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Event {
    pub fn is_hosted_by(&self, user_id: &str) -> bool {
        self.host_id == user_id
    }

    pub const fn is_capacity_limited(&self) -> bool {
        self.capacity.is_some()
    }

    pub fn lifecycle(&self) -> Result<EventStatus, DatabaseError> {
        self.status.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Registration {
    pub id: String,
    pub event_id: String,
    pub student_id: String,
    pub status: String,
    pub kicked_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Registration {
    /// Parsed status. The schema CHECK constraint keeps this infallible in
    /// practice; a bad value surfaces as a query error.
    pub fn status(&self) -> Result<RegistrationStatus, DatabaseError> {
        self.status
            .parse()
            .map_err(|e: rollcall_core::Error| DatabaseError::Query(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attendance {
    pub id: String,
    pub event_id: String,
    pub student_id: String,
    pub payload: String,
    pub payload_digest: String,
    pub status: String,
    pub verified_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Attendance {
    pub fn status(&self) -> Result<AttendanceStatus, DatabaseError> {
        self.status.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Skill {
    pub id: String,
    pub name: String,
}

/// A skill awarded to a student for attending an event.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BadgeAward {
    pub student_id: String,
    pub skill_id: String,
    pub event_id: String,
    pub awarded_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Upcoming,
    Active,
    Completed,
}

impl EventStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(Self::Upcoming),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            other => Err(DatabaseError::Query(format!("Unknown event status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Pending,
    Verified,
    Rejected,
}

impl AttendanceStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "verified" => Ok(Self::Verified),
            "rejected" => Ok(Self::Rejected),
            other => Err(DatabaseError::Query(format!(
                "Unknown attendance status: {other}"
            ))),
        }
    }
}
