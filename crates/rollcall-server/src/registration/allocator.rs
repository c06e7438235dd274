//! Capacity-aware registration allocator.
//!
//! Every transition runs in one transaction that first locks the event row
//! (see [`tx::lock_event`]). Slots are only ever taken through the
//! conditional decrement in [`tx::try_take_slot`], so at most `capacity`
//! registrations are confirmed by allocation no matter how offline syncs
//! interleave; the overflow lands in `conflict_pending` for the host.

use sqlx::SqliteConnection;
use tracing::{info, instrument};

use rollcall_core::db::unix_timestamp;
use rollcall_core::wire::ResolveAction;

use crate::storage::tx;
use crate::storage::{DatabaseError, Event, Registration, RegistrationStatus, ServerDatabase};

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("Registration not found: {0}")]
    RegistrationNotFound(String),

    #[error("Only the event host may do this")]
    NotHost,

    #[error("Already registered ({})", .0.status)]
    AlreadyRegistered(Box<Registration>),

    #[error("Not registered for this event")]
    NotRegistered,

    #[error("Cannot {action} a registration that is {from}")]
    InvalidTransition {
        from: RegistrationStatus,
        action: &'static str,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
}

/// Owns registration state transitions for all events.
#[derive(Clone)]
pub struct RegistrationAllocator {
    db: ServerDatabase,
}

impl RegistrationAllocator {
    pub const fn new(db: ServerDatabase) -> Self {
        Self { db }
    }

    // =========================================================================
    // Transaction-scoped primitives (shared with the sync processor)
    // =========================================================================

    /// Allocate a fresh registration inside the caller's transaction:
    /// `confirmed` if the event is unlimited or a slot could be taken,
    /// `conflict_pending` otherwise.
    pub async fn allocate_in(
        conn: &mut SqliteConnection,
        event_id: &str,
        student_id: &str,
        now: i64,
    ) -> Result<Registration, AllocationError> {
        let event = lock_and_fetch(conn, event_id, now).await?;

        if let Some(existing) = tx::fetch_registration(conn, event_id, student_id).await? {
            return Err(AllocationError::AlreadyRegistered(Box::new(existing)));
        }

        let status = claim_status(conn, &event).await?;
        let registration = tx::insert_registration(conn, event_id, student_id, status, now).await?;

        info!(
            event_id,
            student_id,
            registration_id = %registration.id,
            status = %status,
            "Registration allocated"
        );
        Ok(registration)
    }

    /// Delete the caller's own registration inside the caller's transaction.
    /// A confirmed registration gives its slot back. Returns the deleted row.
    pub async fn withdraw_in(
        conn: &mut SqliteConnection,
        event_id: &str,
        student_id: &str,
        now: i64,
    ) -> Result<Registration, AllocationError> {
        lock_and_fetch(conn, event_id, now).await?;

        let registration = tx::fetch_registration(conn, event_id, student_id)
            .await?
            .ok_or(AllocationError::NotRegistered)?;

        let status = registration.status()?;
        if status == RegistrationStatus::Rejected {
            return Err(AllocationError::InvalidTransition {
                from: status,
                action: "unregister",
            });
        }
        if status == RegistrationStatus::Confirmed {
            tx::release_slot(conn, event_id).await?;
        }
        tx::delete_registration(conn, &registration.id).await?;

        info!(event_id, student_id, status = %status, "Registration withdrawn");
        Ok(registration)
    }

    // =========================================================================
    // Participant operations
    // =========================================================================

    #[instrument(skip(self))]
    pub async fn register(
        &self,
        event_id: &str,
        student_id: &str,
    ) -> Result<Registration, AllocationError> {
        let mut txn = self.db.begin().await?;
        let registration = Self::allocate_in(&mut txn, event_id, student_id, unix_timestamp()).await?;
        txn.commit().await.map_err(DatabaseError::from)?;
        Ok(registration)
    }

    #[instrument(skip(self))]
    pub async fn unregister(&self, event_id: &str, student_id: &str) -> Result<(), AllocationError> {
        let mut txn = self.db.begin().await?;
        Self::withdraw_in(&mut txn, event_id, student_id, unix_timestamp()).await?;
        txn.commit().await.map_err(DatabaseError::from)?;
        Ok(())
    }

    // =========================================================================
    // Host operations
    // =========================================================================

    /// Settle a `conflict_pending` registration. Confirming does not touch the
    /// slot counter: a pending registration never consumed a slot.
    #[instrument(skip(self))]
    pub async fn resolve_conflict(
        &self,
        host_id: &str,
        event_id: &str,
        registration_id: &str,
        action: ResolveAction,
    ) -> Result<Registration, AllocationError> {
        let now = unix_timestamp();
        let mut txn = self.db.begin().await?;
        let (_, registration) =
            load_for_host(&mut txn, host_id, event_id, registration_id, now).await?;

        let from = registration.status()?;
        if from != RegistrationStatus::ConflictPending {
            return Err(AllocationError::InvalidTransition {
                from,
                action: "resolve",
            });
        }

        let to = match action {
            ResolveAction::Confirm => RegistrationStatus::Confirmed,
            ResolveAction::Waitlist => RegistrationStatus::Waitlisted,
        };
        let updated = tx::set_registration_status(&mut txn, registration_id, to, None, now).await?;
        txn.commit().await.map_err(DatabaseError::from)?;

        info!(event_id, registration_id, status = %to, "Conflict resolved");
        Ok(updated)
    }

    /// Soft-remove a registration. Only a confirmed registration frees a slot.
    /// Kicking an already rejected registration is a conflict, not a no-op.
    #[instrument(skip(self))]
    pub async fn kick(
        &self,
        host_id: &str,
        event_id: &str,
        registration_id: &str,
    ) -> Result<Registration, AllocationError> {
        let now = unix_timestamp();
        let mut txn = self.db.begin().await?;
        let (_, registration) =
            load_for_host(&mut txn, host_id, event_id, registration_id, now).await?;

        let from = registration.status()?;
        if from == RegistrationStatus::Rejected {
            return Err(AllocationError::InvalidTransition {
                from,
                action: "kick",
            });
        }
        if from == RegistrationStatus::Confirmed {
            tx::release_slot(&mut txn, event_id).await?;
        }
        let updated = tx::set_registration_status(
            &mut txn,
            registration_id,
            RegistrationStatus::Rejected,
            Some(now),
            now,
        )
        .await?;
        txn.commit().await.map_err(DatabaseError::from)?;

        info!(event_id, registration_id, previous = %from, "Registration kicked");
        Ok(updated)
    }

    /// Bring a rejected registration back, subject to the same capacity check
    /// as a fresh allocation.
    #[instrument(skip(self))]
    pub async fn readd(
        &self,
        host_id: &str,
        event_id: &str,
        registration_id: &str,
    ) -> Result<Registration, AllocationError> {
        let now = unix_timestamp();
        let mut txn = self.db.begin().await?;
        let (event, registration) =
            load_for_host(&mut txn, host_id, event_id, registration_id, now).await?;

        let from = registration.status()?;
        if from != RegistrationStatus::Rejected {
            return Err(AllocationError::InvalidTransition {
                from,
                action: "re-add",
            });
        }

        let to = claim_status(&mut txn, &event).await?;
        let updated = tx::set_registration_status(&mut txn, registration_id, to, None, now).await?;
        txn.commit().await.map_err(DatabaseError::from)?;

        info!(event_id, registration_id, status = %to, "Registration re-added");
        Ok(updated)
    }
}

async fn lock_and_fetch(
    conn: &mut SqliteConnection,
    event_id: &str,
    now: i64,
) -> Result<Event, AllocationError> {
    if !tx::lock_event(conn, event_id, now).await? {
        return Err(AllocationError::EventNotFound(event_id.to_string()));
    }
    tx::fetch_event(conn, event_id)
        .await?
        .ok_or_else(|| AllocationError::EventNotFound(event_id.to_string()))
}

/// Status a newly admitted registration gets, consuming a slot if one is
/// available.
async fn claim_status(
    conn: &mut SqliteConnection,
    event: &Event,
) -> Result<RegistrationStatus, AllocationError> {
    if !event.is_capacity_limited() || tx::try_take_slot(conn, &event.id).await? {
        Ok(RegistrationStatus::Confirmed)
    } else {
        Ok(RegistrationStatus::ConflictPending)
    }
}

async fn load_for_host(
    conn: &mut SqliteConnection,
    host_id: &str,
    event_id: &str,
    registration_id: &str,
    now: i64,
) -> Result<(Event, Registration), AllocationError> {
    let event = lock_and_fetch(conn, event_id, now).await?;
    if !event.is_hosted_by(host_id) {
        return Err(AllocationError::NotHost);
    }

    let registration = tx::fetch_registration_by_id(conn, registration_id)
        .await?
        .filter(|r| r.event_id == event_id)
        .ok_or_else(|| AllocationError::RegistrationNotFound(registration_id.to_string()))?;

    Ok((event, registration))
}
