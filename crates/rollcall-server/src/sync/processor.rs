//! Batch reconciliation of actions captured while a device was offline.
//!
//! A batch runs in one transaction and each record in its own savepoint, so
//! one bad record rolls back alone while the others commit. Results come
//! back in input order, one per item.

use std::sync::Arc;

use sqlx::{Sqlite, SqliteConnection, Transaction};
use subtle::ConstantTimeEq;
use tracing::{debug, info, instrument, warn};

use rollcall_core::config::CheckinConfig;
use rollcall_core::db::unix_timestamp;
use rollcall_core::wire::{ActionKind, SyncItem, SyncResult};

use super::payload::{CapturedPayload, PayloadError};
use crate::auth::token::check_legacy_freshness;
use crate::auth::{CheckinTokenManager, Proof, TokenError};
use crate::registration::{AllocationError, RegistrationAllocator};
use crate::storage::{DatabaseError, ServerDatabase, tx};

/// Why a single record was rejected. The `Display` text is what the client
/// sees.
#[derive(Debug, thiserror::Error)]
enum RecordError {
    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Legacy check-in codes are not accepted")]
    LegacyDisabled,

    #[error("Check-in code belongs to a different event")]
    EventMismatch,

    #[error("Event not found")]
    UnknownEvent,

    #[error("Check-in code is no longer valid for this event")]
    SecretMismatch,

    #[error(transparent)]
    Registration(AllocationError),

    #[error("Server could not record this action, retry later")]
    Storage(#[from] DatabaseError),
}

impl From<AllocationError> for RecordError {
    fn from(e: AllocationError) -> Self {
        match e {
            AllocationError::Storage(db) => Self::Storage(db),
            AllocationError::EventNotFound(_) => Self::UnknownEvent,
            other => Self::Registration(other),
        }
    }
}

/// A record that passed every check needing no database access.
enum Prepared {
    CheckIn(Proof),
    Register,
    Unregister,
}

/// Applies synced batches for one student at a time.
#[derive(Clone)]
pub struct SyncProcessor {
    db: ServerDatabase,
    tokens: Arc<CheckinTokenManager>,
    policy: CheckinConfig,
    clock: fn() -> i64,
}

impl SyncProcessor {
    pub fn new(db: ServerDatabase, tokens: Arc<CheckinTokenManager>, policy: CheckinConfig) -> Self {
        Self {
            db,
            tokens,
            policy,
            clock: unix_timestamp,
        }
    }

    /// Replace the wall clock used for legacy freshness and row timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    /// Process a batch on behalf of `student_id`.
    ///
    /// Per-record failures come back as rejected results. An error is
    /// returned only when the batch transaction itself cannot be opened or
    /// committed; nothing was applied then and the whole batch may be resent.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub async fn process_batch(
        &self,
        student_id: &str,
        items: &[SyncItem],
    ) -> Result<Vec<SyncResult>, DatabaseError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let now = (self.clock)();

        let mut txn = self.db.begin().await?;

        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let result = match self.process_item(&mut txn, student_id, item, now).await {
                Ok(message) => SyncResult::verified(&item.correlation_id, message),
                Err(e) => {
                    if let RecordError::Storage(db) = &e {
                        warn!(
                            correlation_id = %item.correlation_id,
                            error = %db,
                            "Sync record hit a storage error"
                        );
                    } else {
                        debug!(
                            correlation_id = %item.correlation_id,
                            reason = %e,
                            "Sync record rejected"
                        );
                    }
                    SyncResult::rejected(&item.correlation_id, e.to_string())
                }
            };
            results.push(result);
        }

        txn.commit().await.map_err(|e| {
            warn!(error = %e, "Failed to commit sync batch");
            DatabaseError::from(e)
        })?;

        let verified = results.iter().filter(|r| r.is_verified()).count();
        info!(
            verified,
            rejected = results.len() - verified,
            "Sync batch processed"
        );
        Ok(results)
    }

    async fn process_item(
        &self,
        txn: &mut Transaction<'static, Sqlite>,
        student_id: &str,
        item: &SyncItem,
        now: i64,
    ) -> Result<String, RecordError> {
        let prepared = self.prepare(item, now)?;

        let mut savepoint = sqlx::Connection::begin(&mut **txn)
            .await
            .map_err(DatabaseError::from)?;

        let outcome = match prepared {
            Prepared::CheckIn(proof) => {
                check_in(&mut savepoint, student_id, item, &proof, now).await
            }
            Prepared::Register => register(&mut savepoint, student_id, &item.event_id, now).await,
            Prepared::Unregister => {
                unregister(&mut savepoint, student_id, &item.event_id, now).await
            }
        };

        match outcome {
            Ok(message) => {
                savepoint.commit().await.map_err(DatabaseError::from)?;
                Ok(message)
            }
            Err(e) => {
                if let Err(rollback) = savepoint.rollback().await {
                    warn!(error = %rollback, "Failed to roll back sync record");
                }
                Err(e)
            }
        }
    }

    fn prepare(&self, item: &SyncItem, now: i64) -> Result<Prepared, RecordError> {
        match item.action {
            ActionKind::CheckIn => {
                let proof = self.verify_payload(&item.payload, now)?;
                if proof.event_id() != item.event_id {
                    return Err(RecordError::EventMismatch);
                }
                Ok(Prepared::CheckIn(proof))
            }
            ActionKind::Register => Ok(Prepared::Register),
            ActionKind::Unregister => Ok(Prepared::Unregister),
        }
    }

    fn verify_payload(&self, raw: &str, now: i64) -> Result<Proof, RecordError> {
        match CapturedPayload::parse(raw)? {
            CapturedPayload::Signed { token } => Ok(Proof::Signed(self.tokens.verify(&token)?)),
            CapturedPayload::Legacy(legacy) => {
                if !self.policy.accept_legacy_payloads {
                    return Err(RecordError::LegacyDisabled);
                }
                check_legacy_freshness(&legacy, now, self.policy.legacy_max_age_secs)?;
                Ok(Proof::Legacy(legacy))
            }
        }
    }
}

/// Record attendance, register the student if they have no registration
/// yet, and award the event's skills. An existing registration is left as
/// it is, whatever its status.
async fn check_in(
    conn: &mut SqliteConnection,
    student_id: &str,
    item: &SyncItem,
    proof: &Proof,
    now: i64,
) -> Result<String, RecordError> {
    let event_id = item.event_id.as_str();
    if !tx::lock_event(conn, event_id, now).await? {
        return Err(RecordError::UnknownEvent);
    }
    let event = tx::fetch_event(conn, event_id)
        .await?
        .ok_or(RecordError::UnknownEvent)?;

    if !secrets_match(proof.host_secret(), &event.host_secret) {
        return Err(RecordError::SecretMismatch);
    }

    let first_check_in =
        tx::upsert_verified_attendance(conn, event_id, student_id, &item.payload, now).await?;

    let allocated = match tx::fetch_registration(conn, event_id, student_id).await? {
        Some(_) => None,
        None => Some(RegistrationAllocator::allocate_in(conn, event_id, student_id, now).await?),
    };

    let badges = tx::award_event_skills(conn, event_id, student_id, now).await?;

    debug!(
        event_id,
        student_id,
        scheme = proof.scheme(),
        first_check_in,
        badges,
        "Check-in applied"
    );

    let attendance = if first_check_in {
        "Attendance verified"
    } else {
        "Attendance already verified"
    };
    Ok(match allocated {
        Some(registration) => format!("{attendance}; registered as {}", registration.status),
        None => attendance.to_string(),
    })
}

async fn register(
    conn: &mut SqliteConnection,
    student_id: &str,
    event_id: &str,
    now: i64,
) -> Result<String, RecordError> {
    match RegistrationAllocator::allocate_in(conn, event_id, student_id, now).await {
        Ok(registration) => Ok(format!("Registered as {}", registration.status)),
        Err(AllocationError::AlreadyRegistered(existing)) => {
            Ok(format!("Already registered as {}", existing.status))
        }
        Err(e) => Err(e.into()),
    }
}

async fn unregister(
    conn: &mut SqliteConnection,
    student_id: &str,
    event_id: &str,
    now: i64,
) -> Result<String, RecordError> {
    match RegistrationAllocator::withdraw_in(conn, event_id, student_id, now).await {
        Ok(_) => Ok("Unregistered".to_string()),
        Err(AllocationError::NotRegistered) => Ok("Already unregistered".to_string()),
        Err(e) => Err(e.into()),
    }
}

/// Constant-time secret comparison. Differing lengths never match.
fn secrets_match(presented: &str, stored: &str) -> bool {
    presented.as_bytes().ct_eq(stored.as_bytes()).into()
}

#[cfg(test)]
mod secret_tests {
    use super::secrets_match;

    #[test]
    fn secret_comparison() {
        assert!(secrets_match("abc", "abc"));
        assert!(!secrets_match("abc", "abd"));
        assert!(!secrets_match("abc", "abcd"));
        assert!(!secrets_match("", "x"));
    }
}
