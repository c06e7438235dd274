//! Statements that run on a caller-supplied connection, normally an open
//! transaction or savepoint.
//!
//! Every mutation path starts with [`lock_event`]: it is a write, so `SQLite`
//! takes the database write lock up front and concurrent allocators for the
//! same event queue behind it (honouring the busy timeout) instead of racing
//! from a stale read snapshot.

use sha2::{Digest, Sha256};
use sqlx::SqliteConnection;

use super::db::DatabaseError;
use super::models::{AttendanceStatus, Event, Registration, RegistrationStatus};

/// Touch the event row. Returns `false` when the event does not exist.
pub async fn lock_event(
    conn: &mut SqliteConnection,
    event_id: &str,
    now: i64,
) -> Result<bool, DatabaseError> {
    let result = sqlx::query("UPDATE events SET updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(event_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn fetch_event(
    conn: &mut SqliteConnection,
    event_id: &str,
) -> Result<Option<Event>, DatabaseError> {
    let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = ?")
        .bind(event_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(event)
}

/// Take one slot if any remain. Conditional on `slots_remaining > 0` in the
/// same statement, so two writers can never both claim the last slot.
///
/// Only meaningful for capacity-limited events; callers check
/// [`Event::is_capacity_limited`] first.
pub async fn try_take_slot(
    conn: &mut SqliteConnection,
    event_id: &str,
) -> Result<bool, DatabaseError> {
    let result = sqlx::query(
        "UPDATE events SET slots_remaining = slots_remaining - 1 WHERE id = ? AND slots_remaining > 0",
    )
    .bind(event_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Return one slot, never exceeding capacity. No-op for unlimited events.
pub async fn release_slot(
    conn: &mut SqliteConnection,
    event_id: &str,
) -> Result<bool, DatabaseError> {
    let result = sqlx::query(
        r"
        UPDATE events SET slots_remaining = slots_remaining + 1
        WHERE id = ? AND capacity IS NOT NULL AND slots_remaining < capacity
        ",
    )
    .bind(event_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn fetch_registration(
    conn: &mut SqliteConnection,
    event_id: &str,
    student_id: &str,
) -> Result<Option<Registration>, DatabaseError> {
    let registration = sqlx::query_as::<_, Registration>(
        "SELECT * FROM registrations WHERE event_id = ? AND student_id = ?",
    )
    .bind(event_id)
    .bind(student_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(registration)
}

pub async fn fetch_registration_by_id(
    conn: &mut SqliteConnection,
    registration_id: &str,
) -> Result<Option<Registration>, DatabaseError> {
    let registration = sqlx::query_as::<_, Registration>("SELECT * FROM registrations WHERE id = ?")
        .bind(registration_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(registration)
}

pub async fn insert_registration(
    conn: &mut SqliteConnection,
    event_id: &str,
    student_id: &str,
    status: RegistrationStatus,
    now: i64,
) -> Result<Registration, DatabaseError> {
    let id = uuid::Uuid::new_v4().to_string();

    let registration = sqlx::query_as::<_, Registration>(
        r"
        INSERT INTO registrations (id, event_id, student_id, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING *
        ",
    )
    .bind(&id)
    .bind(event_id)
    .bind(student_id)
    .bind(status.as_str())
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(registration)
}

/// Set a registration's status. `kicked_at` is written as given, so passing
/// `None` clears it.
pub async fn set_registration_status(
    conn: &mut SqliteConnection,
    registration_id: &str,
    status: RegistrationStatus,
    kicked_at: Option<i64>,
    now: i64,
) -> Result<Registration, DatabaseError> {
    sqlx::query_as::<_, Registration>(
        "UPDATE registrations SET status = ?, kicked_at = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(status.as_str())
    .bind(kicked_at)
    .bind(now)
    .bind(registration_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DatabaseError::NotFound(format!("Registration {registration_id}")))
}

pub async fn delete_registration(
    conn: &mut SqliteConnection,
    registration_id: &str,
) -> Result<bool, DatabaseError> {
    let result = sqlx::query("DELETE FROM registrations WHERE id = ?")
        .bind(registration_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Record verified attendance for an (event, student) pair.
///
/// Inserts a verified row, or marks the existing row verified. The first
/// captured payload is kept for audit. Returns `true` when a new row was
/// created.
pub async fn upsert_verified_attendance(
    conn: &mut SqliteConnection,
    event_id: &str,
    student_id: &str,
    payload: &str,
    now: i64,
) -> Result<bool, DatabaseError> {
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT id FROM attendance WHERE event_id = ? AND student_id = ?")
            .bind(event_id)
            .bind(student_id)
            .fetch_optional(&mut *conn)
            .await?;

    sqlx::query(
        r"
        INSERT INTO attendance (id, event_id, student_id, payload, payload_digest, status, verified_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(event_id, student_id) DO UPDATE SET
            status = excluded.status,
            verified_at = COALESCE(attendance.verified_at, excluded.verified_at),
            updated_at = excluded.updated_at
        ",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(event_id)
    .bind(student_id)
    .bind(payload)
    .bind(payload_digest(payload))
    .bind(AttendanceStatus::Verified.as_str())
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(existing.is_none())
}

/// Award every skill linked to the event. Returns the number of new badges;
/// badges the student already holds for this event are skipped.
pub async fn award_event_skills(
    conn: &mut SqliteConnection,
    event_id: &str,
    student_id: &str,
    now: i64,
) -> Result<u64, DatabaseError> {
    let result = sqlx::query(
        r"
        INSERT OR IGNORE INTO user_skills (student_id, skill_id, event_id, awarded_at)
        SELECT ?, skill_id, event_id, ? FROM event_skills WHERE event_id = ?
        ",
    )
    .bind(student_id)
    .bind(now)
    .bind(event_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// SHA-256 hex digest of a captured payload, stored alongside it for audit.
pub fn payload_digest(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}
