//! Pool-level queries for the Rollcall server.
//!
//! Event provisioning and skill catalogue stand in for the CRUD layer that
//! owns them in a full deployment; the remaining lookups back handlers and
//! tests.

use rollcall_core::db::unix_timestamp;

use super::db::{DatabaseError, ServerDatabase};
use super::models::{Attendance, BadgeAward, Event, EventStatus, Registration, Skill};

/// Parameters for provisioning an event.
pub struct CreateEventParams<'a> {
    pub id: &'a str,
    pub host_id: &'a str,
    pub title: &'a str,
    pub starts_at: i64,
    pub ends_at: i64,
    pub capacity: Option<i64>,
    pub host_secret: &'a str,
}

impl ServerDatabase {
    // =========================================================================
    // Event queries
    // =========================================================================

    /// Create an event; `slots_remaining` starts equal to `capacity`.
    pub async fn create_event(&self, params: &CreateEventParams<'_>) -> Result<Event, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            r"
            INSERT INTO events (id, host_id, title, starts_at, ends_at, capacity, slots_remaining, host_secret, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(params.id)
        .bind(params.host_id)
        .bind(params.title)
        .bind(params.starts_at)
        .bind(params.ends_at)
        .bind(params.capacity)
        .bind(params.capacity)
        .bind(params.host_secret)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_event(params.id).await
    }

    /// Get an event by ID.
    pub async fn get_event(&self, id: &str) -> Result<Event, DatabaseError> {
        sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Event {id}")))
    }

    /// Move an event through its lifecycle.
    pub async fn update_event_status(
        &self,
        id: &str,
        status: EventStatus,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE events SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(unix_timestamp())
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Event {id}")));
        }
        Ok(())
    }

    /// Replace the event's shared secret. Tokens minted under the old secret
    /// stop verifying.
    pub async fn rotate_event_secret(&self, id: &str, secret: &str) -> Result<(), DatabaseError> {
        let result =
            sqlx::query("UPDATE events SET host_secret = ?, updated_at = ? WHERE id = ?")
                .bind(secret)
                .bind(unix_timestamp())
                .bind(id)
                .execute(self.pool())
                .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Event {id}")));
        }
        Ok(())
    }

    // =========================================================================
    // Skill queries
    // =========================================================================

    /// Create a skill, or return the existing one with the same name.
    pub async fn ensure_skill(&self, id: &str, name: &str) -> Result<Skill, DatabaseError> {
        sqlx::query("INSERT INTO skills (id, name) VALUES (?, ?) ON CONFLICT(name) DO NOTHING")
            .bind(id)
            .bind(name)
            .execute(self.pool())
            .await?;

        sqlx::query_as::<_, Skill>("SELECT * FROM skills WHERE name = ?")
            .bind(name)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Skill {name}")))
    }

    /// Attach a skill to an event so attendance awards it.
    pub async fn link_event_skill(
        &self,
        event_id: &str,
        skill_id: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query("INSERT OR IGNORE INTO event_skills (event_id, skill_id) VALUES (?, ?)")
            .bind(event_id)
            .bind(skill_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Badges a student holds, oldest first.
    pub async fn list_badges(&self, student_id: &str) -> Result<Vec<BadgeAward>, DatabaseError> {
        let badges = sqlx::query_as::<_, BadgeAward>(
            "SELECT * FROM user_skills WHERE student_id = ? ORDER BY awarded_at ASC, skill_id ASC",
        )
        .bind(student_id)
        .fetch_all(self.pool())
        .await?;

        Ok(badges)
    }

    // =========================================================================
    // Registration and attendance lookups
    // =========================================================================

    /// Get a registration by ID.
    pub async fn get_registration(&self, id: &str) -> Result<Registration, DatabaseError> {
        sqlx::query_as::<_, Registration>("SELECT * FROM registrations WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Registration {id}")))
    }

    /// Get the registration for an (event, student) pair, if any.
    pub async fn get_registration_for(
        &self,
        event_id: &str,
        student_id: &str,
    ) -> Result<Option<Registration>, DatabaseError> {
        let registration = sqlx::query_as::<_, Registration>(
            "SELECT * FROM registrations WHERE event_id = ? AND student_id = ?",
        )
        .bind(event_id)
        .bind(student_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(registration)
    }

    /// Count registrations for an event in a given status.
    pub async fn count_registrations(
        &self,
        event_id: &str,
        status: &str,
    ) -> Result<i64, DatabaseError> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM registrations WHERE event_id = ? AND status = ?")
                .bind(event_id)
                .bind(status)
                .fetch_one(self.pool())
                .await?;

        Ok(row.0)
    }

    /// Get the attendance row for an (event, student) pair, if any.
    pub async fn get_attendance(
        &self,
        event_id: &str,
        student_id: &str,
    ) -> Result<Option<Attendance>, DatabaseError> {
        let attendance = sqlx::query_as::<_, Attendance>(
            "SELECT * FROM attendance WHERE event_id = ? AND student_id = ?",
        )
        .bind(event_id)
        .bind(student_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(attendance)
    }

    /// Count attendance rows for an event.
    pub async fn count_attendance(&self, event_id: &str) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM attendance WHERE event_id = ?")
            .bind(event_id)
            .fetch_one(self.pool())
            .await?;

        Ok(row.0)
    }
}
