//! Queue queries.

use tracing::info;

use rollcall_core::db::unix_timestamp;
use rollcall_core::wire::ActionKind;

use super::db::{DatabaseError, QueueDatabase};
use super::models::{Enqueued, QueueItem, QueueStatus};

impl QueueDatabase {
    // =========================================================================
    // Capture
    // =========================================================================

    /// Append an action for `owner_id`. If the owner already has an unsynced
    /// entry for the same action and event, no new entry is written: a
    /// `PENDING` entry takes the newer payload and keeps its place in line,
    /// a `SYNCING` entry is returned untouched.
    pub async fn enqueue(
        &self,
        owner_id: &str,
        action: ActionKind,
        event_id: &str,
        payload: &str,
    ) -> Result<Enqueued, DatabaseError> {
        let now = unix_timestamp();
        let local_id = uuid::Uuid::new_v4().to_string();

        let inserted = sqlx::query_as::<_, QueueItem>(
            r"
            INSERT INTO queue_items (local_id, owner_id, action, event_id, payload, status, queued_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'PENDING', ?, ?)
            ON CONFLICT (owner_id, action, event_id) WHERE status IN ('PENDING', 'SYNCING') DO NOTHING
            RETURNING *
            ",
        )
        .bind(&local_id)
        .bind(owner_id)
        .bind(action.as_str())
        .bind(event_id)
        .bind(payload)
        .bind(now)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        if let Some(item) = inserted {
            return Ok(Enqueued {
                item,
                created: true,
            });
        }

        let refreshed = sqlx::query_as::<_, QueueItem>(
            r"
            UPDATE queue_items SET payload = ?, updated_at = ?
            WHERE owner_id = ? AND action = ? AND event_id = ? AND status = 'PENDING'
            RETURNING *
            ",
        )
        .bind(payload)
        .bind(now)
        .bind(owner_id)
        .bind(action.as_str())
        .bind(event_id)
        .fetch_optional(self.pool())
        .await?;

        if let Some(item) = refreshed {
            return Ok(Enqueued {
                item,
                created: false,
            });
        }

        let existing = sqlx::query_as::<_, QueueItem>(
            r"
            SELECT * FROM queue_items
            WHERE owner_id = ? AND action = ? AND event_id = ? AND status IN ('PENDING', 'SYNCING')
            ",
        )
        .bind(owner_id)
        .bind(action.as_str())
        .bind(event_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Queued {action} for {event_id}")))?;

        Ok(Enqueued {
            item: existing,
            created: false,
        })
    }

    // =========================================================================
    // Draining
    // =========================================================================

    /// Pending items for an owner, oldest capture first.
    pub async fn pending_for_owner(&self, owner_id: &str) -> Result<Vec<QueueItem>, DatabaseError> {
        let items = sqlx::query_as::<_, QueueItem>(
            "SELECT * FROM queue_items WHERE owner_id = ? AND status = 'PENDING' ORDER BY queued_at ASC, seq ASC",
        )
        .bind(owner_id)
        .fetch_all(self.pool())
        .await?;

        Ok(items)
    }

    /// Atomically move an owner's pending items to `SYNCING` and return
    /// them, oldest capture first.
    pub async fn claim_pending(&self, owner_id: &str) -> Result<Vec<QueueItem>, DatabaseError> {
        let mut items = sqlx::query_as::<_, QueueItem>(
            r"
            UPDATE queue_items SET status = 'SYNCING', updated_at = ?
            WHERE owner_id = ? AND status = 'PENDING'
            RETURNING *
            ",
        )
        .bind(unix_timestamp())
        .bind(owner_id)
        .fetch_all(self.pool())
        .await?;

        items.sort_by_key(|item| (item.queued_at, item.seq));
        Ok(items)
    }

    /// Record the server's outcome for an item in flight. Returns `false` if
    /// the item was not `SYNCING`.
    pub async fn finish(
        &self,
        local_id: &str,
        status: QueueStatus,
        reason: &str,
    ) -> Result<bool, DatabaseError> {
        if !status.is_finished() {
            return Err(DatabaseError::Query(format!(
                "{status} is not a finished queue status"
            )));
        }

        let result = sqlx::query(
            "UPDATE queue_items SET status = ?, reason = ?, updated_at = ? WHERE local_id = ? AND status = 'SYNCING'",
        )
        .bind(status.as_str())
        .bind(reason)
        .bind(unix_timestamp())
        .bind(local_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Put in-flight items back to `PENDING` for a later drain.
    pub async fn return_to_pending(&self, local_ids: &[String]) -> Result<u64, DatabaseError> {
        if local_ids.is_empty() {
            return Ok(0);
        }

        let now = unix_timestamp();
        let mut txn = self.begin().await?;
        let mut returned = 0;
        for local_id in local_ids {
            let result = sqlx::query(
                "UPDATE queue_items SET status = 'PENDING', updated_at = ? WHERE local_id = ? AND status = 'SYNCING'",
            )
            .bind(now)
            .bind(local_id)
            .execute(&mut *txn)
            .await?;
            returned += result.rows_affected();
        }
        txn.commit().await?;

        Ok(returned)
    }

    /// Reset items stranded in `SYNCING` by a drain that never finished,
    /// e.g. because the process died mid-request. Only items claimed at
    /// least `stale_after_secs` ago are touched, so a drain still running in
    /// another process keeps its batch.
    pub async fn recover_interrupted(&self, stale_after_secs: i64) -> Result<u64, DatabaseError> {
        let now = unix_timestamp();
        let result = sqlx::query(
            "UPDATE queue_items SET status = 'PENDING', updated_at = ? WHERE status = 'SYNCING' AND updated_at <= ?",
        )
        .bind(now)
        .bind(now.saturating_sub(stale_after_secs))
        .execute(self.pool())
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            info!(recovered, "Returned interrupted queue items to pending");
        }
        Ok(recovered)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub async fn get_item(&self, local_id: &str) -> Result<QueueItem, DatabaseError> {
        sqlx::query_as::<_, QueueItem>("SELECT * FROM queue_items WHERE local_id = ?")
            .bind(local_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Queue item {local_id}")))
    }

    /// An owner's items in capture order. Finished items are included only
    /// when `include_finished` is set.
    pub async fn list_items(
        &self,
        owner_id: &str,
        include_finished: bool,
    ) -> Result<Vec<QueueItem>, DatabaseError> {
        let sql = if include_finished {
            "SELECT * FROM queue_items WHERE owner_id = ? ORDER BY queued_at ASC, seq ASC"
        } else {
            "SELECT * FROM queue_items WHERE owner_id = ? AND status IN ('PENDING', 'SYNCING') ORDER BY queued_at ASC, seq ASC"
        };

        let items = sqlx::query_as::<_, QueueItem>(sql)
            .bind(owner_id)
            .fetch_all(self.pool())
            .await?;

        Ok(items)
    }
}
