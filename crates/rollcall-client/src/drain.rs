//! Single-flight queue drainer.
//!
//! A drain claims the owner's pending items, submits them as one batch and
//! writes each returned outcome back. At most one drain runs per drainer;
//! a second request while one is in flight returns immediately.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{info, instrument, warn};

use rollcall_core::wire::{SyncResult, SyncStatus};

use crate::queue::{DatabaseError, QueueDatabase, QueueItem, QueueStatus};
use crate::transport::{SyncTransport, TransportError};

#[derive(Debug, Error)]
pub enum DrainError {
    #[error("Queue storage error: {0}")]
    Storage(#[from] DatabaseError),

    /// The batch never reached a verdict; its items are pending again.
    #[error("Sync failed, actions kept for retry: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainReport {
    /// Another drain was already running.
    AlreadyRunning,
    /// Nothing was pending.
    Empty,
    Completed {
        verified: usize,
        rejected: usize,
        /// Items the server did not answer for, back in `PENDING`.
        returned: usize,
    },
}

pub struct QueueDrainer<T> {
    db: QueueDatabase,
    transport: T,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when the drain ends, however it ends.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T: SyncTransport> QueueDrainer<T> {
    pub const fn new(db: QueueDatabase, transport: T) -> Self {
        Self {
            db,
            transport,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_draining(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    #[instrument(skip(self))]
    pub async fn drain(&self, owner_id: &str) -> Result<DrainReport, DrainError> {
        let Some(_guard) = FlightGuard::acquire(&self.in_flight) else {
            return Ok(DrainReport::AlreadyRunning);
        };

        let claimed = self.db.claim_pending(owner_id).await?;
        if claimed.is_empty() {
            return Ok(DrainReport::Empty);
        }
        let local_ids: Vec<String> = claimed.iter().map(|i| i.local_id.clone()).collect();

        let batch = match claimed
            .iter()
            .map(QueueItem::to_sync_item)
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(batch) => batch,
            Err(e) => {
                self.db.return_to_pending(&local_ids).await?;
                return Err(e.into());
            }
        };

        let results = match self.transport.submit(owner_id, &batch).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, count = batch.len(), "Sync submission failed");
                self.db.return_to_pending(&local_ids).await?;
                return Err(e.into());
            }
        };

        let report = self.apply(&local_ids, results).await?;
        info!(?report, "Queue drained");
        Ok(report)
    }

    async fn apply(
        &self,
        local_ids: &[String],
        results: Vec<SyncResult>,
    ) -> Result<DrainReport, DrainError> {
        let mut by_id: HashMap<String, SyncResult> = results
            .into_iter()
            .map(|r| (r.correlation_id.clone(), r))
            .collect();

        let (mut verified, mut rejected) = (0, 0);
        let mut unanswered = Vec::new();
        for local_id in local_ids {
            let Some(result) = by_id.remove(local_id) else {
                unanswered.push(local_id.clone());
                continue;
            };
            let status = match result.status {
                SyncStatus::Verified => {
                    verified += 1;
                    QueueStatus::Verified
                }
                SyncStatus::Rejected => {
                    rejected += 1;
                    QueueStatus::Rejected
                }
            };
            self.db.finish(local_id, status, &result.message).await?;
        }

        if !unanswered.is_empty() {
            warn!(count = unanswered.len(), "Server did not answer for some items");
        }
        let returned = usize::try_from(self.db.return_to_pending(&unanswered).await?)
            .unwrap_or(unanswered.len());

        Ok(DrainReport::Completed {
            verified,
            rejected,
            returned,
        })
    }
}
