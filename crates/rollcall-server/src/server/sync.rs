use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde_json::Value;
use tracing::warn;

use rollcall_core::wire::{SyncItem, SyncResult};

use super::{ApiError, AppState, Caller};

/// `POST /sync/attendance`: reconcile a batch of captured actions.
///
/// The body must be a JSON array. Elements that do not decode as sync items
/// are rejected individually; the rest go to the processor. Results keep the
/// input order.
pub async fn sync_attendance(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<Vec<Value>>, JsonRejection>,
) -> Result<Json<Vec<SyncResult>>, ApiError> {
    let Json(raw) = body?;

    let mut slots: Vec<Option<SyncResult>> = Vec::with_capacity(raw.len());
    let mut items = Vec::with_capacity(raw.len());
    for value in raw {
        let correlation_id = value
            .get("correlation_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match serde_json::from_value::<SyncItem>(value) {
            Ok(item) => {
                slots.push(None);
                items.push(item);
            }
            Err(e) => slots.push(Some(SyncResult::rejected(
                correlation_id,
                format!("Malformed sync item: {e}"),
            ))),
        }
    }

    let processed = state
        .sync
        .process_batch(caller.user_id(), &items)
        .await
        .map_err(|e| {
            warn!(error = %e, "Sync batch not applied");
            ApiError::Unavailable("Sync temporarily unavailable, retry later".into())
        })?;

    let mut processed = processed.into_iter();
    let results = slots
        .into_iter()
        .filter_map(|slot| slot.or_else(|| processed.next()))
        .collect();
    Ok(Json(results))
}
