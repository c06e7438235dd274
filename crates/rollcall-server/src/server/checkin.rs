use axum::Json;
use axum::extract::{Path, State};
use tracing::info;

use rollcall_core::wire::CheckinTokenResponse;

use super::{ApiError, AppState, Caller};

/// `POST /events/{event_id}/checkin-token`: mint a token for the event's
/// current secret. Host only.
pub async fn issue_checkin_token(
    State(state): State<AppState>,
    caller: Caller,
    Path(event_id): Path<String>,
) -> Result<Json<CheckinTokenResponse>, ApiError> {
    let event = state.db.get_event(&event_id).await?;
    if !event.is_hosted_by(caller.user_id()) {
        return Err(ApiError::Forbidden(
            "Only the event host can issue check-in tokens".into(),
        ));
    }

    let (token, scan_expiry_seconds) = state.tokens.issue(&event.id, &event.host_secret)?;
    info!(event_id = %event.id, host_id = %caller.user_id(), "Check-in token issued");

    Ok(Json(CheckinTokenResponse {
        token,
        scan_expiry_seconds,
    }))
}
