use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use rollcall_core::wire::{RegistrationResponse, ResolveConflictRequest};

use super::{ApiError, AppState, Caller};
use crate::storage::Registration;

fn respond(registration: &Registration) -> Result<Json<RegistrationResponse>, ApiError> {
    Ok(Json(RegistrationResponse {
        id: registration.id.clone(),
        status: registration.status()?,
    }))
}

/// `POST /events/{event_id}/registration`
pub async fn register(
    State(state): State<AppState>,
    caller: Caller,
    Path(event_id): Path<String>,
) -> Result<Json<RegistrationResponse>, ApiError> {
    let registration = state
        .allocator
        .register(&event_id, caller.user_id())
        .await?;
    respond(&registration)
}

/// `DELETE /events/{event_id}/registration`
pub async fn unregister(
    State(state): State<AppState>,
    caller: Caller,
    Path(event_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .allocator
        .unregister(&event_id, caller.user_id())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /events/{event_id}/registrations/{registration_id}/resolve`
pub async fn resolve(
    State(state): State<AppState>,
    caller: Caller,
    Path((event_id, registration_id)): Path<(String, String)>,
    body: Result<Json<ResolveConflictRequest>, JsonRejection>,
) -> Result<Json<RegistrationResponse>, ApiError> {
    let Json(request) = body?;
    let registration = state
        .allocator
        .resolve_conflict(caller.user_id(), &event_id, &registration_id, request.action)
        .await?;
    respond(&registration)
}

/// `POST /events/{event_id}/registrations/{registration_id}/kick`
pub async fn kick(
    State(state): State<AppState>,
    caller: Caller,
    Path((event_id, registration_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .allocator
        .kick(caller.user_id(), &event_id, &registration_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /events/{event_id}/registrations/{registration_id}/readd`
pub async fn readd(
    State(state): State<AppState>,
    caller: Caller,
    Path((event_id, registration_id)): Path<(String, String)>,
) -> Result<Json<RegistrationResponse>, ApiError> {
    let registration = state
        .allocator
        .readd(caller.user_id(), &event_id, &registration_id)
        .await?;
    respond(&registration)
}
