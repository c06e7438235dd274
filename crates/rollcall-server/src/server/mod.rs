//! HTTP surface for the Rollcall server.

mod checkin;
mod error;
mod health;
mod identity;
mod registration;
mod sync;

#[cfg(test)]
mod test_helpers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use rollcall_core::config::CheckinConfig;

use crate::auth::CheckinTokenManager;
use crate::registration::RegistrationAllocator;
use crate::storage::ServerDatabase;
use crate::sync::SyncProcessor;

pub use error::ApiError;
pub use identity::{Caller, USER_ID_HEADER};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: ServerDatabase,
    pub tokens: Arc<CheckinTokenManager>,
    pub allocator: RegistrationAllocator,
    pub sync: SyncProcessor,
}

impl AppState {
    pub fn new(db: ServerDatabase, tokens: Arc<CheckinTokenManager>, policy: CheckinConfig) -> Self {
        Self {
            allocator: RegistrationAllocator::new(db.clone()),
            sync: SyncProcessor::new(db.clone(), Arc::clone(&tokens), policy),
            db,
            tokens,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/events/{event_id}/checkin-token",
            post(checkin::issue_checkin_token),
        )
        .route("/sync/attendance", post(sync::sync_attendance))
        .route(
            "/events/{event_id}/registration",
            post(registration::register).delete(registration::unregister),
        )
        .route(
            "/events/{event_id}/registrations/{registration_id}/resolve",
            post(registration::resolve),
        )
        .route(
            "/events/{event_id}/registrations/{registration_id}/kick",
            post(registration::kick),
        )
        .route(
            "/events/{event_id}/registrations/{registration_id}/readd",
            post(registration::readd),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
