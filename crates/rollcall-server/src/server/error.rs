//! Mapping from domain errors to HTTP responses.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use rollcall_core::wire::ErrorBody;

use crate::auth::TokenError;
use crate::registration::AllocationError;
use crate::storage::DatabaseError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing caller identity")]
    Unauthenticated,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            error!(detail = %detail, "Request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<AllocationError> for ApiError {
    fn from(e: AllocationError) -> Self {
        match e {
            AllocationError::EventNotFound(_)
            | AllocationError::RegistrationNotFound(_)
            | AllocationError::NotRegistered => Self::NotFound(e.to_string()),
            AllocationError::NotHost => Self::Forbidden(e.to_string()),
            AllocationError::AlreadyRegistered(_) | AllocationError::InvalidTransition { .. } => {
                Self::Conflict(e.to_string())
            }
            AllocationError::Storage(db) => db.into(),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RegistrationStatus;

    #[test]
    fn allocation_errors_map_to_status_codes() {
        let cases = [
            (AllocationError::EventNotFound("e".into()), StatusCode::NOT_FOUND),
            (AllocationError::NotRegistered, StatusCode::NOT_FOUND),
            (AllocationError::NotHost, StatusCode::FORBIDDEN),
            (
                AllocationError::InvalidTransition {
                    from: RegistrationStatus::Rejected,
                    action: "kick",
                },
                StatusCode::CONFLICT,
            ),
            (
                AllocationError::Storage(DatabaseError::Query("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn internal_detail_is_not_exposed() {
        let err = ApiError::from(DatabaseError::Query("secret detail".into()));
        assert_eq!(err.to_string(), "Internal server error");
    }
}
