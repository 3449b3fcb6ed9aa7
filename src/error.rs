use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;

use crate::presence::store::StoreError;

/// Failures of the presence workflow.
///
/// Everything but `Storage` is a business-rule violation: it leaves stored
/// state untouched and retrying without re-reading the sheet is pointless.
#[derive(Debug, Display)]
pub enum PresenceError {
    #[display(fmt = "{}", _0)]
    NotFound(String),
    #[display(fmt = "{}", _0)]
    InvalidStateTransition(String),
    #[display(fmt = "{}", _0)]
    InvalidOperation(String),
    #[display(fmt = "{}", _0)]
    InvalidRequest(String),
    #[display(fmt = "{}", _0)]
    Forbidden(String),
    #[display(fmt = "storage failure: {}", _0)]
    Storage(StoreError),
}

impl PresenceError {
    pub fn code(&self) -> &'static str {
        match self {
            PresenceError::NotFound(_) => "not_found",
            PresenceError::InvalidStateTransition(_) => "invalid_state_transition",
            PresenceError::InvalidOperation(_) => "invalid_operation",
            PresenceError::InvalidRequest(_) => "invalid_request",
            PresenceError::Forbidden(_) => "forbidden",
            PresenceError::Storage(_) => "internal_error",
        }
    }
}

impl std::error::Error for PresenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PresenceError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for PresenceError {
    fn from(e: StoreError) -> Self {
        PresenceError::Storage(e)
    }
}

impl ResponseError for PresenceError {
    fn status_code(&self) -> StatusCode {
        match self {
            PresenceError::NotFound(_) => StatusCode::NOT_FOUND,
            PresenceError::InvalidStateTransition(_) => StatusCode::CONFLICT,
            PresenceError::InvalidOperation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PresenceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            PresenceError::Forbidden(_) => StatusCode::FORBIDDEN,
            PresenceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            PresenceError::Storage(e) => {
                tracing::error!(error = %e, "Presence storage failure");
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "code": self.code(),
            "message": message,
        }))
    }
}
