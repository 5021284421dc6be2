use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use crate::service::ServiceError;

const LOG_TARGET: &str = "guerra::server::error";

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

/// HTTP face of a refused request: a status plus the stable outcome code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    reason: Option<&'static str>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad-request",
            message: message.into(),
            reason: None,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "invalid-token",
            message: message.into(),
            reason: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "game-not-found",
            message: message.into(),
            reason: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

fn status_for(code: &str) -> StatusCode {
    match code {
        "invalid-token" => StatusCode::UNAUTHORIZED,
        "not-a-participant" => StatusCode::FORBIDDEN,
        "game-not-found" => StatusCode::NOT_FOUND,
        "player-already-in-game" | "double-submission" | "game-already-finished" => {
            StatusCode::CONFLICT
        }
        "deck-invalid" | "card-not-in-hand" | "unknown-card" => StatusCode::UNPROCESSABLE_ENTITY,
        "invalid-slot" => StatusCode::BAD_REQUEST,
        "deck-unavailable" | "identity-unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let code = err.code();
        Self {
            status: status_for(code),
            code,
            message: err.to_string(),
            reason: err.reason(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if self.status == StatusCode::SERVICE_UNAVAILABLE {
                warn!(target: LOG_TARGET, code = self.code, message = %self.message, "collaborator unavailable");
            } else {
                error!(target: LOG_TARGET, code = self.code, message = %self.message, "internal server error");
            }
        }
        let body = ErrorBody {
            code: self.code,
            message: self.message,
            reason: self.reason,
        };
        (self.status, Json(body)).into_response()
    }
}
