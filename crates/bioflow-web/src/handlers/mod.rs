//! Request handlers and the shared error responder. Grounded on
//! `ferrumdeck::gateway::handlers::ApiError`'s `{status, code, message}`
//! shape and its `IntoResponse`/`From<sqlx::Error>` impls, narrowed to the
//! error kinds this API actually produces.

pub mod health;
pub mod runs;
pub mod workflows;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bioflow_core::EngineError;
use bioflow_store::StoreError;
use serde_json::json;

pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND",
            message: format!("{entity} `{id}` not found"),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST",
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            code: "CONFLICT",
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::RunNotFound(id) => Self::not_found("run", &id),
            StoreError::WorkflowNotFound { name, version } => {
                Self::not_found("workflow", &format!("{name}/{version}"))
            }
            StoreError::Database(err) => {
                tracing::error!(error = %err, "database error");
                Self::internal("database error")
            }
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::InvalidWorkflow(err) => Self::bad_request(err.to_string()),
            EngineError::RunNotFound(id) => Self::not_found("run", &id),
            EngineError::Store(err) => err.into(),
            other => {
                tracing::error!(error = %other, "engine error");
                Self::internal(other.to_string())
            }
        }
    }
}
