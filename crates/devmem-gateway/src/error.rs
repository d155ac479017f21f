use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use devmem_core::DevmemError;
use tracing::error;

/// An error rendered as `{"error": "..."}` with a matching status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// 400 with the given message.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// 404 with the given message.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    /// 500 with a fixed public message; `cause` is only logged.
    pub fn internal(message: impl Into<String>, cause: &DevmemError) -> Self {
        let message = message.into();
        error!(error = %cause, "{message}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }

    /// Status code this error responds with.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<DevmemError> for ApiError {
    fn from(e: DevmemError) -> Self {
        match e {
            DevmemError::NotFound(what) => Self::not_found(format!("{what} not found")),
            other => Self::internal("storage error", &other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

/// Handler result alias.
pub type ApiResult<T> = Result<T, ApiError>;
