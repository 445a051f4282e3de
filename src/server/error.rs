//! Error-to-HTTP response conversion.
//!
//! Wraps [`tf_core::Error`] so route handlers can return
//! `Result<T, AppError>` and bubble failures with `?`. Every error body is
//! `{error, code}` JSON; server-side errors are logged in full and reach the
//! client only as a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
pub struct AppError(tf_core::Error);

impl From<tf_core::Error> for AppError {
    fn from(e: tf_core::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            // Full detail (tool stderr, paths) stays in the log.
            tracing::error!(
                status = %status,
                error = %self.0,
                "Server error in API handler"
            );
        }

        let body = json!({
            "error": self.0.user_message(),
            "code": self.0.code(),
        });

        (status, axum::Json(body)).into_response()
    }
}
