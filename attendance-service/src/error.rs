use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use eventhub_shared::error::{AttendanceError, StoreError};
use log::error;
use thiserror::Error;

/// HTTP-facing error. Rendered as `{"error": message, "retryable": bool}`.
#[derive(Error, Debug)]
#[error("{status}: {message}")]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub retryable: bool,
}

impl AppError {
    fn new(status: StatusCode, message: String) -> Self {
        Self {
            status,
            message,
            retryable: false,
        }
    }

    pub fn bad_request(message: String) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: String) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: String) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: String) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal_server_error(message: String) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn service_unavailable(message: String) -> Self {
        Self {
            retryable: true,
            ..Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request failed with {}: {}", self.status, self.message);
        }
        let body = Json(serde_json::json!({
            "error": self.message,
            "retryable": self.retryable,
        }));
        (self.status, body).into_response()
    }
}

impl From<AttendanceError> for AppError {
    fn from(err: AttendanceError) -> Self {
        let notice = err.notice().to_string();
        match err {
            AttendanceError::NotAuthenticated => AppError::unauthorized(notice),
            AttendanceError::NotFound(_) => AppError::not_found(notice),
            AttendanceError::WriteFailed(detail) => {
                error!("Store request failed: {}", detail);
                AppError::service_unavailable(notice)
            }
            AttendanceError::InvalidRating(detail) => {
                AppError::bad_request(format!("{} ({})", notice, detail))
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => AppError::not_found(msg),
            StoreError::InvalidPath(msg) => AppError::bad_request(msg),
            StoreError::Dynamo(msg) => AppError::service_unavailable(msg),
            StoreError::Serialization(msg) => AppError::internal_server_error(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attendance_errors_map_to_statuses() {
        let cases = [
            (AttendanceError::NotAuthenticated, StatusCode::UNAUTHORIZED, false),
            (AttendanceError::NotFound("e".into()), StatusCode::NOT_FOUND, false),
            (
                AttendanceError::WriteFailed("timeout".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                true,
            ),
            (
                AttendanceError::InvalidRating("7".into()),
                StatusCode::BAD_REQUEST,
                false,
            ),
        ];

        for (err, status, retryable) in cases {
            let app_err = AppError::from(err);
            assert_eq!(app_err.status, status);
            assert_eq!(app_err.retryable, retryable);
        }
    }
}
