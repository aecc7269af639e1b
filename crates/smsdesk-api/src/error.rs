use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use smsdesk_core::CoreError;
use smsdesk_types::api::SmsResponse;

/// A failed request: status code plus an `SmsResponse` failure body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match err {
            CoreError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            CoreError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(SmsResponse::<()>::failure(self.message))).into_response()
    }
}
