use serde::Serialize;
use warp::http::StatusCode;
use warp::reply::{Reply, Response};

use crate::error::{AiCreateError, StoreError};

pub const INTERPRET_FAILED: &str = "Failed to interpret request";
pub const INTERNAL_ERROR: &str = "Internal server error";

/// Failure body shared by every route: `{ "success": false, "error": "<message>" }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody<'a> {
    success: bool,
    error: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Reply for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            success: false,
            error: &self.message,
        };
        warp::reply::with_status(warp::reply::json(&body), self.status).into_response()
    }
}

impl From<AiCreateError> for ApiError {
    fn from(err: AiCreateError) -> Self {
        match err {
            AiCreateError::Validation(message) => Self::bad_request(message),
            AiCreateError::Provider(_) | AiCreateError::Interpretation(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERPRET_FAILED)
            }
            AiCreateError::Store(err) => err.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::not_found("Event not found"),
            other => {
                log::error!("event=store_failed error=\"{}\"", other);
                Self::internal()
            }
        }
    }
}
