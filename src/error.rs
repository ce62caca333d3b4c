use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;

use crate::admin::AdminError;
use crate::folders::{ResolveError, StoreError};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
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
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "resource not found")
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal<E: Display>(error: E) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl From<diesel::result::Error> for AppError {
    fn from(value: diesel::result::Error) -> Self {
        match value {
            diesel::result::Error::NotFound => AppError::not_found(),
            _ => AppError::internal(value),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        let status = match &value {
            StoreError::Transport(_) | StoreError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
            StoreError::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
            StoreError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            StoreError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, value.to_string())
    }
}

impl From<ResolveError> for AppError {
    fn from(value: ResolveError) -> Self {
        let message = value.to_string();
        let AppError { status, .. } = AppError::from(value.source);
        AppError::new(status, message)
    }
}

impl From<AdminError> for AppError {
    fn from(value: AdminError) -> Self {
        match value {
            AdminError::CompanyNotFound(_) => AppError::new(StatusCode::NOT_FOUND, value.to_string()),
            AdminError::EmptyImport => AppError::bad_request(value.to_string()),
            AdminError::Database(err) => AppError::from(err),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(value)
    }
}
