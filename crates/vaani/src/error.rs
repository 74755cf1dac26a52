use crate::config::ConfigError;
use crate::pipeline::alerts::directory::DirectoryError;
use crate::pipeline::alerts::domain::ValidationError;
use crate::pipeline::alerts::ingest::IngestError;
use crate::pipeline::alerts::repository::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Io(std::io::Error),
    Server(axum::Error),
    Validation(ValidationError),
    Store(StoreError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Validation(err) => write!(f, "validation error: {}", err),
            AppError::Store(err) => write!(f, "storage error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Validation(err) => Some(err),
            AppError::Store(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            AppError::Store(StoreError::Conflict) => StatusCode::CONFLICT,
            AppError::Store(StoreError::Unavailable(_)) | AppError::Store(StoreError::Timeout(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Config(_) | AppError::Io(_) | AppError::Server(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<ValidationError> for AppError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<DirectoryError> for AppError {
    fn from(value: DirectoryError) -> Self {
        match value {
            DirectoryError::Validation(err) => Self::Validation(err),
            DirectoryError::Store(err) => Self::Store(err),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(value: IngestError) -> Self {
        match value {
            IngestError::Validation(err) => Self::Validation(err),
            IngestError::Store(err) => Self::Store(err),
        }
    }
}
