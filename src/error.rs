//! Error handling

use axum::{
    extract::rejection::JsonRejection,
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde_json::json;

use crate::classifier::ClassifierError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    // Client errors
    ValidationError(String),

    // Database errors
    DatabaseError(String),

    // Classifier / artifact errors
    ModelError(String),

    // Generic errors
    InternalError(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::DatabaseError(_)
            | AppError::ModelError(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::ValidationError(msg)
            | AppError::DatabaseError(msg)
            | AppError::ModelError(msg)
            | AppError::InternalError(msg) => msg,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            AppError::ValidationError(msg) => tracing::debug!("Rejected request: {}", msg),
            AppError::DatabaseError(msg) => tracing::error!("Database error: {}", msg),
            AppError::ModelError(msg) => tracing::error!("Model error: {}", msg),
            AppError::InternalError(msg) => tracing::error!("Internal error: {}", msg),
        }

        let body = Json(json!({
            "error": self.message(),
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<ClassifierError> for AppError {
    fn from(err: ClassifierError) -> Self {
        AppError::ModelError(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| errors.to_string());
        AppError::ValidationError(message)
    }
}
