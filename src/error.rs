//! Unified API error handling
//!
//! Provides consistent error responses across all endpoints.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Field name -> list of human-readable problems
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        details: serde_json::Value,
    },

    #[error("Feature disabled: {0}")]
    FeatureDisabled(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Upstream error: {0}")]
    BadGateway(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("Database error")]
    Database(sqlx::Error),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(anyhow::anyhow!(msg.into()))
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Field-level validation failure
    pub fn validation(message: impl Into<String>, fields: FieldErrors) -> Self {
        Self::Validation {
            message: message.into(),
            details: serde_json::to_value(fields).unwrap_or_default(),
        }
    }

    /// Validation failure with an arbitrary structured payload (e.g. import row errors)
    pub fn validation_with(message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Validation {
            message: message.into(),
            details,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::FeatureDisabled(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Conflict(_) => "CONFLICT",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::FeatureDisabled(_) => "FEATURE_DISABLED",
            Self::Timeout(_) => "TIMEOUT",
            Self::BadGateway(_) => "BAD_GATEWAY",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::BadRequest(msg)
            | Self::Conflict(msg)
            | Self::FeatureDisabled(msg)
            | Self::Timeout(msg)
            | Self::BadGateway(msg) => msg.clone(),
            Self::Validation { message, .. } => message.clone(),
            // Don't leak internal error details
            Self::Internal(_) | Self::Database(_) => "An internal error occurred".to_string(),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match crate::db::sqlstate(&err).as_deref() {
            // unique_violation
            Some("23505") => Self::Conflict("A record with the same unique value already exists".into()),
            // foreign_key_violation
            Some("23503") => Self::BadRequest("Referenced record does not exist".into()),
            // check_violation
            Some("23514") => Self::BadRequest("Value violates a data constraint".into()),
            _ => Self::Database(err),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        flatten_validation_errors("", &errors, &mut fields);
        Self::validation("Request validation failed", fields)
    }
}

/// Collect nested struct/list errors under dotted paths (`translation.title`, `rows[2].price`)
fn flatten_validation_errors(
    prefix: &str,
    errors: &validator::ValidationErrors,
    out: &mut FieldErrors,
) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(errs) => {
                let messages = errs.iter().map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed '{}' check", e.code))
                });
                out.entry(path).or_default().extend(messages);
            }
            ValidationErrorsKind::Struct(inner) => flatten_validation_errors(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    flatten_validation_errors(&format!("{path}[{index}]"), inner, out);
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Internal(e) => {
                tracing::error!(error = ?e, "Internal server error");
            }
            Self::Database(e) => {
                tracing::error!(error = ?e, "Database error");
            }
            Self::BadGateway(_) | Self::Timeout(_) => {
                tracing::error!(error = %self, "Upstream failure");
            }
            _ => {
                tracing::warn!(error = %self, "API error");
            }
        }

        let status = self.status_code();
        let code = self.error_code().to_string();
        let message = self.public_message();
        let details = match self {
            Self::Validation { details, .. } => Some(details),
            _ => None,
        };

        let body = ErrorResponse {
            code,
            message,
            request_id: None,
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 1, message = "name is required"))]
        name: String,
        #[validate(range(min = 0))]
        floors: i32,
    }

    #[test]
    fn validation_errors_become_field_details() {
        let err: ApiError = Sample {
            name: String::new(),
            floors: -1,
        }
        .validate()
        .unwrap_err()
        .into();

        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        match err {
            ApiError::Validation { details, .. } => {
                assert_eq!(details["name"][0], "name is required");
                assert!(details["floors"][0].as_str().unwrap().contains("range"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[derive(Validate)]
    struct Outer {
        #[validate(nested)]
        inner: Sample,
    }

    #[test]
    fn nested_errors_use_dotted_paths() {
        let err: ApiError = Outer {
            inner: Sample {
                name: String::new(),
                floors: 1,
            },
        }
        .validate()
        .unwrap_err()
        .into();

        match err {
            ApiError::Validation { details, .. } => {
                assert_eq!(details["inner.name"][0], "name is required");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = ApiError::internal("connection string leaked");
        assert_eq!(err.public_message(), "An internal error occurred");
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn non_database_sqlx_errors_stay_database_errors() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ApiError::Database(_)));
    }
}
