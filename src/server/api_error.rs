//! Standardized API error responses for all Eclipse endpoints.
//!
//! # Response Format
//!
//! ```json
//! {
//!   "error": {
//!     "code": "HWID_MISMATCH",
//!     "message": "License key is already in use on another device",
//!     "details": null
//!   }
//! }
//! ```
//!
//! The `details` field is optional. An interrupted batch generation puts the
//! committed licenses under `details.committed`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::LicenseError;
use crate::server::validation::ValidationError;

/// Machine-readable error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // === Validation Outcomes ===
    /// No license with the presented key exists
    InvalidKey,
    /// The secret is unknown or belongs to another application
    InvalidAppSecret,
    /// License has expired
    LicenseExpired,
    /// License has been revoked
    LicenseInactive,
    /// License is bound to a different hardware id
    HwidMismatch,

    // === Request Errors (400) ===
    /// Request parameters are invalid
    InvalidRequest,
    /// A required field is missing
    MissingField,
    /// A field value is invalid
    InvalidField,

    // === Resource Errors (404/409) ===
    /// Application does not exist
    ApplicationNotFound,
    /// Requested resource was not found
    NotFound,
    /// License is already revoked
    AlreadyRevoked,

    // === Server Errors (5xx) ===
    /// A unique key or secret could not be generated
    GenerationFailed,
    /// Store operation failed
    StorageError,
    /// Server configuration error
    ConfigError,
    /// Unexpected internal server error
    InternalError,
}

impl ErrorCode {
    /// Returns the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidRequest | ErrorCode::MissingField | ErrorCode::InvalidField => {
                StatusCode::BAD_REQUEST
            }

            ErrorCode::InvalidAppSecret => StatusCode::UNAUTHORIZED,

            ErrorCode::LicenseExpired | ErrorCode::LicenseInactive | ErrorCode::HwidMismatch => {
                StatusCode::FORBIDDEN
            }

            ErrorCode::InvalidKey | ErrorCode::ApplicationNotFound | ErrorCode::NotFound => {
                StatusCode::NOT_FOUND
            }

            ErrorCode::AlreadyRevoked => StatusCode::CONFLICT,

            ErrorCode::GenerationFailed
            | ErrorCode::StorageError
            | ErrorCode::ConfigError
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a default human-readable message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidKey => "Invalid license key",
            ErrorCode::InvalidAppSecret => "Invalid application secret",
            ErrorCode::LicenseExpired => "License key has expired",
            ErrorCode::LicenseInactive => "License key is not active",
            ErrorCode::HwidMismatch => "License key is already in use on another device",
            ErrorCode::InvalidRequest => "Request payload is invalid",
            ErrorCode::MissingField => "A required field is missing",
            ErrorCode::InvalidField => "A field value is invalid",
            ErrorCode::ApplicationNotFound => "Application not found",
            ErrorCode::NotFound => "The requested resource was not found",
            ErrorCode::AlreadyRevoked => "License key is already revoked",
            ErrorCode::GenerationFailed => "Failed to generate a unique value",
            ErrorCode::StorageError => "Store operation failed",
            ErrorCode::ConfigError => "Server configuration error",
            ErrorCode::InternalError => "An unexpected error occurred",
        }
    }
}

/// The inner error object containing code, message, and optional details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Standardized API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorBody,
}

impl ApiError {
    /// Creates a new API error with the default message for `code`.
    pub fn new(code: ErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }

    /// Creates a new API error with a custom message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
                details: None,
            },
        }
    }

    /// Creates a new API error with a custom message and details.
    pub fn with_details(
        code: ErrorCode,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.error.code.status_code()
    }

    /// Invalid request error with field details.
    pub fn invalid_field(field: &str, reason: &str) -> Self {
        Self::with_details(
            ErrorCode::InvalidField,
            format!("Invalid value for '{}': {}", field, reason),
            serde_json::json!({ "field": field }),
        )
    }

    /// Missing required field error.
    pub fn missing_field(field: &str) -> Self {
        Self::with_details(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
            serde_json::json!({ "field": field }),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}",
            self.error.code.default_message(),
            self.error.message
        )
    }
}

impl std::error::Error for ApiError {}

fn code_for(err: &LicenseError) -> ErrorCode {
    match err {
        LicenseError::ApplicationNotFound(_) => ErrorCode::ApplicationNotFound,
        LicenseError::InvalidRequest(_) => ErrorCode::InvalidRequest,
        LicenseError::InvalidKey => ErrorCode::InvalidKey,
        LicenseError::InvalidAppSecret => ErrorCode::InvalidAppSecret,
        LicenseError::Expired => ErrorCode::LicenseExpired,
        LicenseError::NotActive => ErrorCode::LicenseInactive,
        LicenseError::HwidMismatch => ErrorCode::HwidMismatch,
        LicenseError::GenerationCollisionExhausted { .. } | LicenseError::SecretCollision(_) => {
            ErrorCode::GenerationFailed
        }
        LicenseError::BatchInterrupted { source, .. } => code_for(source),
        LicenseError::NotFound(_) => ErrorCode::NotFound,
        LicenseError::AlreadyRevoked(_) => ErrorCode::AlreadyRevoked,
        LicenseError::ConfigError(_) => ErrorCode::ConfigError,
        LicenseError::StorageError(_) => ErrorCode::StorageError,
    }
}

impl From<LicenseError> for ApiError {
    fn from(err: LicenseError) -> Self {
        let code = code_for(&err);

        match err {
            // Validation outcomes keep their fixed, client-facing wording.
            e if e.is_validation_failure() => ApiError::new(code),
            LicenseError::BatchInterrupted { committed, source } => ApiError::with_details(
                code,
                format!(
                    "Batch stopped after {} keys: {}",
                    committed.len(),
                    source
                ),
                serde_json::json!({ "committed": committed }),
            ),
            LicenseError::StorageError(msg) => {
                // Internal details are logged, not returned.
                error!("Storage failure: {}", msg);
                ApiError::new(code)
            }
            other => ApiError::with_message(code, other.to_string()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::invalid_field(&err.field, &err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::model::License;

    #[test]
    fn error_code_status_mapping() {
        assert_eq!(ErrorCode::InvalidKey.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::InvalidAppSecret.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ErrorCode::HwidMismatch.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::AlreadyRevoked.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::GenerationFailed.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn api_error_serialization() {
        let err: ApiError = LicenseError::HwidMismatch.into();
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("HWID_MISMATCH"));
        assert!(json.contains("another device"));
        assert!(!json.contains("details"));
    }

    #[test]
    fn batch_interrupted_lists_committed_keys() {
        let now = Utc::now();
        let committed = vec![License::issue(
            "ECL-AAAA-BBBB-CCCC-DDDD".into(),
            "app",
            now,
            now + Duration::days(1),
        )];
        let err: ApiError = LicenseError::BatchInterrupted {
            committed,
            source: Box::new(LicenseError::GenerationCollisionExhausted { attempts: 10 }),
        }
        .into();

        assert_eq!(err.error.code, ErrorCode::GenerationFailed);
        let details = err.error.details.unwrap();
        assert_eq!(details["committed"][0]["key"], "ECL-AAAA-BBBB-CCCC-DDDD");
    }

    #[test]
    fn storage_details_are_hidden() {
        let err: ApiError = LicenseError::StorageError("poisoned lock".into()).into();
        assert_eq!(err.error.code, ErrorCode::StorageError);
        assert!(!err.error.message.contains("poisoned"));
    }

    #[test]
    fn validation_error_becomes_invalid_field() {
        let err: ApiError = ValidationError {
            field: "appId".into(),
            message: "cannot be empty".into(),
        }
        .into();
        assert_eq!(err.error.code, ErrorCode::InvalidField);
        assert_eq!(err.error.details.unwrap()["field"], "appId");
    }
}
