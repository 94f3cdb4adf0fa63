// src/server/mod.rs

//! Server-side components for Eclipse.
//!
//! This module contains:
//! - `handlers`    → Axum HTTP handlers over the license engine
//! - `routes`      → Router builder
//! - `api_error`   → Error codes and the JSON error envelope
//! - `logging`     → Request-id middleware and health response
//! - `validation`  → Request field checks

pub mod api_error;
pub mod handlers;
pub mod logging;
pub mod routes;
pub mod validation;

pub use api_error::{ApiError, ErrorBody, ErrorCode};
pub use handlers::AppState;
pub use logging::{request_logging_middleware, HealthResponse, REQUEST_ID_HEADER};
pub use routes::build_router;
pub use validation::{
    validate_identifier, validate_length, validate_license_key, validate_not_empty,
    ValidationError, ValidationResult,
};
