//! Request validation utilities for the Eclipse API.
//!
//! Checks here only guard the shape of incoming fields. Whether a key or a
//! secret is *authorized* is decided by the engine.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::license_key::validate_license_key_format;

/// Longest hardware id accepted from clients.
pub const MAX_HWID_LEN: usize = 256;

/// Longest free-text application field (name, version, language).
pub const MAX_TEXT_LEN: usize = 128;

/// Validation error type.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$").expect("identifier pattern is valid")
    })
}

/// Validate an opaque identifier such as an application or owner id.
///
/// # Example
/// ```
/// use eclipse::server::validation::validate_identifier;
///
/// assert!(validate_identifier("3f9a1c0b7d2e4a65", "appId").is_ok());
/// assert!(validate_identifier("", "appId").is_err());
/// assert!(validate_identifier("../etc", "appId").is_err());
/// ```
pub fn validate_identifier(value: &str, field_name: &str) -> ValidationResult<()> {
    if identifier_pattern().is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new(
            field_name,
            "invalid identifier (alphanumeric with hyphens/underscores, 1-64 chars)",
        ))
    }
}

/// Validate a license key format.
///
/// # Example
/// ```
/// use eclipse::server::validation::validate_license_key;
///
/// assert!(validate_license_key("ECL-AB12-CD34-EF56-0789", "key").is_ok());
/// assert!(validate_license_key("invalid", "key").is_err());
/// ```
pub fn validate_license_key(value: &str, field_name: &str) -> ValidationResult<()> {
    if validate_license_key_format(value) {
        Ok(())
    } else {
        Err(ValidationError::new(
            field_name,
            "invalid license key format (expected: PREFIX-XXXX-XXXX-XXXX-XXXX)",
        ))
    }
}

/// Validate that a string is not empty or whitespace only.
pub fn validate_not_empty(value: &str, field_name: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        Err(ValidationError::new(field_name, "cannot be empty"))
    } else {
        Ok(())
    }
}

/// Validate string length is within bounds.
pub fn validate_length(
    value: &str,
    min: usize,
    max: usize,
    field_name: &str,
) -> ValidationResult<()> {
    let len = value.chars().count();
    if len < min {
        Err(ValidationError::new(
            field_name,
            format!("must be at least {} characters", min),
        ))
    } else if len > max {
        Err(ValidationError::new(
            field_name,
            format!("must be at most {} characters", max),
        ))
    } else {
        Ok(())
    }
}

/// Validate an optional string's length if present.
pub fn validate_optional_length(
    value: Option<&str>,
    max: usize,
    field_name: &str,
) -> ValidationResult<()> {
    match value {
        Some(v) => validate_length(v, 0, max, field_name),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("a1b2c3d4e5f60718", "id").is_ok());
        assert!(validate_identifier("user_42", "id").is_ok());
        assert!(validate_identifier("-leading", "id").is_err());
        assert!(validate_identifier("has space", "id").is_err());
        assert!(validate_identifier(&"a".repeat(65), "id").is_err());
    }

    #[test]
    fn test_validate_license_key() {
        assert!(validate_license_key("ECL-AB12-CD34-EF56-0789", "key").is_ok());
        assert!(validate_license_key("ECL-AB12-CD34", "key").is_err());
        assert!(validate_license_key("", "key").is_err());
    }

    #[test]
    fn test_validate_not_empty() {
        assert!(validate_not_empty("hello", "field").is_ok());
        assert!(validate_not_empty("", "field").is_err());
        assert!(validate_not_empty("  \t", "field").is_err());
    }

    #[test]
    fn test_validate_length() {
        assert!(validate_length("hello", 1, 10, "field").is_ok());
        assert!(validate_length("", 1, 10, "field").is_err());
        assert!(validate_length("hello world", 1, 10, "field").is_err());
        assert!(validate_optional_length(None, 3, "field").is_ok());
        assert!(validate_optional_length(Some("abcd"), 3, "field").is_err());
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("hwid", "is too long");
        assert_eq!(err.to_string(), "hwid: is too long");
    }
}
