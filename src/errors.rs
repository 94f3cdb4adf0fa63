//! Error types shared by the registry, the license engine and the HTTP layer.
//!
//! Every failure is recoverable at the request boundary. Validation failures
//! are decisions, not transient faults, and are never retried.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::License;

/// Result alias used throughout the crate.
pub type LicenseResult<T> = Result<T, LicenseError>;

#[derive(Debug, Error)]
pub enum LicenseError {
    #[error("application '{0}' not found")]
    ApplicationNotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid license key")]
    InvalidKey,

    #[error("invalid application secret")]
    InvalidAppSecret,

    #[error("license has expired")]
    Expired,

    #[error("license is not active")]
    NotActive,

    #[error("license is already used on another device")]
    HwidMismatch,

    #[error("failed to generate a unique license key after {attempts} attempts")]
    GenerationCollisionExhausted { attempts: u32 },

    /// Generation failed part-way through a batch. `committed` holds exactly
    /// the licenses that were stored before the failure, in generation order.
    #[error("batch generation stopped after {} keys: {source}", .committed.len())]
    BatchInterrupted {
        committed: Vec<License>,
        #[source]
        source: Box<LicenseError>,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("license '{0}' is already revoked")]
    AlreadyRevoked(String),

    #[error("generated application {0} collides with an existing application")]
    SecretCollision(&'static str),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("storage error: {0}")]
    StorageError(String),
}

/// Stable, machine-readable classification of a [`LicenseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ApplicationNotFound,
    InvalidRequest,
    InvalidKey,
    InvalidAppSecret,
    Expired,
    NotActive,
    HwidMismatch,
    GenerationCollisionExhausted,
    NotFound,
    AlreadyRevoked,
    SecretCollision,
    ConfigError,
    StorageError,
}

impl LicenseError {
    /// Classify this error.
    ///
    /// An interrupted batch reports the kind of the error that stopped it.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LicenseError::ApplicationNotFound(_) => ErrorKind::ApplicationNotFound,
            LicenseError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            LicenseError::InvalidKey => ErrorKind::InvalidKey,
            LicenseError::InvalidAppSecret => ErrorKind::InvalidAppSecret,
            LicenseError::Expired => ErrorKind::Expired,
            LicenseError::NotActive => ErrorKind::NotActive,
            LicenseError::HwidMismatch => ErrorKind::HwidMismatch,
            LicenseError::GenerationCollisionExhausted { .. } => {
                ErrorKind::GenerationCollisionExhausted
            }
            LicenseError::BatchInterrupted { source, .. } => source.kind(),
            LicenseError::NotFound(_) => ErrorKind::NotFound,
            LicenseError::AlreadyRevoked(_) => ErrorKind::AlreadyRevoked,
            LicenseError::SecretCollision(_) => ErrorKind::SecretCollision,
            LicenseError::ConfigError(_) => ErrorKind::ConfigError,
            LicenseError::StorageError(_) => ErrorKind::StorageError,
        }
    }

    /// True for the outcomes of the validation pipeline.
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            LicenseError::InvalidKey
                | LicenseError::InvalidAppSecret
                | LicenseError::Expired
                | LicenseError::NotActive
                | LicenseError::HwidMismatch
        )
    }

    /// Licenses committed before the failure, if this error interrupted a batch.
    pub fn committed(&self) -> &[License] {
        match self {
            LicenseError::BatchInterrupted { committed, .. } => committed,
            _ => &[],
        }
    }
}
