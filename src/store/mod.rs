//! Storage seams for applications and licenses.
//!
//! The registry and the engine only talk to these traits, so a durable
//! backend can replace [`memory`] without touching business logic. Every
//! method is atomic with respect to the records it touches.

pub mod memory;

use chrono::{DateTime, Utc};

use crate::errors::LicenseResult;
use crate::model::{Application, ApplicationUpdate, License, LicenseFilter};

pub use memory::{InMemoryApplicationStore, InMemoryLicenseStore};

/// Result of a compare-and-set on a license's hardware binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// The license was unbound and now carries the presented hwid.
    Bound(License),
    /// The license already had a hwid; it was left untouched.
    AlreadyBound(License),
    /// The license is no longer active; it was left untouched.
    NotActive,
    /// No license with that key exists.
    Missing,
}

/// Result of moving a license into the revoked state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked(License),
    AlreadyRevoked,
    Missing,
}

pub trait ApplicationStore: Send + Sync {
    /// Insert a new application.
    ///
    /// Fails with `SecretCollision` if the id or the secret is already taken.
    fn insert(&self, app: Application) -> LicenseResult<()>;

    fn get(&self, id: &str) -> LicenseResult<Option<Application>>;

    /// Merge `update` into the stored record and return the result.
    fn update(&self, id: &str, update: &ApplicationUpdate) -> LicenseResult<Option<Application>>;

    fn remove(&self, id: &str) -> LicenseResult<Option<Application>>;

    /// All applications, in registration order.
    fn list(&self) -> LicenseResult<Vec<Application>>;
}

pub trait LicenseStore: Send + Sync {
    /// Store `license` unless its key is already present.
    ///
    /// Returns `false` on a key collision; the store is left unchanged.
    fn insert_if_absent(&self, license: License) -> LicenseResult<bool>;

    fn get(&self, key: &str) -> LicenseResult<Option<License>>;

    /// Bind `hwid` to an unbound, active license, setting `usedAt` to `at`.
    ///
    /// The status check, the "unbound" check and the write happen as one
    /// step, so a concurrent revoke is never overwritten by a binding.
    fn bind_hwid(&self, key: &str, hwid: &str, at: DateTime<Utc>) -> LicenseResult<BindOutcome>;

    fn revoke(&self, key: &str) -> LicenseResult<RevokeOutcome>;

    fn remove(&self, key: &str) -> LicenseResult<Option<License>>;

    /// Remove every license owned by `app_id` in one step.
    ///
    /// Returns the removed keys.
    fn remove_by_application(&self, app_id: &str) -> LicenseResult<Vec<String>>;

    /// Licenses matching `filter`, in insertion order.
    fn list(&self, filter: &LicenseFilter) -> LicenseResult<Vec<License>>;
}
