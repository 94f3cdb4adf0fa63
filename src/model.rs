//! Records owned by the application registry and the license store.
//!
//! Field names serialize in camelCase (`key`, `appId`, `status`, `createdAt`,
//! `expiresAt`, `usedAt`, `hwid`) so the wire format stays compatible with
//! existing clients.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::LicenseError;

/// License state. `Revoked` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Active,
    Revoked,
}

impl LicenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Active => "active",
            LicenseStatus::Revoked => "revoked",
        }
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LicenseStatus {
    type Err = LicenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LicenseStatus::Active),
            "revoked" => Ok(LicenseStatus::Revoked),
            other => Err(LicenseError::InvalidRequest(format!(
                "unknown license status '{other}'"
            ))),
        }
    }
}

/// A license key bound to exactly one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    /// The key string itself; unique across the whole system.
    pub key: String,
    pub app_id: String,
    pub status: LicenseStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Set together with `hwid` on the first successful binding.
    pub used_at: Option<DateTime<Utc>>,
    pub hwid: Option<String>,
}

impl License {
    /// A fresh, unbound, active license.
    pub fn issue(
        key: String,
        app_id: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            app_id: app_id.to_string(),
            status: LicenseStatus::Active,
            created_at,
            expires_at,
            used_at: None,
            hwid: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_active(&self) -> bool {
        self.status == LicenseStatus::Active
    }

    pub fn is_bound(&self) -> bool {
        self.hwid.as_deref().is_some_and(|h| !h.is_empty())
    }
}

/// What a successful validation hands back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedLicense {
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<&License> for ValidatedLicense {
    fn from(license: &License) -> Self {
        Self {
            expires_at: license.expires_at,
            created_at: license.created_at,
        }
    }
}

/// Composable read filter over the license store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseFilter {
    pub app_id: Option<String>,
    pub status: Option<LicenseStatus>,
}

impl LicenseFilter {
    pub fn application(app_id: &str) -> Self {
        Self {
            app_id: Some(app_id.to_string()),
            status: None,
        }
    }

    pub fn status(status: LicenseStatus) -> Self {
        Self {
            app_id: None,
            status: Some(status),
        }
    }

    pub fn matches(&self, license: &License) -> bool {
        self.app_id
            .as_deref()
            .map_or(true, |app_id| license.app_id == app_id)
            && self.status.map_or(true, |status| license.status == status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Active,
    Inactive,
}

/// A registered application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub name: String,
    pub version: String,
    pub language: String,
    pub owner_id: String,
    /// Authenticates validation requests. Never logged.
    pub secret: String,
    pub created_at: DateTime<Utc>,
    pub status: ApplicationStatus,
}

/// Fields supplied by the owner when registering an application.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApplication {
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub language: String,
}

/// Partial update; `None` fields keep their stored value.
///
/// `id`, `ownerId`, `secret` and `createdAt` cannot be changed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationUpdate {
    pub name: Option<String>,
    pub version: Option<String>,
    pub language: Option<String>,
    pub status: Option<ApplicationStatus>,
}

impl ApplicationUpdate {
    pub fn apply(&self, app: &mut Application) {
        if let Some(name) = &self.name {
            app.name = name.clone();
        }
        if let Some(version) = &self.version {
            app.version = version.clone();
        }
        if let Some(language) = &self.language {
            app.language = language.clone();
        }
        if let Some(status) = self.status {
            app.status = status;
        }
    }
}
