//! Structured lifecycle logging.
//!
//! Engine and registry operations report state changes through
//! [`log_license_event`] so every transition lands in a consistent
//! `license_event` span. Secrets are never passed in.

use std::str::FromStr;

use tracing::{info, info_span, warn, Level};

use crate::config::LoggingConfig;

/// License and application lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseEvent {
    /// License was minted
    Created,
    /// License was bound to a hardware id on first use
    Bound,
    /// License was validated successfully
    Validated,
    /// License validation failed
    ValidationFailed,
    /// License was revoked
    Revoked,
    /// License was deleted individually
    Deleted,
    /// Licenses were removed with their application
    CascadeDeleted,
    /// Application was registered
    ApplicationCreated,
    /// Application fields were updated
    ApplicationUpdated,
    /// Application was removed
    ApplicationDeleted,
}

impl std::fmt::Display for LicenseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LicenseEvent::Created => "created",
            LicenseEvent::Bound => "bound",
            LicenseEvent::Validated => "validated",
            LicenseEvent::ValidationFailed => "validation_failed",
            LicenseEvent::Revoked => "revoked",
            LicenseEvent::Deleted => "deleted",
            LicenseEvent::CascadeDeleted => "cascade_deleted",
            LicenseEvent::ApplicationCreated => "application_created",
            LicenseEvent::ApplicationUpdated => "application_updated",
            LicenseEvent::ApplicationDeleted => "application_deleted",
        };
        write!(f, "{}", s)
    }
}

/// Log a lifecycle event for a license key or application id.
///
/// Failed validations log at `warn` with `details` as the reason.
pub fn log_license_event(event: LicenseEvent, subject: &str, details: Option<&str>) {
    let span = info_span!(
        "license_event",
        event = %event,
        subject = %subject,
    );
    let _enter = span.enter();

    match event {
        LicenseEvent::ValidationFailed => {
            if let Some(d) = details {
                warn!(reason = %d, "License event occurred");
            } else {
                warn!("License event occurred");
            }
        }
        _ => {
            if let Some(d) = details {
                info!(details = %d, "License event occurred");
            } else {
                info!("License event occurred");
            }
        }
    }
}

/// Shorten a hardware id for log output.
pub fn redact_hwid(hwid: &str) -> String {
    if hwid.chars().count() <= 8 {
        return hwid.to_string();
    }
    let visible: String = hwid.chars().take(8).collect();
    format!("{visible}…")
}

/// Install the global fmt subscriber at the configured level.
///
/// Does nothing when logging is disabled or a subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) {
    if !config.enabled {
        return;
    }

    let level = Level::from_str(&config.level).unwrap_or(Level::INFO);
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_snake_case() {
        assert_eq!(LicenseEvent::ValidationFailed.to_string(), "validation_failed");
        assert_eq!(LicenseEvent::CascadeDeleted.to_string(), "cascade_deleted");
    }

    #[test]
    fn redact_hwid_truncates_long_ids() {
        assert_eq!(redact_hwid("H1"), "H1");
        assert_eq!(redact_hwid("0123456789abcdef"), "01234567…");
    }

    #[test]
    fn init_tracing_is_idempotent() {
        let config = LoggingConfig::default();
        init_tracing(&config);
        init_tracing(&config);
    }
}
