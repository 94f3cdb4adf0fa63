//! Eclipse - license key issuance and validation for registered applications
//!
//! Owners register applications, mint batches of license keys for them, and
//! client software validates a key by presenting it with the application's
//! secret and an optional hardware id. The first successful validation that
//! presents a hardware id binds the key to that device for good.
//!
//! # Features
//!
//! - `server` - Axum HTTP transport over the engine. Enabled by default.
//!
//! # Example
//!
//! ```
//! use eclipse::engine::{EngineConfig, LicenseEngine};
//! use eclipse::model::NewApplication;
//!
//! let engine = LicenseEngine::in_memory(EngineConfig::default());
//! let app = engine
//!     .create_application(NewApplication {
//!         owner_id: "owner-1".into(),
//!         name: "Editor".into(),
//!         ..Default::default()
//!     })
//!     .unwrap();
//!
//! let keys = engine.generate_batch(&app.id, 1, 30, None).unwrap();
//! let ok = engine.validate(&keys[0].key, Some("HW-1"), &app.secret);
//! assert!(ok.is_ok());
//! ```

// Core modules (always available)
pub mod config;
pub mod engine;
pub mod errors;
pub mod license_key;
pub mod logging;
pub mod model;
pub mod registry;
pub mod store;

// Server-related modules (requires "server" feature)
#[cfg(feature = "server")]
#[path = "server/mod.rs"]
pub mod server;

pub use engine::{EngineConfig, LicenseEngine};
pub use errors::{ErrorKind, LicenseError, LicenseResult};
pub use model::{Application, License, LicenseFilter, LicenseStatus, ValidatedLicense};
pub use registry::ApplicationRegistry;
