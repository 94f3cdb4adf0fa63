//! Application registry.
//!
//! Owns application records and their secrets. It knows nothing about
//! licenses; cascading deletes are orchestrated by the engine.

use std::sync::Arc;

use chrono::Utc;
use rand::RngCore;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::errors::{LicenseError, LicenseResult};
use crate::logging::{log_license_event, LicenseEvent};
use crate::model::{Application, ApplicationStatus, ApplicationUpdate, NewApplication};
use crate::store::{ApplicationStore, InMemoryApplicationStore};

/// Random bytes in an application id (16 hex characters).
const APP_ID_BYTES: usize = 8;

/// Random bytes in an application secret (64 hex characters).
const APP_SECRET_BYTES: usize = 32;

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Registry of applications, backed by a pluggable [`ApplicationStore`].
#[derive(Clone)]
pub struct ApplicationRegistry {
    store: Arc<dyn ApplicationStore>,
}

impl ApplicationRegistry {
    pub fn new(store: Arc<dyn ApplicationStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryApplicationStore::new()))
    }

    /// Register an application with a fresh id and secret.
    ///
    /// A collision of either value with an existing application is fatal and
    /// surfaces as `SecretCollision`; it is never silently accepted.
    pub fn create(&self, request: NewApplication) -> LicenseResult<Application> {
        let app = Application {
            id: random_hex(APP_ID_BYTES),
            name: request.name,
            version: request.version,
            language: request.language,
            owner_id: request.owner_id,
            secret: random_hex(APP_SECRET_BYTES),
            created_at: Utc::now(),
            status: ApplicationStatus::Active,
        };

        self.store.insert(app.clone())?;

        log_license_event(
            LicenseEvent::ApplicationCreated,
            &app.id,
            Some(&format!("owner={}", app.owner_id)),
        );
        Ok(app)
    }

    pub fn get(&self, id: &str) -> LicenseResult<Application> {
        self.store
            .get(id)?
            .ok_or_else(|| LicenseError::ApplicationNotFound(id.to_string()))
    }

    pub fn exists(&self, id: &str) -> LicenseResult<bool> {
        Ok(self.store.get(id)?.is_some())
    }

    /// Merge the provided fields into the stored record.
    pub fn update(&self, id: &str, update: &ApplicationUpdate) -> LicenseResult<Application> {
        let app = self
            .store
            .update(id, update)?
            .ok_or_else(|| LicenseError::NotFound(format!("application '{id}'")))?;

        log_license_event(LicenseEvent::ApplicationUpdated, id, None);
        Ok(app)
    }

    /// Remove the application record and return it.
    ///
    /// Crate-private: removing an application must go through
    /// [`LicenseEngine::delete_application`](crate::engine::LicenseEngine::delete_application),
    /// which removes its licenses first.
    ///
    /// ```compile_fail
    /// use eclipse::registry::ApplicationRegistry;
    ///
    /// let registry = ApplicationRegistry::in_memory();
    /// registry.delete("3f9a1c0b7d2e4a65").unwrap();
    /// ```
    pub(crate) fn delete(&self, id: &str) -> LicenseResult<Application> {
        let app = self
            .store
            .remove(id)?
            .ok_or_else(|| LicenseError::NotFound(format!("application '{id}'")))?;

        log_license_event(LicenseEvent::ApplicationDeleted, id, None);
        Ok(app)
    }

    /// Find the application holding `secret`.
    ///
    /// Every stored secret is compared in constant time and the scan never
    /// exits early, so timing does not reveal how much of a secret matched
    /// or which application it belongs to.
    pub fn find_by_secret(&self, secret: &str) -> LicenseResult<Option<Application>> {
        if secret.is_empty() {
            return Ok(None);
        }

        let presented = secret.as_bytes();
        let mut found = None;
        for app in self.store.list()? {
            let matched: bool = app.secret.as_bytes().ct_eq(presented).into();
            if matched && found.is_none() {
                found = Some(app);
            }
        }

        if found.is_none() {
            debug!("No application matches the presented secret");
        }
        Ok(found)
    }

    pub fn list_by_owner(&self, owner_id: &str) -> LicenseResult<Vec<Application>> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|app| app.owner_id == owner_id)
            .collect())
    }
}
