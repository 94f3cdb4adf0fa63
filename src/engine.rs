//! License engine: minting, hardware binding, validation and removal.
//!
//! # Concurrency
//!
//! Mutations that must observe a consistent view of both stores (batch
//! generation, key deletion, cascading application deletion) run under the
//! engine's write gate. Validation does not take the gate; the first-use
//! binding is a compare-and-set inside the license store, so two concurrent
//! first uses with different hardware ids cannot both succeed.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Days, Utc};
use tracing::{debug, info};

use crate::config::LicenseConfig;
use crate::errors::{LicenseError, LicenseResult};
use crate::license_key::{is_valid_prefix, KeyGenerator, RandomKeyGenerator};
use crate::logging::{log_license_event, redact_hwid, LicenseEvent};
use crate::model::{
    Application, ApplicationUpdate, License, LicenseFilter, LicenseStatus, NewApplication,
    ValidatedLicense,
};
use crate::registry::ApplicationRegistry;
use crate::store::{BindOutcome, InMemoryLicenseStore, LicenseStore, RevokeOutcome};

/// Tunables for the engine, usually derived from [`LicenseConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Prefix used when a batch request does not name one.
    pub default_prefix: String,
    /// Fresh draws per key before a collision is fatal.
    pub collision_retries: u32,
    /// Largest `count` accepted by [`LicenseEngine::generate_batch`].
    pub max_batch_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&LicenseConfig::default())
    }
}

impl From<&LicenseConfig> for EngineConfig {
    fn from(config: &LicenseConfig) -> Self {
        Self {
            default_prefix: config.key_prefix.clone(),
            collision_retries: config.collision_retries,
            max_batch_size: config.max_batch_size,
        }
    }
}

/// The license lifecycle and validation engine.
pub struct LicenseEngine {
    registry: ApplicationRegistry,
    licenses: Arc<dyn LicenseStore>,
    generator: Arc<dyn KeyGenerator>,
    config: EngineConfig,
    write_gate: Mutex<()>,
}

impl LicenseEngine {
    pub fn new(
        registry: ApplicationRegistry,
        licenses: Arc<dyn LicenseStore>,
        config: EngineConfig,
    ) -> Self {
        // Every key gets at least one draw.
        let config = EngineConfig {
            collision_retries: config.collision_retries.max(1),
            ..config
        };

        Self {
            registry,
            licenses,
            generator: Arc::new(RandomKeyGenerator),
            config,
            write_gate: Mutex::new(()),
        }
    }

    /// Engine over fresh volatile stores.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(
            ApplicationRegistry::in_memory(),
            Arc::new(InMemoryLicenseStore::new()),
            config,
        )
    }

    /// Replace the key source.
    pub fn with_generator(mut self, generator: Arc<dyn KeyGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn lock_writes(&self) -> LicenseResult<MutexGuard<'_, ()>> {
        self.write_gate
            .lock()
            .map_err(|_| LicenseError::StorageError("failed to acquire engine write lock".into()))
    }

    // ------------------------------------------------------------------
    // Applications
    // ------------------------------------------------------------------

    pub fn create_application(&self, request: NewApplication) -> LicenseResult<Application> {
        self.registry.create(request)
    }

    pub fn get_application(&self, app_id: &str) -> LicenseResult<Application> {
        self.registry.get(app_id)
    }

    /// Merge `update` into the application. Licenses are not touched.
    pub fn update_application(
        &self,
        app_id: &str,
        update: &ApplicationUpdate,
    ) -> LicenseResult<Application> {
        self.registry.update(app_id, update)
    }

    /// Applications registered by `owner_id`, in registration order.
    pub fn list_applications(&self, owner_id: &str) -> LicenseResult<Vec<Application>> {
        self.registry.list_by_owner(owner_id)
    }

    /// Delete an application together with every license it owns.
    ///
    /// Returns the number of licenses removed.
    pub fn delete_application(&self, app_id: &str) -> LicenseResult<usize> {
        let _gate = self.lock_writes()?;

        if !self.registry.exists(app_id)? {
            return Err(LicenseError::NotFound(format!("application '{app_id}'")));
        }

        let removed = self.cascade(app_id)?;
        self.registry.delete(app_id)?;
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Generation
    // ------------------------------------------------------------------

    /// Mint `count` keys for `app_id`, each valid for `expiry_days` calendar
    /// days from now.
    pub fn generate_batch(
        &self,
        app_id: &str,
        count: i64,
        expiry_days: i64,
        prefix: Option<&str>,
    ) -> LicenseResult<Vec<License>> {
        self.generate_batch_at(app_id, count, expiry_days, prefix, Utc::now())
    }

    /// [`generate_batch`](Self::generate_batch) with an explicit issuance time.
    ///
    /// Not atomic across the batch: if a key fails after others were stored,
    /// the error is `BatchInterrupted` carrying exactly the committed keys.
    pub fn generate_batch_at(
        &self,
        app_id: &str,
        count: i64,
        expiry_days: i64,
        prefix: Option<&str>,
        now: DateTime<Utc>,
    ) -> LicenseResult<Vec<License>> {
        let _gate = self.lock_writes()?;

        if !self.registry.exists(app_id)? {
            return Err(LicenseError::ApplicationNotFound(app_id.to_string()));
        }

        if count <= 0 {
            return Err(LicenseError::InvalidRequest(
                "count must be greater than 0".to_string(),
            ));
        }
        if count > i64::from(self.config.max_batch_size) {
            return Err(LicenseError::InvalidRequest(format!(
                "count must not exceed {}",
                self.config.max_batch_size
            )));
        }
        if expiry_days < 0 {
            return Err(LicenseError::InvalidRequest(
                "expiryDays must not be negative".to_string(),
            ));
        }

        let prefix = match prefix.filter(|p| !p.is_empty()) {
            Some(p) => p,
            None => self.config.default_prefix.as_str(),
        };
        if !is_valid_prefix(prefix) {
            return Err(LicenseError::InvalidRequest(format!(
                "prefix must be 1-16 ASCII letters or digits, got '{prefix}'"
            )));
        }

        let expires_at = now
            .checked_add_days(Days::new(expiry_days.unsigned_abs()))
            .ok_or_else(|| LicenseError::InvalidRequest("expiryDays is out of range".into()))?;

        info!(
            "Generating {} licenses for app_id={} prefix={} expires_at={}",
            count, app_id, prefix, expires_at
        );

        let mut committed: Vec<License> = Vec::with_capacity(count.unsigned_abs() as usize);
        for _ in 0..count {
            match self.mint(app_id, prefix, now, expires_at) {
                Ok(license) => committed.push(license),
                Err(source) if committed.is_empty() => return Err(source),
                Err(source) => {
                    return Err(LicenseError::BatchInterrupted {
                        committed,
                        source: Box::new(source),
                    })
                }
            }
        }

        info!("Generated {} licenses for app_id={}", committed.len(), app_id);
        Ok(committed)
    }

    /// Draw keys until one is free, bounded by the retry budget.
    fn mint(
        &self,
        app_id: &str,
        prefix: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> LicenseResult<License> {
        let attempts = self.config.collision_retries;

        for attempt in 1..=attempts {
            let key = self.generator.generate(prefix);
            let license = License::issue(key, app_id, now, expires_at);

            if self.licenses.insert_if_absent(license.clone())? {
                log_license_event(LicenseEvent::Created, &license.key, None);
                return Ok(license);
            }
            debug!("Key collision on attempt {}/{}", attempt, attempts);
        }

        Err(LicenseError::GenerationCollisionExhausted { attempts })
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Decide whether `key` presented with `hwid` and `app_secret` is
    /// authorized, binding the hardware id on first use.
    pub fn validate(
        &self,
        key: &str,
        hwid: Option<&str>,
        app_secret: &str,
    ) -> LicenseResult<ValidatedLicense> {
        self.validate_at(key, hwid, app_secret, Utc::now())
    }

    /// [`validate`](Self::validate) evaluated at `now`.
    ///
    /// Checks run in a fixed order: key lookup, secret ownership, expiry,
    /// status, hardware binding. The first failing check decides the error.
    pub fn validate_at(
        &self,
        key: &str,
        hwid: Option<&str>,
        app_secret: &str,
        now: DateTime<Utc>,
    ) -> LicenseResult<ValidatedLicense> {
        let outcome = self.run_validation(key, hwid, app_secret, now);

        match &outcome {
            Ok(_) => log_license_event(LicenseEvent::Validated, key, None),
            Err(err) => {
                log_license_event(LicenseEvent::ValidationFailed, key, Some(&err.to_string()))
            }
        }
        outcome
    }

    fn run_validation(
        &self,
        key: &str,
        hwid: Option<&str>,
        app_secret: &str,
        now: DateTime<Utc>,
    ) -> LicenseResult<ValidatedLicense> {
        let license = self.licenses.get(key)?.ok_or(LicenseError::InvalidKey)?;

        match self.registry.find_by_secret(app_secret)? {
            Some(app) if app.id == license.app_id => {}
            _ => return Err(LicenseError::InvalidAppSecret),
        }

        if license.is_expired_at(now) {
            return Err(LicenseError::Expired);
        }

        if !license.is_active() {
            return Err(LicenseError::NotActive);
        }

        let presented = hwid.filter(|h| !h.is_empty());

        if license.is_bound() {
            if license.hwid.as_deref() != presented {
                return Err(LicenseError::HwidMismatch);
            }
        } else if let Some(presented) = presented {
            match self.licenses.bind_hwid(key, presented, now)? {
                BindOutcome::Bound(_) => {
                    log_license_event(
                        LicenseEvent::Bound,
                        key,
                        Some(&format!("hwid={}", redact_hwid(presented))),
                    );
                }
                // Lost a race with a concurrent first use.
                BindOutcome::AlreadyBound(current) => {
                    if current.hwid.as_deref() != Some(presented) {
                        return Err(LicenseError::HwidMismatch);
                    }
                }
                // Revoked after the snapshot above was read.
                BindOutcome::NotActive => return Err(LicenseError::NotActive),
                BindOutcome::Missing => return Err(LicenseError::InvalidKey),
            }
        }

        Ok(ValidatedLicense::from(&license))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Move a license into the terminal `revoked` state.
    pub fn revoke(&self, key: &str) -> LicenseResult<License> {
        match self.licenses.revoke(key)? {
            RevokeOutcome::Revoked(license) => {
                log_license_event(LicenseEvent::Revoked, key, None);
                Ok(license)
            }
            RevokeOutcome::AlreadyRevoked => Err(LicenseError::AlreadyRevoked(key.to_string())),
            RevokeOutcome::Missing => Err(LicenseError::NotFound(format!("license '{key}'"))),
        }
    }

    pub fn delete(&self, key: &str) -> LicenseResult<License> {
        let _gate = self.lock_writes()?;

        let license = self
            .licenses
            .remove(key)?
            .ok_or_else(|| LicenseError::NotFound(format!("license '{key}'")))?;

        log_license_event(LicenseEvent::Deleted, key, None);
        Ok(license)
    }

    /// Remove every license owned by `app_id`. Returns how many were removed.
    pub fn delete_by_application(&self, app_id: &str) -> LicenseResult<usize> {
        let _gate = self.lock_writes()?;
        self.cascade(app_id)
    }

    fn cascade(&self, app_id: &str) -> LicenseResult<usize> {
        let removed = self.licenses.remove_by_application(app_id)?;

        log_license_event(
            LicenseEvent::CascadeDeleted,
            app_id,
            Some(&format!("removed={}", removed.len())),
        );
        Ok(removed.len())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn get(&self, key: &str) -> LicenseResult<License> {
        self.licenses
            .get(key)?
            .ok_or_else(|| LicenseError::NotFound(format!("license '{key}'")))
    }

    pub fn list(&self, filter: &LicenseFilter) -> LicenseResult<Vec<License>> {
        self.licenses.list(filter)
    }

    pub fn list_by_application(&self, app_id: &str) -> LicenseResult<Vec<License>> {
        self.list(&LicenseFilter::application(app_id))
    }

    pub fn list_by_status(&self, status: LicenseStatus) -> LicenseResult<Vec<License>> {
        self.list(&LicenseFilter::status(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a fixed list of keys, repeating the last one forever.
    struct ScriptedKeys {
        keys: Vec<&'static str>,
        next: AtomicUsize,
    }

    impl ScriptedKeys {
        fn new(keys: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                keys,
                next: AtomicUsize::new(0),
            })
        }
    }

    impl KeyGenerator for ScriptedKeys {
        fn generate(&self, prefix: &str) -> String {
            let i = self.next.fetch_add(1, Ordering::SeqCst).min(self.keys.len() - 1);
            format!("{prefix}-{}", self.keys[i])
        }
    }

    fn app(engine: &LicenseEngine) -> Application {
        engine
            .create_application(NewApplication {
                owner_id: "owner".into(),
                name: "Editor".into(),
                version: "1.0".into(),
                language: "rust".into(),
            })
            .unwrap()
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap()
    }

    #[test]
    fn expiry_uses_calendar_days() {
        let engine = LicenseEngine::in_memory(EngineConfig::default());
        let app = app(&engine);

        let keys = engine
            .generate_batch_at(&app.id, 1, 30, None, fixed_now())
            .unwrap();
        assert_eq!(
            keys[0].expires_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn empty_prefix_falls_back_to_default() {
        let engine = LicenseEngine::in_memory(EngineConfig::default());
        let app = app(&engine);

        let keys = engine.generate_batch(&app.id, 2, 1, Some("")).unwrap();
        assert!(keys.iter().all(|l| l.key.starts_with("ECL-")));
    }

    #[test]
    fn rejects_bad_parameters() {
        let engine = LicenseEngine::in_memory(EngineConfig::default());
        let app = app(&engine);

        for (count, days) in [(0, 30), (-1, 30), (1, -1), (1001, 30)] {
            assert!(
                matches!(
                    engine.generate_batch(&app.id, count, days, None),
                    Err(LicenseError::InvalidRequest(_))
                ),
                "count={count} days={days}"
            );
        }
        assert!(matches!(
            engine.generate_batch(&app.id, 1, 30, Some("BAD-PREFIX")),
            Err(LicenseError::InvalidRequest(_))
        ));
        assert!(engine.list_by_application(&app.id).unwrap().is_empty());
    }

    #[test]
    fn unknown_application_is_reported_before_parameters() {
        let engine = LicenseEngine::in_memory(EngineConfig::default());
        assert!(matches!(
            engine.generate_batch("missing", 0, 30, None),
            Err(LicenseError::ApplicationNotFound(_))
        ));
    }

    #[test]
    fn collision_is_retried_with_fresh_draw() {
        let engine =
            LicenseEngine::in_memory(EngineConfig::default()).with_generator(ScriptedKeys::new(
                vec![
                    "AAAA-AAAA-AAAA-AAAA",
                    "AAAA-AAAA-AAAA-AAAA",
                    "BBBB-BBBB-BBBB-BBBB",
                ],
            ));
        let app = app(&engine);

        let keys = engine.generate_batch(&app.id, 2, 30, None).unwrap();
        assert_eq!(keys[0].key, "ECL-AAAA-AAAA-AAAA-AAAA");
        assert_eq!(keys[1].key, "ECL-BBBB-BBBB-BBBB-BBBB");
    }

    #[test]
    fn exhausted_retries_report_committed_keys() {
        let config = EngineConfig {
            collision_retries: 3,
            ..EngineConfig::default()
        };
        let engine = LicenseEngine::in_memory(config).with_generator(ScriptedKeys::new(vec![
            "AAAA-AAAA-AAAA-AAAA",
            "BBBB-BBBB-BBBB-BBBB",
        ]));
        let app = app(&engine);

        let err = engine.generate_batch(&app.id, 5, 30, None).unwrap_err();
        match &err {
            LicenseError::BatchInterrupted { committed, source } => {
                let keys: Vec<&str> = committed.iter().map(|l| l.key.as_str()).collect();
                assert_eq!(keys, vec!["ECL-AAAA-AAAA-AAAA-AAAA", "ECL-BBBB-BBBB-BBBB-BBBB"]);
                assert!(matches!(
                    **source,
                    LicenseError::GenerationCollisionExhausted { attempts: 3 }
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(engine.list_by_application(&app.id).unwrap().len(), 2);
    }

    #[test]
    fn exhaustion_on_first_key_is_not_a_partial_batch() {
        let engine = LicenseEngine::in_memory(EngineConfig::default())
            .with_generator(ScriptedKeys::new(vec!["AAAA-AAAA-AAAA-AAAA"]));
        let app = app(&engine);
        engine.generate_batch(&app.id, 1, 30, None).unwrap();

        assert!(matches!(
            engine.generate_batch(&app.id, 1, 30, None),
            Err(LicenseError::GenerationCollisionExhausted { attempts: 10 })
        ));
    }

    #[test]
    fn validation_order_checks_secret_before_expiry() {
        let engine = LicenseEngine::in_memory(EngineConfig::default());
        let app = app(&engine);
        let key = engine
            .generate_batch_at(&app.id, 1, 1, None, fixed_now())
            .unwrap()
            .remove(0)
            .key;
        let later = fixed_now() + Duration::days(5);

        assert!(matches!(
            engine.validate_at(&key, Some("H1"), "wrong", later),
            Err(LicenseError::InvalidAppSecret)
        ));
        assert!(matches!(
            engine.validate_at(&key, Some("H1"), &app.secret, later),
            Err(LicenseError::Expired)
        ));
    }

    #[test]
    fn expired_check_precedes_revocation() {
        let engine = LicenseEngine::in_memory(EngineConfig::default());
        let app = app(&engine);
        let key = engine
            .generate_batch_at(&app.id, 1, 1, None, fixed_now())
            .unwrap()
            .remove(0)
            .key;
        engine.revoke(&key).unwrap();

        assert!(matches!(
            engine.validate_at(&key, None, &app.secret, fixed_now()),
            Err(LicenseError::NotActive)
        ));
        assert!(matches!(
            engine.validate_at(&key, None, &app.secret, fixed_now() + Duration::days(2)),
            Err(LicenseError::Expired)
        ));
    }

    #[test]
    fn validation_without_hwid_does_not_bind() {
        let engine = LicenseEngine::in_memory(EngineConfig::default());
        let app = app(&engine);
        let key = engine.generate_batch(&app.id, 1, 30, None).unwrap().remove(0).key;

        engine.validate(&key, None, &app.secret).unwrap();
        engine.validate(&key, Some(""), &app.secret).unwrap();

        let license = engine.get(&key).unwrap();
        assert!(license.hwid.is_none());
        assert!(license.used_at.is_none());
    }

    #[test]
    fn bound_license_rejects_missing_hwid() {
        let engine = LicenseEngine::in_memory(EngineConfig::default());
        let app = app(&engine);
        let key = engine.generate_batch(&app.id, 1, 30, None).unwrap().remove(0).key;

        engine.validate(&key, Some("H1"), &app.secret).unwrap();
        assert!(matches!(
            engine.validate(&key, None, &app.secret),
            Err(LicenseError::HwidMismatch)
        ));
    }

    /// Revokes each key immediately before binding it, as a concurrent
    /// revoke landing between the validation read and the bind would.
    struct RevokeBeforeBind {
        inner: InMemoryLicenseStore,
    }

    impl LicenseStore for RevokeBeforeBind {
        fn insert_if_absent(&self, license: License) -> LicenseResult<bool> {
            self.inner.insert_if_absent(license)
        }

        fn get(&self, key: &str) -> LicenseResult<Option<License>> {
            self.inner.get(key)
        }

        fn bind_hwid(
            &self,
            key: &str,
            hwid: &str,
            at: DateTime<Utc>,
        ) -> LicenseResult<BindOutcome> {
            self.inner.revoke(key)?;
            self.inner.bind_hwid(key, hwid, at)
        }

        fn revoke(&self, key: &str) -> LicenseResult<RevokeOutcome> {
            self.inner.revoke(key)
        }

        fn remove(&self, key: &str) -> LicenseResult<Option<License>> {
            self.inner.remove(key)
        }

        fn remove_by_application(&self, app_id: &str) -> LicenseResult<Vec<String>> {
            self.inner.remove_by_application(app_id)
        }

        fn list(&self, filter: &LicenseFilter) -> LicenseResult<Vec<License>> {
            self.inner.list(filter)
        }
    }

    #[test]
    fn revoke_during_first_use_blocks_binding() {
        let store = Arc::new(RevokeBeforeBind {
            inner: InMemoryLicenseStore::new(),
        });
        let engine =
            LicenseEngine::new(ApplicationRegistry::in_memory(), store, EngineConfig::default());
        let app = app(&engine);
        let key = engine.generate_batch(&app.id, 1, 30, None).unwrap().remove(0).key;

        assert!(matches!(
            engine.validate(&key, Some("H1"), &app.secret),
            Err(LicenseError::NotActive)
        ));

        let stored = engine.get(&key).unwrap();
        assert_eq!(stored.status, LicenseStatus::Revoked);
        assert!(stored.hwid.is_none());
        assert!(stored.used_at.is_none());
    }

    #[test]
    fn zero_retry_budget_still_draws_once() {
        let engine = LicenseEngine::in_memory(EngineConfig {
            collision_retries: 0,
            ..EngineConfig::default()
        });
        assert_eq!(engine.config().collision_retries, 1);

        let app = app(&engine);
        assert_eq!(engine.generate_batch(&app.id, 3, 30, None).unwrap().len(), 3);
    }

    #[test]
    fn revoke_twice_is_a_conflict() {
        let engine = LicenseEngine::in_memory(EngineConfig::default());
        let app = app(&engine);
        let key = engine.generate_batch(&app.id, 1, 30, None).unwrap().remove(0).key;

        assert_eq!(engine.revoke(&key).unwrap().status, LicenseStatus::Revoked);
        assert!(matches!(engine.revoke(&key), Err(LicenseError::AlreadyRevoked(_))));
        assert!(matches!(engine.revoke("nope"), Err(LicenseError::NotFound(_))));
    }
}
