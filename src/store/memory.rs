//! Volatile, process-lifetime stores.
//!
//! Each store keeps its records behind a single `Mutex`, which makes every
//! trait method trivially atomic. Records carry an insertion sequence so
//! listings come back in the order they were created.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::errors::{LicenseError, LicenseResult};
use crate::model::{Application, ApplicationUpdate, License, LicenseFilter, LicenseStatus};
use crate::store::{ApplicationStore, BindOutcome, LicenseStore, RevokeOutcome};

#[derive(Debug)]
struct Slot<T> {
    seq: u64,
    record: T,
}

#[derive(Debug)]
struct Table<T> {
    next_seq: u64,
    rows: HashMap<String, Slot<T>>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_seq: 0,
            rows: HashMap::new(),
        }
    }
}

impl<T: Clone> Table<T> {
    fn insert(&mut self, id: String, record: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.rows.insert(id, Slot { seq, record });
    }

    fn ordered<F>(&self, mut keep: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut slots: Vec<&Slot<T>> = self.rows.values().filter(|s| keep(&s.record)).collect();
        slots.sort_by_key(|s| s.seq);
        slots.into_iter().map(|s| s.record.clone()).collect()
    }
}

fn lock<'a, T>(table: &'a Mutex<Table<T>>, name: &str) -> LicenseResult<MutexGuard<'a, Table<T>>> {
    table
        .lock()
        .map_err(|_| LicenseError::StorageError(format!("failed to acquire {name} lock")))
}

/// In-memory application table keyed by id.
#[derive(Debug, Default)]
pub struct InMemoryApplicationStore {
    table: Mutex<Table<Application>>,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> LicenseResult<MutexGuard<'_, Table<Application>>> {
        lock(&self.table, "application store")
    }
}

impl ApplicationStore for InMemoryApplicationStore {
    fn insert(&self, app: Application) -> LicenseResult<()> {
        let mut table = self.lock()?;

        if table.rows.contains_key(&app.id) {
            return Err(LicenseError::SecretCollision("id"));
        }
        if table.rows.values().any(|s| s.record.secret == app.secret) {
            return Err(LicenseError::SecretCollision("secret"));
        }

        table.insert(app.id.clone(), app);
        Ok(())
    }

    fn get(&self, id: &str) -> LicenseResult<Option<Application>> {
        Ok(self.lock()?.rows.get(id).map(|s| s.record.clone()))
    }

    fn update(&self, id: &str, update: &ApplicationUpdate) -> LicenseResult<Option<Application>> {
        let mut table = self.lock()?;
        Ok(table.rows.get_mut(id).map(|slot| {
            update.apply(&mut slot.record);
            slot.record.clone()
        }))
    }

    fn remove(&self, id: &str) -> LicenseResult<Option<Application>> {
        Ok(self.lock()?.rows.remove(id).map(|s| s.record))
    }

    fn list(&self) -> LicenseResult<Vec<Application>> {
        Ok(self.lock()?.ordered(|_| true))
    }
}

/// In-memory license table keyed by the license string.
#[derive(Debug, Default)]
pub struct InMemoryLicenseStore {
    table: Mutex<Table<License>>,
}

impl InMemoryLicenseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> LicenseResult<MutexGuard<'_, Table<License>>> {
        lock(&self.table, "license store")
    }
}

impl LicenseStore for InMemoryLicenseStore {
    fn insert_if_absent(&self, license: License) -> LicenseResult<bool> {
        let mut table = self.lock()?;
        if table.rows.contains_key(&license.key) {
            return Ok(false);
        }
        table.insert(license.key.clone(), license);
        Ok(true)
    }

    fn get(&self, key: &str) -> LicenseResult<Option<License>> {
        Ok(self.lock()?.rows.get(key).map(|s| s.record.clone()))
    }

    fn bind_hwid(&self, key: &str, hwid: &str, at: DateTime<Utc>) -> LicenseResult<BindOutcome> {
        let mut table = self.lock()?;
        let Some(slot) = table.rows.get_mut(key) else {
            return Ok(BindOutcome::Missing);
        };

        let license = &mut slot.record;
        if !license.is_active() {
            return Ok(BindOutcome::NotActive);
        }
        if license.is_bound() {
            return Ok(BindOutcome::AlreadyBound(license.clone()));
        }

        license.hwid = Some(hwid.to_string());
        license.used_at = Some(at);
        Ok(BindOutcome::Bound(license.clone()))
    }

    fn revoke(&self, key: &str) -> LicenseResult<RevokeOutcome> {
        let mut table = self.lock()?;
        let Some(slot) = table.rows.get_mut(key) else {
            return Ok(RevokeOutcome::Missing);
        };

        if slot.record.status == LicenseStatus::Revoked {
            return Ok(RevokeOutcome::AlreadyRevoked);
        }

        slot.record.status = LicenseStatus::Revoked;
        Ok(RevokeOutcome::Revoked(slot.record.clone()))
    }

    fn remove(&self, key: &str) -> LicenseResult<Option<License>> {
        Ok(self.lock()?.rows.remove(key).map(|s| s.record))
    }

    fn remove_by_application(&self, app_id: &str) -> LicenseResult<Vec<String>> {
        let mut table = self.lock()?;
        let keys: Vec<String> = table
            .ordered(|l| l.app_id == app_id)
            .into_iter()
            .map(|l| l.key)
            .collect();

        for key in &keys {
            table.rows.remove(key);
        }
        Ok(keys)
    }

    fn list(&self, filter: &LicenseFilter) -> LicenseResult<Vec<License>> {
        Ok(self.lock()?.ordered(|l| filter.matches(l)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn license(key: &str, app_id: &str) -> License {
        let now = Utc::now();
        License::issue(key.to_string(), app_id, now, now + Duration::days(1))
    }

    #[test]
    fn insert_if_absent_rejects_duplicate_key() {
        let store = InMemoryLicenseStore::new();
        assert!(store.insert_if_absent(license("K1", "a")).unwrap());
        assert!(!store.insert_if_absent(license("K1", "b")).unwrap());
        assert_eq!(store.get("K1").unwrap().unwrap().app_id, "a");
    }

    #[test]
    fn bind_is_one_shot() {
        let store = InMemoryLicenseStore::new();
        store.insert_if_absent(license("K1", "a")).unwrap();
        let now = Utc::now();

        assert!(matches!(
            store.bind_hwid("K1", "H1", now).unwrap(),
            BindOutcome::Bound(ref l) if l.hwid.as_deref() == Some("H1") && l.used_at == Some(now)
        ));
        match store.bind_hwid("K1", "H2", now).unwrap() {
            BindOutcome::AlreadyBound(l) => assert_eq!(l.hwid.as_deref(), Some("H1")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(store.bind_hwid("nope", "H1", now).unwrap(), BindOutcome::Missing);
    }

    #[test]
    fn bind_refuses_revoked_license() {
        let store = InMemoryLicenseStore::new();
        store.insert_if_absent(license("K1", "a")).unwrap();
        store.revoke("K1").unwrap();

        assert_eq!(
            store.bind_hwid("K1", "H1", Utc::now()).unwrap(),
            BindOutcome::NotActive
        );
        let stored = store.get("K1").unwrap().unwrap();
        assert!(stored.hwid.is_none());
        assert!(stored.used_at.is_none());
    }

    #[test]
    fn revoke_is_terminal() {
        let store = InMemoryLicenseStore::new();
        store.insert_if_absent(license("K1", "a")).unwrap();

        assert!(matches!(store.revoke("K1").unwrap(), RevokeOutcome::Revoked(_)));
        assert_eq!(store.revoke("K1").unwrap(), RevokeOutcome::AlreadyRevoked);
        assert_eq!(store.revoke("K2").unwrap(), RevokeOutcome::Missing);
    }

    #[test]
    fn list_preserves_insertion_order() {
        let store = InMemoryLicenseStore::new();
        for key in ["K3", "K1", "K2"] {
            store.insert_if_absent(license(key, "a")).unwrap();
        }
        let keys: Vec<String> = store
            .list(&LicenseFilter::default())
            .unwrap()
            .into_iter()
            .map(|l| l.key)
            .collect();
        assert_eq!(keys, vec!["K3", "K1", "K2"]);
    }

    #[test]
    fn remove_by_application_only_touches_that_application() {
        let store = InMemoryLicenseStore::new();
        store.insert_if_absent(license("K1", "a")).unwrap();
        store.insert_if_absent(license("K2", "b")).unwrap();
        store.insert_if_absent(license("K3", "a")).unwrap();

        assert_eq!(store.remove_by_application("a").unwrap(), vec!["K1", "K3"]);
        assert!(store.list(&LicenseFilter::application("a")).unwrap().is_empty());
        assert!(store.get("K2").unwrap().is_some());
    }

    #[test]
    fn application_insert_rejects_secret_collision() {
        let store = InMemoryApplicationStore::new();
        let app = Application {
            id: "a1".into(),
            name: "App".into(),
            version: "1.0".into(),
            language: "rust".into(),
            owner_id: "u1".into(),
            secret: "s3cr3t".into(),
            created_at: Utc::now(),
            status: crate::model::ApplicationStatus::Active,
        };
        store.insert(app.clone()).unwrap();

        let mut twin = app.clone();
        twin.id = "a2".into();
        assert!(matches!(
            store.insert(twin),
            Err(LicenseError::SecretCollision("secret"))
        ));

        let mut same_id = app;
        same_id.secret = "other".into();
        assert!(matches!(
            store.insert(same_id),
            Err(LicenseError::SecretCollision("id"))
        ));
    }
}
