use super::{PermissionRecord, RecordFilter, RecordStore, RecordType, StoreError};
use crate::config::PermissionConfig;
use crate::error::{PermissionError, Result};
use crate::policy::PermissionSet;
use chrono::Utc;
use std::collections::BTreeMap;

/// How many times a force re-reads the record after losing a race.
const FORCE_ATTEMPTS: usize = 16;

/// Creates, derives, looks up and destroys permission records.
///
/// All storage goes through the injected [`RecordStore`]. The manager holds
/// no state of its own and can be shared between tasks behind an `Arc`.
///
/// # Example
///
/// ```rust
/// use permset_core::{GrantManager, MemoryRecordStore, PermissionSet};
///
/// # tokio_test::block_on(async {
/// let manager = GrantManager::new(MemoryRecordStore::new());
///
/// let set: PermissionSet = "io.cozy.files:ALL".parse()?;
/// let app = manager.create_application_grant("drive", set).await?;
///
/// let shared: PermissionSet = "io.cozy.files:GET:folder1".parse()?;
/// let codes = [("bob".to_string(), "s3cr3t".to_string())].into();
/// manager.create_derived_grant(&app, codes, shared).await?;
///
/// let found = manager.get_for_share_code("s3cr3t").await?;
/// assert_eq!(found.source_id, "io.cozy.apps/drive");
/// # Ok::<(), permset_core::PermissionError>(())
/// # }).unwrap();
/// ```
pub struct GrantManager {
    store: Box<dyn RecordStore>,
    config: PermissionConfig,
}

impl GrantManager {
    /// Create a manager over `store` with the default configuration
    pub fn new(store: impl RecordStore + 'static) -> Self {
        Self::with_boxed_store(Box::new(store))
    }

    pub fn with_boxed_store(store: Box<dyn RecordStore>) -> Self {
        Self {
            store,
            config: PermissionConfig::default(),
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: PermissionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PermissionConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    /// The application record of `slug`.
    pub async fn get_for_application(&self, slug: &str) -> Result<PermissionRecord> {
        let source_id = self.config.application_source_id(slug);
        let filter = RecordFilter::source(source_id.clone()).with_type(RecordType::Application);
        self.store
            .find_one(&filter)
            .await?
            .ok_or(PermissionError::NotFound(source_id))
    }

    /// The unique share record redeemable with `code`.
    ///
    /// # Errors
    ///
    /// - [`PermissionError::NotFound`] if no share record holds the code
    /// - [`PermissionError::InconsistentState`] if several do
    /// - [`PermissionError::Expired`] if the record is past its expiry
    pub async fn get_for_share_code(&self, code: &str) -> Result<PermissionRecord> {
        let mut matches: Vec<PermissionRecord> = self
            .store
            .find_by_code(code)
            .await?
            .into_iter()
            .filter(|r| r.record_type == RecordType::Sharing)
            .collect();

        let record = match matches.len() {
            0 => return Err(PermissionError::NotFound("share code".to_string())),
            1 => matches.remove(0),
            n => {
                let ids: Vec<&str> = matches.iter().map(|r| r.id.as_str()).collect();
                log::warn!("share code is held by {} records: {}", n, ids.join(", "));
                return Err(PermissionError::InconsistentState(format!(
                    "share code is held by {} records",
                    n
                )));
            }
        };

        if record.is_expired() {
            log::debug!("share record {} has expired", record.id);
            return Err(PermissionError::Expired(record.id));
        }
        Ok(record)
    }

    /// Persist the permissions of a newly installed application.
    ///
    /// Fails with [`PermissionError::AlreadyExists`] if the application
    /// already has a record.
    pub async fn create_application_grant(
        &self,
        slug: &str,
        permissions: PermissionSet,
    ) -> Result<PermissionRecord> {
        permissions.validate()?;
        let source_id = self.config.application_source_id(slug);
        let record = PermissionRecord::new(RecordType::Application, source_id.clone(), permissions);

        let created = self
            .store
            .create_exclusive(record)
            .await
            .map_err(|e| match e {
                StoreError::Exists(_) => PermissionError::AlreadyExists(source_id),
                other => other.into(),
            })?;

        log::info!(
            "created application grant {} for {} ({} rules)",
            created.id,
            created.source_id,
            created.permissions.len()
        );
        Ok(created)
    }

    /// Create the application record, or replace the permissions of the
    /// existing one in place (same id, next revision).
    ///
    /// Concurrent forces of the same application all succeed; each one that
    /// loses a race re-reads the record and applies its set on top.
    pub async fn force_application_grant(
        &self,
        slug: &str,
        permissions: PermissionSet,
    ) -> Result<PermissionRecord> {
        permissions.validate()?;
        for attempt in 1..=FORCE_ATTEMPTS {
            match self.get_for_application(slug).await {
                Ok(mut existing) => {
                    existing.permissions = permissions.clone();
                    match self.store.update(existing).await {
                        Ok(updated) => {
                            log::info!(
                                "replaced application grant {} for {}",
                                updated.id,
                                updated.source_id
                            );
                            return Ok(updated);
                        }
                        Err(StoreError::Conflict(_)) | Err(StoreError::NotFound(_)) => {
                            log::debug!(
                                "grant of {} changed during force (attempt {})",
                                slug,
                                attempt
                            );
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(PermissionError::NotFound(_)) => {
                    match self.create_application_grant(slug, permissions.clone()).await {
                        Err(PermissionError::AlreadyExists(_)) => {
                            log::debug!(
                                "grant of {} created during force (attempt {})",
                                slug,
                                attempt
                            );
                        }
                        other => return other,
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::Conflict(format!(
            "grant of {} kept changing after {} attempts",
            self.config.application_source_id(slug),
            FORCE_ATTEMPTS
        ))
        .into())
    }

    /// Derive a share record from an application record.
    ///
    /// The new record keeps the parent's source id, holds `codes`, and
    /// expires after the configured share code lifetime, if any.
    ///
    /// # Errors
    ///
    /// - [`PermissionError::OnlyAppCanDerive`] unless `parent` is an application record
    /// - [`PermissionError::NotSubset`] if `permissions` grants anything `parent` does not
    pub async fn create_derived_grant(
        &self,
        parent: &PermissionRecord,
        codes: BTreeMap<String, String>,
        permissions: PermissionSet,
    ) -> Result<PermissionRecord> {
        if !parent.record_type.can_derive() {
            log::debug!(
                "refusing to derive from {} record {}",
                parent.record_type,
                parent.id
            );
            return Err(PermissionError::OnlyAppCanDerive);
        }
        permissions.validate()?;
        permissions.ensure_subset_of(&parent.permissions)?;

        let mut record =
            PermissionRecord::new(RecordType::Sharing, parent.source_id.clone(), permissions)
                .with_codes(codes);
        if let Some(lifetime) = self.config.share_code_lifetime() {
            let expires_at = chrono::Duration::from_std(lifetime)
                .ok()
                .and_then(|d| Utc::now().checked_add_signed(d));
            match expires_at {
                Some(at) => record = record.with_expiry(at),
                None => log::warn!("share code lifetime {:?} is out of range, ignoring", lifetime),
            }
        }

        let created = self.store.create(record).await?;
        log::info!(
            "created share grant {} from {} ({} codes)",
            created.id,
            parent.source_id,
            created.codes.len()
        );
        Ok(created)
    }

    /// Delete every record of `source_id`. Returns how many were removed.
    ///
    /// Each delete is atomic but the batch is not. On a store failure the
    /// error is returned; calling again finishes the job. An empty
    /// `source_id` names no owner and is reported as not found.
    pub async fn destroy_by_source(&self, source_id: &str) -> Result<usize> {
        if source_id.is_empty() {
            return Err(PermissionError::NotFound(
                "permission records of an empty source".to_string(),
            ));
        }
        let records = self.store.find(&RecordFilter::source(source_id)).await?;
        let mut removed = 0;
        for record in &records {
            match self.store.delete(record).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    log::warn!(
                        "destroying permissions of {} failed after {} of {} records: {}",
                        source_id,
                        removed,
                        records.len(),
                        e
                    );
                    return Err(e.into());
                }
            }
        }
        if removed > 0 {
            log::info!("destroyed {} permission records of {}", removed, source_id);
        }
        Ok(removed)
    }

    /// Delete every record of the application `slug`, including the share
    /// records it derived.
    pub async fn destroy_application(&self, slug: &str) -> Result<usize> {
        let source_id = self.config.application_source_id(slug);
        self.destroy_by_source(&source_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Rule, Verb, VerbSet};
    use crate::record::MemoryRecordStore;
    use std::time::Duration;

    fn files_all() -> PermissionSet {
        PermissionSet::new().with_rule(Rule::new("io.cozy.files", VerbSet::all()))
    }

    fn codes(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_create_and_get_application_grant() {
        let manager = GrantManager::new(MemoryRecordStore::new());
        let created = manager
            .create_application_grant("drive", files_all())
            .await
            .unwrap();

        assert_eq!(created.source_id, "io.cozy.apps/drive");
        assert_eq!(created.record_type, RecordType::Application);

        let found = manager.get_for_application("drive").await.unwrap();
        assert_eq!(found, created);
    }

    #[tokio::test]
    async fn test_get_missing_application() {
        let manager = GrantManager::new(MemoryRecordStore::new());
        let err = manager.get_for_application("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_set() {
        let manager = GrantManager::new(MemoryRecordStore::new());
        let bad = PermissionSet::new().with_rule(Rule::new("", VerbSet::all()));
        let err = manager.create_application_grant("x", bad).await.unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[tokio::test]
    async fn test_derived_grant_gets_configured_expiry() {
        let config = PermissionConfig::builder()
            .share_code_lifetime(Duration::from_secs(3600))
            .build()
            .unwrap();
        let manager = GrantManager::new(MemoryRecordStore::new()).with_config(config);
        let app = manager
            .create_application_grant("drive", files_all())
            .await
            .unwrap();

        let before = Utc::now();
        let share = manager
            .create_derived_grant(
                &app,
                codes(&[("bob", "c1")]),
                PermissionSet::new()
                    .with_rule(Rule::new("io.cozy.files", Verb::Get.into()).with_values(["f1"])),
            )
            .await
            .unwrap();

        let expires_at = share.expires_at.unwrap();
        assert!(expires_at > before + chrono::Duration::minutes(59));
        assert!(!share.is_expired());
    }

    #[tokio::test]
    async fn test_derived_grant_without_lifetime_never_expires() {
        let manager = GrantManager::new(MemoryRecordStore::new());
        let app = manager
            .create_application_grant("drive", files_all())
            .await
            .unwrap();
        let share = manager
            .create_derived_grant(&app, codes(&[("bob", "c1")]), files_all())
            .await
            .unwrap();
        assert!(share.expires_at.is_none());
        assert_eq!(share.source_id, app.source_id);
    }

    #[tokio::test]
    async fn test_share_code_lookup_ignores_other_record_types() {
        let store = MemoryRecordStore::new();
        store
            .create(
                PermissionRecord::new(RecordType::Application, "io.cozy.apps/x", files_all())
                    .with_codes(codes(&[("k", "c1")])),
            )
            .await
            .unwrap();
        let manager = GrantManager::new(store);

        assert!(manager.get_for_share_code("c1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_destroy_application_counts_records() {
        let manager = GrantManager::new(MemoryRecordStore::new());
        let app = manager
            .create_application_grant("drive", files_all())
            .await
            .unwrap();
        manager
            .create_derived_grant(&app, codes(&[("a", "1")]), files_all())
            .await
            .unwrap();
        manager
            .create_application_grant("notes", files_all())
            .await
            .unwrap();

        assert_eq!(manager.destroy_application("drive").await.unwrap(), 2);
        assert_eq!(manager.destroy_application("drive").await.unwrap(), 0);
        assert!(manager.get_for_application("notes").await.is_ok());
    }

    #[tokio::test]
    async fn test_destroy_requires_a_source() {
        let store = MemoryRecordStore::new();
        store
            .create(PermissionRecord::new(RecordType::Sharing, "", files_all()))
            .await
            .unwrap();
        let manager = GrantManager::new(store);

        assert!(manager.destroy_by_source("").await.unwrap_err().is_not_found());
        let left = manager.store().find(&RecordFilter::source("")).await.unwrap();
        assert_eq!(left.len(), 1);
    }
}
