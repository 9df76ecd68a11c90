//! Record store abstraction and the in-memory implementation.

use super::{PermissionRecord, RecordType};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in a record store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record's revision does not match the stored one
    #[error("revision conflict: {0}")]
    Conflict(String),

    /// A record already exists for the same (source id, type)
    #[error("record already exists: {0}")]
    Exists(String),

    /// Update of a record that is not stored
    #[error("record not found: {0}")]
    NotFound(String),

    /// Storage backend error
    #[error("backend error: {0}")]
    Backend(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if the same call may succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::Io(_))
    }
}

/// The `(source_id, type)` index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub source_id: String,
    pub record_type: Option<RecordType>,
}

impl RecordFilter {
    /// Every record of a source.
    pub fn source(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            record_type: None,
        }
    }

    pub fn with_type(mut self, record_type: RecordType) -> Self {
        self.record_type = Some(record_type);
        self
    }

    pub fn matches(&self, record: &PermissionRecord) -> bool {
        record.source_id == self.source_id
            && self.record_type.map_or(true, |t| t == record.record_type)
    }
}

/// Next revision string after `current` (`"<n+1>-<random>"`).
///
/// An empty or unparseable revision counts as generation zero.
pub fn next_revision(current: &str) -> String {
    let generation = current
        .split_once('-')
        .and_then(|(n, _)| n.parse::<u64>().ok())
        .unwrap_or(0);
    format!("{}-{}", generation + 1, Uuid::new_v4().simple())
}

/// Trait for permission record storage backends
///
/// `create` and `create_exclusive` assign an id (when empty) and the first
/// revision, and return the stored record. `update` advances the revision.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Get a record by id
    async fn get(&self, id: &str) -> Result<Option<PermissionRecord>, StoreError>;

    /// All records matching the filter
    async fn find(&self, filter: &RecordFilter) -> Result<Vec<PermissionRecord>, StoreError>;

    /// First record matching the filter
    async fn find_one(
        &self,
        filter: &RecordFilter,
    ) -> Result<Option<PermissionRecord>, StoreError> {
        Ok(self.find(filter).await?.into_iter().next())
    }

    /// All records holding `code` among their code values
    async fn find_by_code(&self, code: &str) -> Result<Vec<PermissionRecord>, StoreError>;

    /// Store a new record
    async fn create(&self, record: PermissionRecord) -> Result<PermissionRecord, StoreError>;

    /// Store a new record unless one exists with the same source id and type.
    ///
    /// The check and the insert are a single atomic step.
    async fn create_exclusive(
        &self,
        record: PermissionRecord,
    ) -> Result<PermissionRecord, StoreError>;

    /// Replace a stored record. Fails with [`StoreError::Conflict`] if its
    /// revision is stale.
    async fn update(&self, record: PermissionRecord) -> Result<PermissionRecord, StoreError>;

    /// Delete a record. Returns false if it was not stored.
    async fn delete(&self, record: &PermissionRecord) -> Result<bool, StoreError>;
}

/// In-memory record store
///
/// Records live in a map keyed by id; nothing is persisted. Suitable for
/// tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<String, PermissionRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn insert(
        records: &mut BTreeMap<String, PermissionRecord>,
        mut record: PermissionRecord,
    ) -> Result<PermissionRecord, StoreError> {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().simple().to_string();
        } else if records.contains_key(&record.id) {
            return Err(StoreError::Conflict(format!(
                "id {} is already taken",
                record.id
            )));
        }
        record.rev = next_revision("");
        records.insert(record.id.clone(), record.clone());
        Ok(record)
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, id: &str) -> Result<Option<PermissionRecord>, StoreError> {
        Ok(self.records.read().get(id).cloned())
    }

    async fn find(&self, filter: &RecordFilter) -> Result<Vec<PermissionRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn find_by_code(&self, code: &str) -> Result<Vec<PermissionRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.has_code(code))
            .cloned()
            .collect())
    }

    async fn create(&self, record: PermissionRecord) -> Result<PermissionRecord, StoreError> {
        Self::insert(&mut self.records.write(), record)
    }

    async fn create_exclusive(
        &self,
        record: PermissionRecord,
    ) -> Result<PermissionRecord, StoreError> {
        let mut records = self.records.write();
        let filter = RecordFilter::source(record.source_id.clone()).with_type(record.record_type);
        if records.values().any(|r| filter.matches(r)) {
            return Err(StoreError::Exists(format!(
                "{} ({})",
                record.source_id, record.record_type
            )));
        }
        Self::insert(&mut records, record)
    }

    async fn update(&self, mut record: PermissionRecord) -> Result<PermissionRecord, StoreError> {
        let mut records = self.records.write();
        let stored = records
            .get(&record.id)
            .ok_or_else(|| StoreError::NotFound(record.id.clone()))?;
        if stored.rev != record.rev {
            return Err(StoreError::Conflict(format!(
                "record {} is at revision {}, got {}",
                record.id, stored.rev, record.rev
            )));
        }
        record.rev = next_revision(&record.rev);
        records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn delete(&self, record: &PermissionRecord) -> Result<bool, StoreError> {
        Ok(self.records.write().remove(&record.id).is_some())
    }
}
