//! Common test utilities shared across test files.
//!
//! Items here may not be used by all test files, hence the module-level allow.
#![allow(dead_code)]

use async_trait::async_trait;
use permset_core::{
    MemoryRecordStore, PermissionRecord, PermissionSet, RecordFilter, RecordStore, Rule,
    StoreError, Verb, VerbSet,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ===== Fixtures =====

pub fn set(scope: &str) -> PermissionSet {
    scope.parse().expect("test scope must parse")
}

pub fn codes(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn files(verbs: VerbSet) -> Rule {
    Rule::new("io.cozy.files", verbs)
}

pub fn get_post() -> VerbSet {
    VerbSet::new([Verb::Get, Verb::Post])
}

// ===== Failing Store =====

/// A store that delegates to a [`MemoryRecordStore`] but fails deletes once
/// its delete budget is spent.
///
/// The budget is shared, so a test can keep a handle and refill it after the
/// store has been moved into a manager.
pub struct FlakyStore {
    pub inner: Arc<MemoryRecordStore>,
    budget: Arc<AtomicUsize>,
    yield_on_read: bool,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryRecordStore>, deletes_allowed: usize) -> Self {
        Self {
            inner,
            budget: Arc::new(AtomicUsize::new(deletes_allowed)),
            yield_on_read: false,
        }
    }

    /// Yield to the runtime before every read, so concurrent tasks
    /// interleave between a read and the write that follows it.
    pub fn yielding_reads(mut self) -> Self {
        self.yield_on_read = true;
        self
    }

    async fn before_read(&self) {
        if self.yield_on_read {
            tokio::task::yield_now().await;
        }
    }

    /// Shared handle on the remaining delete budget.
    pub fn budget(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.budget)
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn get(&self, id: &str) -> Result<Option<PermissionRecord>, StoreError> {
        self.before_read().await;
        self.inner.get(id).await
    }

    async fn find(&self, filter: &RecordFilter) -> Result<Vec<PermissionRecord>, StoreError> {
        self.before_read().await;
        self.inner.find(filter).await
    }

    async fn find_by_code(&self, code: &str) -> Result<Vec<PermissionRecord>, StoreError> {
        self.inner.find_by_code(code).await
    }

    async fn create(&self, record: PermissionRecord) -> Result<PermissionRecord, StoreError> {
        self.inner.create(record).await
    }

    async fn create_exclusive(
        &self,
        record: PermissionRecord,
    ) -> Result<PermissionRecord, StoreError> {
        self.inner.create_exclusive(record).await
    }

    async fn update(&self, record: PermissionRecord) -> Result<PermissionRecord, StoreError> {
        self.inner.update(record).await
    }

    async fn delete(&self, record: &PermissionRecord) -> Result<bool, StoreError> {
        let spent = self
            .budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err();
        if spent {
            return Err(StoreError::Backend("connection reset".into()));
        }
        self.inner.delete(record).await
    }
}
