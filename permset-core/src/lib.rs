//! # Permset
//!
//! A capability-based permission policy engine.
//!
//! A permission set is a union of rules. Each rule grants some HTTP verbs on
//! one resource type, optionally narrowed to specific resource ids or to
//! specific values of a field. Sets can be checked for containment (can this
//! holder hand out that set?), encoded as compact scope strings, and
//! persisted as permission records through a pluggable store.
//!
//! ## Quick Start
//!
//! ```rust
//! use permset_core::{PermissionSet, Verb};
//!
//! # fn main() -> permset_core::Result<()> {
//! let app: PermissionSet = "io.cozy.files:ALL io.cozy.contacts:GET".parse()?;
//! let share: PermissionSet = "io.cozy.files:GET,PUT:doc1,doc2".parse()?;
//!
//! assert!(share.is_subset_of(&app));
//! assert!(app.allows_whole_type(Verb::Delete, "io.cozy.files"));
//! assert!(!share.allows_whole_type(Verb::Get, "io.cozy.files"));
//! assert!(share.allows_id(Verb::Put, "io.cozy.files", "doc2"));
//! assert!(!share.allows_id(Verb::Delete, "io.cozy.files", "doc2"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Subset check**: a child set never grants more than its parent
//! - **Scope strings**: `type:verbs[:values[:selector]]`, space separated
//! - **JSON**: rules as an array, or a manifest object keyed by title
//! - **Records**: application, share, register and OAuth grants via [`GrantManager`]
//! - **Triggers**: change-watch descriptors for shared rules ([`trigger`])
//!
//! ## Storage
//!
//! [`GrantManager`] works over any [`RecordStore`]. [`MemoryRecordStore`]
//! ships here; the `permset-store` crate provides a SQLite store.

pub mod config;
pub mod error;
pub mod policy;
pub mod record;
pub mod trigger;

pub use config::{ConfigError, PermissionConfig, PermissionConfigBuilder};
pub use error::{PermissionError, Result};
pub use policy::{PermissionSet, Rule, Verb, VerbSet, ALL_VERBS};
pub use record::{
    next_revision, Document, GrantManager, MemoryRecordStore, PermissionRecord, RecordFilter,
    RecordStore, RecordType, StoreError, PERMISSIONS_DOCTYPE,
};
pub use trigger::{SharingMessage, SharingTrigger, TriggerError, TriggerScheduler};
