//! SQLite storage for permset permission records.
//!
//! [`SqliteRecordStore`] implements [`permset_core::RecordStore`] on top of a
//! single SQLite file, so grants survive restarts. Plug it into a
//! [`permset_core::GrantManager`] in place of the in-memory store.

mod store;

pub use store::SqliteRecordStore;
