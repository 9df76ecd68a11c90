//! Permission records: the persisted envelope around a [`PermissionSet`].
//!
//! # Overview
//!
//! - **[`PermissionRecord`]**: identity, revision, type tag, source, set, codes, expiry
//! - **[`RecordStore`]**: trait for the document store collaborator
//! - **[`MemoryRecordStore`]**: in-memory store (cleared on exit)
//! - **[`GrantManager`]**: creates, derives, looks up and destroys records
//!
//! # Record types
//!
//! | Type | Created by | May derive sets |
//! |------|------------|-----------------|
//! | `register` | [`PermissionRecord::for_register_token`] (never stored) | no |
//! | `app` | [`GrantManager::create_application_grant`] | yes |
//! | `share` | [`GrantManager::create_derived_grant`] | no |
//! | `oauth` | [`PermissionRecord::for_oauth`] (never stored) | no |

mod manager;
mod store;

pub use manager::GrantManager;
pub use store::{next_revision, MemoryRecordStore, RecordFilter, RecordStore, StoreError};

use crate::config::PermissionConfig;
use crate::error::Result;
use crate::policy::{PermissionSet, Rule, Verb};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Doctype of permission records.
pub const PERMISSIONS_DOCTYPE: &str = "io.cozy.permissions";

/// Identity and revision accessors shared by every stored document kind.
pub trait Document {
    fn id(&self) -> &str;
    fn rev(&self) -> &str;
    fn doc_type(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn set_rev(&mut self, rev: String);
}

/// What kind of grant a record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// Temporary permissions of a register token
    #[serde(rename = "register")]
    Register,
    /// Permissions of an installed application
    #[serde(rename = "app")]
    Application,
    /// Permissions derived by an application for a sharing
    #[serde(rename = "share")]
    Sharing,
    /// Permissions of an OAuth token
    #[serde(rename = "oauth")]
    Oauth,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Register => "register",
            RecordType::Application => "app",
            RecordType::Sharing => "share",
            RecordType::Oauth => "oauth",
        }
    }

    /// Whether records of this type may be the parent of a derived set.
    pub fn can_derive(&self) -> bool {
        matches!(self, RecordType::Application)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored set of permissions and the metadata needed to find it again.
///
/// `codes` maps a redemption code name (usually a recipient) to the opaque
/// code a third party presents to use the grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(rename = "_rev", default, skip_serializing_if = "String::is_empty")]
    pub rev: String,

    #[serde(rename = "type")]
    pub record_type: RecordType,

    /// Back-reference to the owning entity, e.g. `io.cozy.apps/calendar`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_id: String,

    #[serde(default)]
    pub permissions: PermissionSet,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub codes: BTreeMap<String, String>,
}

impl PermissionRecord {
    /// Create an unsaved record.
    pub fn new(
        record_type: RecordType,
        source_id: impl Into<String>,
        permissions: PermissionSet,
    ) -> Self {
        Self {
            id: String::new(),
            rev: String::new(),
            record_type,
            source_id: source_id.into(),
            permissions,
            expires_at: None,
            codes: BTreeMap::new(),
        }
    }

    /// Non-persisted record holding the fixed permissions of a register
    /// token: read access to the instance settings document only.
    pub fn for_register_token(config: &PermissionConfig) -> Self {
        let rule = Rule::new(config.settings_doctype.clone(), Verb::Get.into())
            .with_values([config.instance_settings_id.clone()]);
        Self::new(
            RecordType::Register,
            String::new(),
            PermissionSet::new().with_rule(rule),
        )
    }

    /// Non-persisted record for an OAuth token, decoded from its scope.
    pub fn for_oauth(scope: &str) -> Result<Self> {
        let permissions = PermissionSet::from_scope(scope)?;
        Ok(Self::new(RecordType::Oauth, String::new(), permissions))
    }

    pub fn with_codes(mut self, codes: BTreeMap<String, String>) -> Self {
        self.codes = codes;
        self
    }

    /// Set the expiry, truncated to whole seconds as stored.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at =
            Some(DateTime::from_timestamp(expires_at.timestamp(), 0).unwrap_or(expires_at));
        self
    }

    /// True if the record has an expiry at or before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// True if `code` is one of the record's redemption codes.
    pub fn has_code(&self, code: &str) -> bool {
        self.codes.values().any(|c| c == code)
    }

    /// Whether the record has been saved.
    pub fn is_persisted(&self) -> bool {
        !self.id.is_empty()
    }

    /// API path of this record.
    pub fn links_self(&self) -> String {
        format!("/permissions/{}", self.id)
    }
}

impl Document for PermissionRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn rev(&self) -> &str {
        &self.rev
    }

    fn doc_type(&self) -> &str {
        PERMISSIONS_DOCTYPE
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn set_rev(&mut self, rev: String) {
        self.rev = rev;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::VerbSet;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_record_type_wire_names() {
        for t in [
            RecordType::Register,
            RecordType::Application,
            RecordType::Sharing,
            RecordType::Oauth,
        ] {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
            assert_eq!(serde_json::from_str::<RecordType>(&json).unwrap(), t);
        }
    }

    #[test]
    fn test_only_applications_can_derive() {
        assert!(RecordType::Application.can_derive());
        assert!(!RecordType::Register.can_derive());
        assert!(!RecordType::Sharing.can_derive());
        assert!(!RecordType::Oauth.can_derive());
    }

    #[test]
    fn test_register_token_record() {
        let record = PermissionRecord::for_register_token(&PermissionConfig::default());
        assert_eq!(record.record_type, RecordType::Register);
        assert!(!record.is_persisted());
        assert!(record
            .permissions
            .allows_id(Verb::Get, "io.cozy.settings", "io.cozy.settings.instance"));
        assert!(!record
            .permissions
            .allows_id(Verb::Put, "io.cozy.settings", "io.cozy.settings.instance"));
        assert!(!record.permissions.allows_whole_type(Verb::Get, "io.cozy.settings"));
    }

    #[test]
    fn test_oauth_record_from_scope() {
        let record = PermissionRecord::for_oauth("io.cozy.files:GET io.cozy.contacts:ALL").unwrap();
        assert_eq!(record.record_type, RecordType::Oauth);
        assert_eq!(record.permissions.len(), 2);

        assert!(PermissionRecord::for_oauth("io.cozy.files").is_err());
        assert!(PermissionRecord::for_oauth("io.cozy.files:GET:a:sel:extra").is_err());
    }

    #[test]
    fn test_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let record = PermissionRecord::new(RecordType::Sharing, "src", PermissionSet::new());
        assert!(!record.is_expired_at(now));

        let record = record.with_expiry(now + Duration::hours(1));
        assert!(!record.is_expired_at(now));
        assert!(record.is_expired_at(now + Duration::hours(1)));
    }

    #[test]
    fn test_expiry_is_kept_in_whole_seconds() {
        let at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 37).unwrap()
            + Duration::nanoseconds(323_837_838);
        let record = PermissionRecord::new(RecordType::Sharing, "src", PermissionSet::new())
            .with_expiry(at);
        assert_eq!(
            record.expires_at,
            Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 37).unwrap())
        );

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(serde_json::from_str::<PermissionRecord>(&json).unwrap(), record);
    }

    #[test]
    fn test_unknown_record_type_is_rejected() {
        assert!(serde_json::from_str::<RecordType>("\"admin\"").is_err());
    }

    #[test]
    fn test_has_code_matches_values_not_keys() {
        let record = PermissionRecord::new(RecordType::Sharing, "src", PermissionSet::new())
            .with_codes(BTreeMap::from([("bob".to_string(), "secret-1".to_string())]));
        assert!(record.has_code("secret-1"));
        assert!(!record.has_code("bob"));
    }

    #[test]
    fn test_document_accessors() {
        let mut record = PermissionRecord::new(RecordType::Application, "src", PermissionSet::new());
        record.set_id("p1".into());
        record.set_rev("1-abc".into());
        assert_eq!(Document::id(&record), "p1");
        assert_eq!(record.rev(), "1-abc");
        assert_eq!(record.doc_type(), PERMISSIONS_DOCTYPE);
        assert_eq!(record.links_self(), "/permissions/p1");
    }

    #[test]
    fn test_json_envelope() {
        let set = PermissionSet::new().with_rule(Rule::new("io.cozy.files", VerbSet::all()));
        let at = Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap();
        let record = PermissionRecord::new(RecordType::Sharing, "io.cozy.apps/drive", set)
            .with_codes(BTreeMap::from([("alice".to_string(), "c0de".to_string())]))
            .with_expiry(at);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "share",
                "source_id": "io.cozy.apps/drive",
                "permissions": [{ "type": "io.cozy.files", "verbs": ["ALL"] }],
                "expires_at": at.timestamp(),
                "codes": { "alice": "c0de" }
            })
        );

        let parsed: PermissionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_json_envelope_minimal() {
        let parsed: PermissionRecord = serde_json::from_value(serde_json::json!({
            "_id": "p1",
            "_rev": "2-x",
            "type": "app"
        }))
        .unwrap();
        assert_eq!(parsed.id, "p1");
        assert_eq!(parsed.record_type, RecordType::Application);
        assert!(parsed.permissions.is_empty());
        assert!(parsed.codes.is_empty());
        assert!(parsed.expires_at.is_none());
    }
}
