//! Change-watch triggers for shared rules.
//!
//! When a rule is shared, the sharing side wants to hear about every
//! change to the documents the rule covers. This module only builds the
//! trigger descriptors; running the watch is the job of an external
//! scheduler reached through [`TriggerScheduler`].

use crate::policy::{PermissionSet, Rule};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Worker that receives sharing update messages.
pub const WORKER_TYPE_SHARING_UPDATES: &str = "sharingupdates";

/// Trigger type for document events.
pub const EVENT_TRIGGER_TYPE: &str = "@event";

const ALL_EVENTS: &str = "CREATED,UPDATED,DELETED";
const DELETE_EVENTS: &str = "DELETED";

/// Payload handed to the worker when a watched document changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingMessage {
    pub sharing_id: String,
    pub rule: Rule,
}

/// An event trigger watching the documents covered by one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingTrigger {
    #[serde(rename = "type")]
    pub trigger_type: String,
    pub worker_type: String,
    pub arguments: String,
    pub message: SharingMessage,
}

impl SharingTrigger {
    /// Build the trigger for `rule`.
    ///
    /// With `deletions_only` the trigger fires on deletions only, as used on
    /// the recipient side of a one-way sharing to detect revocation. A rule
    /// with a selector always watches every event.
    ///
    /// # Example
    ///
    /// ```rust
    /// use permset_core::trigger::SharingTrigger;
    /// use permset_core::{Rule, VerbSet};
    ///
    /// let rule = Rule::new("io.cozy.files", VerbSet::all()).with_values(["a", "b"]);
    /// let trigger = SharingTrigger::for_rule("sharing-1", rule, true);
    /// assert_eq!(trigger.arguments, "io.cozy.files:DELETED:a,b");
    /// ```
    pub fn for_rule(sharing_id: impl Into<String>, rule: Rule, deletions_only: bool) -> Self {
        Self {
            trigger_type: EVENT_TRIGGER_TYPE.to_string(),
            worker_type: WORKER_TYPE_SHARING_UPDATES.to_string(),
            arguments: event_arguments(&rule, deletions_only),
            message: SharingMessage {
                sharing_id: sharing_id.into(),
                rule,
            },
        }
    }
}

fn event_arguments(rule: &Rule, deletions_only: bool) -> String {
    let events = if deletions_only && rule.selector.is_empty() {
        DELETE_EVENTS
    } else {
        ALL_EVENTS
    };
    let mut args = format!("{}:{}", rule.doc_type, events);
    if !rule.values.is_empty() {
        args.push(':');
        args.push_str(&rule.values.join(","));
        if !rule.selector.is_empty() {
            args.push(':');
            args.push_str(&rule.selector);
        }
    }
    args
}

/// Errors reported by a trigger scheduler
#[derive(Debug, Error)]
pub enum TriggerError {
    /// The scheduler refused the trigger
    #[error("trigger rejected: {0}")]
    Rejected(String),

    /// The scheduler could not be reached or failed
    #[error("scheduler error: {0}")]
    Backend(String),
}

/// The external job scheduler that runs triggers.
#[async_trait]
pub trait TriggerScheduler: Send + Sync {
    /// Register a trigger
    async fn add(&self, trigger: SharingTrigger) -> Result<(), TriggerError>;
}

/// Register one trigger per rule of `permissions`. Returns how many were added.
///
/// Stops at the first scheduler error; triggers added before it stay.
pub async fn register_sharing_triggers(
    scheduler: &dyn TriggerScheduler,
    sharing_id: &str,
    permissions: &PermissionSet,
    deletions_only: bool,
) -> Result<usize, TriggerError> {
    let mut added = 0;
    for rule in permissions {
        scheduler
            .add(SharingTrigger::for_rule(sharing_id, rule.clone(), deletions_only))
            .await?;
        added += 1;
    }
    log::info!(
        "registered {} sharing triggers for sharing {}",
        added,
        sharing_id
    );
    Ok(added)
}
