//! A single access grant.

use super::verb::{Verb, VerbSet};
use crate::error::{PermissionError, Result};
use serde::{Deserialize, Serialize};

/// One access grant: a resource type, the verbs allowed on it, and an
/// optional restriction to specific values of one field.
///
/// - `values` empty: every resource of `doc_type` is covered.
/// - `selector` empty: `values` are resource identifiers.
/// - `selector` set: `values` constrain that field of the resource.
///
/// `title` and `description` are informational and never take part in
/// comparisons.
///
/// # Example
///
/// ```rust
/// use permset_core::{Rule, Verb, VerbSet};
///
/// let parent = Rule::new("io.cozy.files", VerbSet::all());
/// let child = Rule::new("io.cozy.files", Verb::Get.into()).with_values(["doc1"]);
///
/// assert!(child.is_subset_of(&parent));
/// assert!(!parent.is_subset_of(&child));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Human-readable name (the key in manifest-style JSON).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Resource type identifier, e.g. `io.cozy.files`.
    #[serde(rename = "type")]
    pub doc_type: String,

    pub verbs: VerbSet,

    /// Allowed values of `selector`; empty means unrestricted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,

    /// Field constrained by `values`; empty means the resource identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub selector: String,
}

impl Rule {
    /// Create an unrestricted rule for `doc_type`.
    pub fn new(doc_type: impl Into<String>, verbs: VerbSet) -> Self {
        Self {
            title: None,
            description: None,
            doc_type: doc_type.into(),
            verbs,
            values: Vec::new(),
            selector: String::new(),
        }
    }

    /// Restrict the rule to the given values.
    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Set the field the values apply to.
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = selector.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// True when the rule covers every resource of its type.
    pub fn is_unrestricted(&self) -> bool {
        self.values.is_empty()
    }

    /// Structural comparability: same type and same selector.
    pub fn matches(&self, doc_type: &str, selector: &str) -> bool {
        self.doc_type == doc_type && self.selector == selector
    }

    /// True when every value this rule can reach is reachable through `parent`.
    ///
    /// An unrestricted rule is only covered by an unrestricted parent.
    pub fn values_subset_of(&self, parent: &Rule) -> bool {
        if parent.values.is_empty() {
            return true;
        }
        !self.values.is_empty() && self.values.iter().all(|v| parent.values.contains(v))
    }

    /// True when `parent` alone grants everything this rule grants.
    pub fn is_subset_of(&self, parent: &Rule) -> bool {
        self.matches(&parent.doc_type, &parent.selector)
            && self.verbs.is_subset_of(&parent.verbs)
            && self.values_subset_of(parent)
    }

    /// True when the rule grants `verb` on every resource of `doc_type`.
    pub fn grants_whole_type(&self, verb: Verb, doc_type: &str) -> bool {
        self.doc_type == doc_type && self.verbs.contains(verb) && self.is_unrestricted()
    }

    /// True when the rule grants `verb` on a resource of `doc_type` whose
    /// `selector` field equals `value` (an empty selector means the id).
    pub fn grants_value(&self, verb: Verb, doc_type: &str, selector: &str, value: &str) -> bool {
        if self.doc_type != doc_type || !self.verbs.contains(verb) {
            return false;
        }
        self.is_unrestricted() || (self.selector == selector && self.values.iter().any(|v| v == value))
    }

    /// Check that the rule is well-formed.
    ///
    /// A well-formed rule has a non-empty type and verb set, names a
    /// selector only together with values, and contains no character the
    /// scope encoding reserves (whitespace and `:` everywhere, `,` inside
    /// values).
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(PermissionError::InvalidRule(format!(
                "{}: {}",
                self.label(),
                reason
            )))
        };

        if self.doc_type.is_empty() {
            return invalid("empty type");
        }
        if has_reserved(&self.doc_type) {
            return invalid("type contains a reserved character");
        }
        if self.verbs.is_empty() {
            return invalid("no verbs");
        }
        if !self.selector.is_empty() && self.values.is_empty() {
            return invalid("selector given without values");
        }
        if has_reserved(&self.selector) {
            return invalid("selector contains a reserved character");
        }
        for value in &self.values {
            if value.is_empty() {
                return invalid("empty value");
            }
            if has_reserved(value) || value.contains(',') {
                return invalid("value contains a reserved character");
            }
        }
        Ok(())
    }

    /// Name used in diagnostics: the title if any, else the type.
    fn label(&self) -> &str {
        match &self.title {
            Some(title) => title.as_str(),
            None if self.doc_type.is_empty() => "<untyped rule>",
            None => self.doc_type.as_str(),
        }
    }
}

fn has_reserved(s: &str) -> bool {
    s.chars().any(|c| c == ':' || c.is_whitespace())
}
