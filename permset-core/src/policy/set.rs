//! Permission sets and subset containment.

use super::rule::Rule;
use super::verb::Verb;
use crate::error::{PermissionError, Result};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// An ordered collection of [`Rule`]s, denoting the union of their grants.
///
/// Rule order carries no meaning. Several rules may share a type and
/// selector (for example with disjoint verbs); the subset check handles
/// such layered grants rule by rule.
///
/// Sets are values: the builder methods consume and return a new set, and
/// nothing mutates a set once it is shared.
///
/// # Example
///
/// ```rust
/// use permset_core::{PermissionSet, Rule, Verb, VerbSet};
///
/// let app = PermissionSet::new()
///     .with_rule(Rule::new("io.cozy.files", VerbSet::new([Verb::Get, Verb::Post])));
///
/// let share = PermissionSet::new()
///     .with_rule(Rule::new("io.cozy.files", Verb::Get.into()).with_values(["doc1"]));
///
/// assert!(share.is_subset_of(&app));
/// assert!(!app.is_subset_of(&share));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "SetRepr")]
pub struct PermissionSet {
    rules: Vec<Rule>,
}

impl PermissionSet {
    /// Create an empty set (no authority).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Return a new set with `rule` appended.
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules of this set that no single rule of `parent` covers.
    pub fn uncovered_rules<'a>(
        &'a self,
        parent: &'a PermissionSet,
    ) -> impl Iterator<Item = &'a Rule> + 'a {
        self.rules
            .iter()
            .filter(move |rule| !parent.rules.iter().any(|p| rule.is_subset_of(p)))
    }

    /// True iff every rule of this set is a subset of at least one rule of
    /// `parent`.
    ///
    /// Coverage is never assembled from several parent rules: each rule must
    /// be dominated by one parent rule on its own.
    pub fn is_subset_of(&self, parent: &PermissionSet) -> bool {
        self.uncovered_rules(parent).next().is_none()
    }

    /// Like [`is_subset_of`](Self::is_subset_of), but as an authorization
    /// check returning [`PermissionError::NotSubset`].
    pub fn ensure_subset_of(&self, parent: &PermissionSet) -> Result<()> {
        match self.uncovered_rules(parent).next() {
            None => Ok(()),
            Some(rule) => {
                log::debug!(
                    "rejecting permission set: rule {} is not covered by the parent set",
                    rule
                );
                Err(PermissionError::NotSubset)
            }
        }
    }

    /// Equal authority: each set is a subset of the other.
    pub fn is_equivalent_to(&self, other: &PermissionSet) -> bool {
        self.is_subset_of(other) && other.is_subset_of(self)
    }

    /// Validate every rule of the set.
    pub fn validate(&self) -> Result<()> {
        self.rules.iter().try_for_each(Rule::validate)
    }

    /// True if some rule grants `verb` on every resource of `doc_type`.
    pub fn allows_whole_type(&self, verb: Verb, doc_type: &str) -> bool {
        self.rules.iter().any(|r| r.grants_whole_type(verb, doc_type))
    }

    /// True if some rule grants `verb` on the resource `id` of `doc_type`.
    pub fn allows_id(&self, verb: Verb, doc_type: &str, id: &str) -> bool {
        self.rules
            .iter()
            .any(|r| r.grants_value(verb, doc_type, "", id))
    }

    /// True if some rule grants `verb` on resources of `doc_type` whose
    /// `field` equals `value`.
    pub fn allows_field(&self, verb: Verb, doc_type: &str, field: &str, value: &str) -> bool {
        self.rules
            .iter()
            .any(|r| r.grants_value(verb, doc_type, field, value))
    }
}

impl Serialize for PermissionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.rules)
    }
}

/// Accepted JSON forms: a plain array of rules, or an object keyed by rule
/// title (the application manifest form).
#[derive(Deserialize)]
#[serde(untagged)]
enum SetRepr {
    List(Vec<Rule>),
    Named(BTreeMap<String, Rule>),
}

impl From<SetRepr> for PermissionSet {
    fn from(repr: SetRepr) -> Self {
        match repr {
            SetRepr::List(rules) => Self { rules },
            SetRepr::Named(named) => Self {
                rules: named
                    .into_iter()
                    .map(|(title, mut rule)| {
                        rule.title.get_or_insert(title);
                        rule
                    })
                    .collect(),
            },
        }
    }
}

impl FromIterator<Rule> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for PermissionSet {
    type Item = Rule;
    type IntoIter = std::vec::IntoIter<Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.into_iter()
    }
}

impl<'a> IntoIterator for &'a PermissionSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
