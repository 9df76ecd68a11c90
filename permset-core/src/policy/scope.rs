//! Compact string encoding of permission sets.
//!
//! A scope string is a space-separated list of rule tokens:
//!
//! ```text
//! rule-token := type ":" verbs [ ":" values [ ":" selector ] ]
//! verbs      := "ALL" | verb ("," verb)*
//! values     := value ("," value)*
//! ```
//!
//! It is used as an OAuth scope and inside sharing codes. Existing
//! encodings never change when verbs are added: verbs are written in a
//! fixed canonical order and the wildcard is always the literal `ALL`.

use super::rule::Rule;
use super::set::PermissionSet;
use super::verb::VerbSet;
use crate::error::{PermissionError, Result};
use std::fmt;
use std::str::FromStr;

const RULE_SEPARATOR: &str = " ";
const FIELD_SEPARATOR: char = ':';
const LIST_SEPARATOR: char = ',';
const MAX_FIELDS: usize = 4;

impl Rule {
    /// Encode this rule as one scope token.
    ///
    /// A selector is only written when the rule has values; a rule naming a
    /// selector without values is not well-formed and loses the selector.
    pub fn to_scope_token(&self) -> String {
        let mut token = format!("{}{}{}", self.doc_type, FIELD_SEPARATOR, self.verbs);
        if !self.values.is_empty() {
            token.push(FIELD_SEPARATOR);
            token.push_str(&self.values.join(","));
            if !self.selector.is_empty() {
                token.push(FIELD_SEPARATOR);
                token.push_str(&self.selector);
            }
        }
        token
    }

    /// Decode one scope token.
    pub fn from_scope_token(token: &str) -> Result<Rule> {
        if token.split(FIELD_SEPARATOR).count() > MAX_FIELDS {
            return Err(PermissionError::invalid_scope(token, "too many fields"));
        }
        let mut fields = token.split(FIELD_SEPARATOR);

        let doc_type = fields.next().unwrap_or_default();
        if doc_type.is_empty() {
            return Err(PermissionError::invalid_scope(token, "missing type"));
        }

        let verbs = match fields.next() {
            None => return Err(PermissionError::invalid_scope(token, "missing verbs field")),
            Some("") => return Err(PermissionError::invalid_scope(token, "empty verbs field")),
            Some(field) => field
                .parse::<VerbSet>()
                .map_err(|e| PermissionError::invalid_scope(token, e.to_string()))?,
        };

        let values_field = fields.next();
        let selector_field = fields.next();

        let values = match (values_field, selector_field) {
            (None, _) => Vec::new(),
            (Some(""), Some(_)) => {
                return Err(PermissionError::invalid_scope(
                    token,
                    "selector given without values",
                ))
            }
            (Some(""), None) => {
                return Err(PermissionError::invalid_scope(token, "empty values field"))
            }
            (Some(field), _) => {
                let values: Vec<String> = field.split(LIST_SEPARATOR).map(String::from).collect();
                if values.iter().any(String::is_empty) {
                    return Err(PermissionError::invalid_scope(token, "empty value"));
                }
                values
            }
        };

        let selector = match selector_field {
            None => String::new(),
            Some("") => return Err(PermissionError::invalid_scope(token, "empty selector field")),
            Some(field) => field.to_string(),
        };

        Ok(Rule::new(doc_type, verbs)
            .with_values(values)
            .with_selector(selector))
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_scope_token())
    }
}

impl PermissionSet {
    /// Encode the set as a scope string.
    ///
    /// # Example
    ///
    /// ```rust
    /// use permset_core::{PermissionSet, Rule, Verb, VerbSet};
    ///
    /// let set = PermissionSet::new()
    ///     .with_rule(Rule::new("io.cozy.files", VerbSet::all()))
    ///     .with_rule(
    ///         Rule::new("io.cozy.contacts", VerbSet::new([Verb::Get, Verb::Post]))
    ///             .with_values(["123", "456"])
    ///             .with_selector("group"),
    ///     );
    ///
    /// assert_eq!(
    ///     set.to_scope(),
    ///     "io.cozy.files:ALL io.cozy.contacts:GET,POST:123,456:group"
    /// );
    /// ```
    pub fn to_scope(&self) -> String {
        self.iter()
            .map(Rule::to_scope_token)
            .collect::<Vec<_>>()
            .join(RULE_SEPARATOR)
    }

    /// Decode a scope string.
    ///
    /// The empty string decodes to an empty set (no authority). Any
    /// malformed token fails the whole decode with
    /// [`PermissionError::InvalidScope`].
    pub fn from_scope(scope: &str) -> Result<PermissionSet> {
        scope
            .split_whitespace()
            .map(Rule::from_scope_token)
            .collect()
    }
}

impl FromStr for PermissionSet {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self> {
        PermissionSet::from_scope(s)
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_scope())
    }
}
