//! HTTP verbs and the verb sets carried by rules.
//!
//! A [`VerbSet`] is either the `ALL` wildcard or an explicit subset of the
//! five concrete verbs. The wildcard is not the same thing as "all five
//! verbs": it also covers any verb added later, so a set listing every
//! concrete verb is still not a superset of the wildcard.

use crate::error::PermissionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Literal used for the wildcard in scope strings and JSON.
pub const ALL_VERBS: &str = "ALL";

/// A single HTTP verb a rule can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    /// Every concrete verb, in canonical order.
    pub const CONCRETE: [Verb; 5] = [Verb::Get, Verb::Post, Verb::Put, Verb::Patch, Verb::Delete];

    /// Upper-case wire name of the verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Verb::Get),
            "POST" => Ok(Verb::Post),
            "PUT" => Ok(Verb::Put),
            "PATCH" => Ok(Verb::Patch),
            "DELETE" => Ok(Verb::Delete),
            other => Err(PermissionError::InvalidVerb(other.to_string())),
        }
    }
}

const WILDCARD_BIT: u8 = 1 << 7;

/// A set of verbs, or the `ALL` wildcard.
///
/// # Example
///
/// ```rust
/// use permset_core::{Verb, VerbSet};
///
/// let read_write: VerbSet = "GET,POST".parse().unwrap();
/// assert!(read_write.contains(Verb::Get));
/// assert!(!read_write.contains(Verb::Delete));
///
/// assert!(read_write.is_subset_of(&VerbSet::all()));
/// assert!(!VerbSet::all().is_subset_of(&read_write));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct VerbSet {
    bits: u8,
}

impl VerbSet {
    /// The empty set. Not valid on a rule, but useful as a starting point.
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    /// The `ALL` wildcard.
    pub const fn all() -> Self {
        Self { bits: WILDCARD_BIT }
    }

    /// Build a set from explicit verbs.
    pub fn new(verbs: impl IntoIterator<Item = Verb>) -> Self {
        verbs.into_iter().collect()
    }

    /// Return a copy of this set that also contains `verb`.
    ///
    /// Adding to the wildcard leaves it unchanged.
    pub fn with(self, verb: Verb) -> Self {
        if self.is_all() {
            return self;
        }
        Self {
            bits: self.bits | verb.bit(),
        }
    }

    /// Whether this is the `ALL` wildcard.
    pub fn is_all(&self) -> bool {
        self.bits & WILDCARD_BIT != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// True if the set is the wildcard or lists `verb` explicitly.
    pub fn contains(&self, verb: Verb) -> bool {
        self.is_all() || self.bits & verb.bit() != 0
    }

    /// True if every verb granted here is also granted by `other`.
    ///
    /// Only the wildcard covers the wildcard.
    pub fn is_subset_of(&self, other: &VerbSet) -> bool {
        if other.is_all() {
            return true;
        }
        if self.is_all() {
            return false;
        }
        self.bits & !other.bits == 0
    }

    /// Concrete verbs contained in this set, in canonical order.
    ///
    /// The wildcard yields all five concrete verbs.
    pub fn iter(&self) -> impl Iterator<Item = Verb> + '_ {
        Verb::CONCRETE
            .into_iter()
            .filter(move |v| self.contains(*v))
    }
}

impl FromIterator<Verb> for VerbSet {
    fn from_iter<I: IntoIterator<Item = Verb>>(iter: I) -> Self {
        iter.into_iter().fold(VerbSet::empty(), VerbSet::with)
    }
}

impl From<Verb> for VerbSet {
    fn from(verb: Verb) -> Self {
        VerbSet::empty().with(verb)
    }
}

impl fmt::Display for VerbSet {
    /// Comma-separated verb list, or `ALL`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            return f.write_str(ALL_VERBS);
        }
        let names: Vec<&str> = self.iter().map(|v| v.as_str()).collect();
        f.write_str(&names.join(","))
    }
}

impl fmt::Debug for VerbSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerbSet({})", self)
    }
}

impl FromStr for VerbSet {
    type Err = PermissionError;

    /// Parse `ALL` or a comma-separated list of verb names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',').map(parse_verb_name).collect()
    }
}

/// Parse one verb name, mapping `ALL` to the wildcard.
fn parse_verb_name(name: &str) -> Result<VerbSet, PermissionError> {
    if name == ALL_VERBS {
        Ok(VerbSet::all())
    } else {
        name.parse::<Verb>().map(VerbSet::from)
    }
}

impl FromIterator<VerbSet> for VerbSet {
    fn from_iter<I: IntoIterator<Item = VerbSet>>(iter: I) -> Self {
        iter.into_iter().fold(VerbSet::empty(), |acc, set| {
            if acc.is_all() || set.is_all() {
                VerbSet::all()
            } else {
                VerbSet {
                    bits: acc.bits | set.bits,
                }
            }
        })
    }
}

impl TryFrom<Vec<String>> for VerbSet {
    type Error = PermissionError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        names.iter().map(|n| parse_verb_name(n)).collect()
    }
}

impl From<VerbSet> for Vec<String> {
    fn from(set: VerbSet) -> Self {
        if set.is_all() {
            vec![ALL_VERBS.to_string()]
        } else {
            set.iter().map(|v| v.as_str().to_string()).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_round_trip_names() {
        for verb in Verb::CONCRETE {
            assert_eq!(verb.as_str().parse::<Verb>().unwrap(), verb);
        }
    }

    #[test]
    fn test_unknown_verb_is_rejected() {
        let err = "HEAD".parse::<Verb>().unwrap_err();
        assert!(matches!(err, PermissionError::InvalidVerb(ref v) if v == "HEAD"));

        // Names are case-sensitive
        assert!("get".parse::<Verb>().is_err());
    }

    #[test]
    fn test_contains() {
        let set = VerbSet::new([Verb::Get, Verb::Post]);
        assert!(set.contains(Verb::Get));
        assert!(set.contains(Verb::Post));
        assert!(!set.contains(Verb::Delete));

        for verb in Verb::CONCRETE {
            assert!(VerbSet::all().contains(verb));
        }
    }

    #[test]
    fn test_subset_of_explicit_sets() {
        let get = VerbSet::from(Verb::Get);
        let get_post = VerbSet::new([Verb::Get, Verb::Post]);
        let get_post_delete = get_post.with(Verb::Delete);

        assert!(get.is_subset_of(&get_post));
        assert!(get_post.is_subset_of(&get_post));
        assert!(!get_post_delete.is_subset_of(&get_post));
    }

    #[test]
    fn test_wildcard_is_not_covered_by_every_concrete_verb() {
        let every = VerbSet::new(Verb::CONCRETE);
        assert!(every.is_subset_of(&VerbSet::all()));
        assert!(!VerbSet::all().is_subset_of(&every));
        assert!(VerbSet::all().is_subset_of(&VerbSet::all()));
    }

    #[test]
    fn test_with_on_wildcard_keeps_wildcard() {
        let set = VerbSet::all().with(Verb::Get);
        assert!(set.is_all());
        assert_eq!(set, VerbSet::all());
    }

    #[test]
    fn test_parse_list_and_wildcard() {
        let set: VerbSet = "GET,PATCH".parse().unwrap();
        assert_eq!(set, VerbSet::new([Verb::Get, Verb::Patch]));

        let all: VerbSet = "ALL".parse().unwrap();
        assert!(all.is_all());

        // ALL alongside explicit verbs normalizes to the wildcard
        let mixed: VerbSet = "GET,ALL".parse().unwrap();
        assert_eq!(mixed, VerbSet::all());
    }

    #[test]
    fn test_parse_rejects_empty_entries() {
        assert!("".parse::<VerbSet>().is_err());
        assert!("GET,,POST".parse::<VerbSet>().is_err());
        assert!("GET,FETCH".parse::<VerbSet>().is_err());
    }

    #[test]
    fn test_display_uses_canonical_order() {
        let set = VerbSet::new([Verb::Delete, Verb::Get, Verb::Put]);
        assert_eq!(set.to_string(), "GET,PUT,DELETE");
        assert_eq!(VerbSet::all().to_string(), "ALL");
    }

    #[test]
    fn test_serde_as_string_array() {
        let set = VerbSet::new([Verb::Get, Verb::Post]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["GET","POST"]"#);

        let parsed: VerbSet = serde_json::from_str(r#"["ALL"]"#).unwrap();
        assert!(parsed.is_all());

        let bad: Result<VerbSet, _> = serde_json::from_str(r#"["GET","TRACE"]"#);
        assert!(bad.is_err());
    }
}
