//! The permission policy engine.
//!
//! Everything in this module is pure: no I/O, no shared mutable state. All
//! types are `Send + Sync` and can be shared freely once built.
//!
//! # Overview
//!
//! - **[`VerbSet`]**: GET/POST/PUT/PATCH/DELETE, or the `ALL` wildcard
//! - **[`Rule`]**: one grant (type, verbs, optional values and selector)
//! - **[`PermissionSet`]**: a union of rules, with the subset check
//! - **Scope codec**: [`PermissionSet::to_scope`] / [`PermissionSet::from_scope`]
//!
//! # Subset semantics
//!
//! | Child rule | Covered by parent rule when |
//! |------------|-----------------------------|
//! | type, selector | identical |
//! | verbs | parent is `ALL`, or lists every child verb |
//! | values | parent has none, or child has some and all are listed by parent |
//!
//! A child set is a subset when each of its rules is covered by one parent
//! rule.

mod rule;
mod scope;
mod set;
mod verb;

pub use rule::Rule;
pub use set::PermissionSet;
pub use verb::{Verb, VerbSet, ALL_VERBS};
