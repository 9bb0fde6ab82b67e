//! Entity kind and tag vocabulary.
//!
//! Every entity carries an explicit [`EntityKind`] (`"bug_base"`, `"trigger"`)
//! alongside its unique string identifier. The registry indexes entities by
//! kind; identifier-prefix queries remain available for data that encodes the
//! kind in the identifier (`"bug_base3"`).

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Free-form collision-group and lookup tags (`"enemy"`, `"player_projectile"`).
pub type Tags = BTreeSet<String>;

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

/// The kind of an entity, as named by level data and factories.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKind(String);

impl EntityKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityKind {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for EntityKind {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&EntityKind> for EntityKind {
    fn from(value: &EntityKind) -> Self {
        value.clone()
    }
}

impl PartialEq<str> for EntityKind {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for EntityKind {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Debug for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityKind({})", self.0)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether any tag in `wanted` is present in `tags`.
pub fn intersects<'a>(wanted: impl IntoIterator<Item = &'a String>, tags: &Tags) -> bool {
    wanted.into_iter().any(|tag| tags.contains(tag))
}
