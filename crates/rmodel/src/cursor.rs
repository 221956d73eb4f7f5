//! Hierarchical key paths.
//!
//! A [`Cursor`] is the position of a record or field in the object tree. Its
//! `key` is the store key the position maps to: all path segments joined by
//! [`DELIMITER`]. Cursors are immutable; deriving a child never touches the
//! parent.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator between path segments in a materialized key.
pub const DELIMITER: char = ':';

/// Final segment of a collection's membership index hash.
pub const INDEX_SEGMENT: &str = "_KEY";

/// Final segment of a collection's key counter hash.
pub const SEQUENCE_SEGMENT: &str = "_SEQ";

/// Immutable key path plus its materialized store key.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor {
    items: Vec<String>,
    key: String,
}

impl Cursor {
    /// A root cursor with a single segment.
    pub fn root(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            key: prefix.clone(),
            items: vec![prefix],
        }
    }

    /// Derive a child cursor by appending one segment.
    pub fn child(&self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let mut key = String::with_capacity(self.key.len() + 1 + prefix.len());
        key.push_str(&self.key);
        key.push(DELIMITER);
        key.push_str(&prefix);

        let mut items = Vec::with_capacity(self.items.len() + 1);
        items.extend(self.items.iter().cloned());
        items.push(prefix);
        Self { items, key }
    }

    /// Path segments, root first.
    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// The materialized store key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The last segment (the prefix this cursor was derived with).
    pub fn prefix(&self) -> &str {
        self.items.last().map(String::as_str).unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.items.len()
    }

    /// Key of the membership index for a collection rooted here.
    pub fn index_key(&self) -> String {
        self.child(INDEX_SEGMENT).key
    }

    /// Key of the key counter for a collection rooted here.
    pub fn sequence_key(&self) -> String {
        self.child(SEQUENCE_SEGMENT).key
    }

    /// Path segments extended with one more segment, without building a key.
    pub fn path_with(&self, segment: &str) -> Vec<String> {
        let mut path = self.items.clone();
        path.push(segment.to_string());
        path
    }

    /// Returns `true` if `self` is `other` or lies below it.
    pub fn starts_with(&self, other: &Cursor) -> bool {
        self.items.starts_with(&other.items)
    }

    /// Translate a store key under `from` to the same position under `to`.
    ///
    /// Returns `None` if `key` is not `from`'s key or one of its descendants.
    pub fn rebase_key(key: &str, from: &Cursor, to: &Cursor) -> Option<String> {
        let rest = key.strip_prefix(from.key())?;
        if rest.is_empty() || rest.starts_with(DELIMITER) {
            Some(format!("{}{rest}", to.key()))
        } else {
            None
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cursor({})", self.key)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
