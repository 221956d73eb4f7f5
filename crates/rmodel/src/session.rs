//! Change tracking.
//!
//! A [`Session`] records every write made through field bindings as a
//! path → [`Change`] entry, where the path mirrors the field's cursor
//! segments. One session is shared by reference across a record tree built
//! together. [`NoSession`] is the null object used when nobody asked for
//! tracking: it accepts writes and reports no changes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;

/// One recorded write.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum Change {
    /// A scalar or hash entry was written.
    Set(Value),
    /// The field's data was deleted.
    Removed,
    /// A list was replaced wholesale.
    Replaced(Vec<Value>),
    /// Values were appended to a list; `len` is the length the store
    /// acknowledged after the last append.
    Appended { values: Vec<Value>, len: u64 },
}

/// Recorded changes below one path, nested by path segment.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChangeTree {
    Leaf(Change),
    Nested(Changes),
    /// A change at this node followed by later changes below it, e.g. a
    /// hash that was cleaned and then written to.
    Branch { change: Change, children: Changes },
}

/// Field name → change tree.
pub type Changes = BTreeMap<String, ChangeTree>;

impl ChangeTree {
    /// The change recorded exactly at this node, if any.
    pub fn as_change(&self) -> Option<&Change> {
        match self {
            ChangeTree::Leaf(change) | ChangeTree::Branch { change, .. } => Some(change),
            ChangeTree::Nested(_) => None,
        }
    }

    /// Follow one segment down.
    pub fn get(&self, segment: &str) -> Option<&ChangeTree> {
        match self {
            ChangeTree::Nested(children) | ChangeTree::Branch { children, .. } => {
                children.get(segment)
            }
            ChangeTree::Leaf(_) => None,
        }
    }

    /// Number of leaf changes below this node.
    pub fn leaf_count(&self) -> usize {
        match self {
            ChangeTree::Leaf(_) => 1,
            ChangeTree::Nested(map) => map.values().map(ChangeTree::leaf_count).sum(),
            ChangeTree::Branch { children, .. } => {
                1 + children.values().map(ChangeTree::leaf_count).sum::<usize>()
            }
        }
    }

    /// Changes recorded strictly below this node.
    pub fn children(&self) -> Option<&Changes> {
        match self {
            ChangeTree::Nested(children) | ChangeTree::Branch { children, .. } => Some(children),
            ChangeTree::Leaf(_) => None,
        }
    }
}

/// Capability interface for change recording.
pub trait Session: Send + Sync + fmt::Debug {
    /// Record a write at `path`, superseding anything recorded at or below
    /// it. Entries at ancestor paths are kept.
    fn add(&self, path: &[String], change: Change);

    /// Record list growth at `path`. Consecutive appends accumulate.
    fn append(&self, path: &[String], values: Vec<Value>, len: u64);

    /// Everything recorded at or below `path`; `None` when nothing was.
    fn changes(&self, path: &[String]) -> Option<ChangeTree>;

    /// `false` for sessions that discard what they are given.
    fn is_tracking(&self) -> bool {
        true
    }
}

/// Shared handle to a session.
pub type SessionRef = Arc<dyn Session>;

/// A session that discards every change.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSession;

impl Session for NoSession {
    fn add(&self, _path: &[String], _change: Change) {}

    fn append(&self, _path: &[String], _values: Vec<Value>, _len: u64) {}

    fn changes(&self, _path: &[String]) -> Option<ChangeTree> {
        None
    }

    fn is_tracking(&self) -> bool {
        false
    }
}

/// The null-object session handle.
pub fn no_session() -> SessionRef {
    Arc::new(NoSession)
}

/// A session that keeps every change in memory.
///
/// Entries are keyed by full path. Recording at a path replaces the entry
/// there and drops entries below it; entries above it stay, so a deletion
/// followed by writes inside the deleted value reports both.
#[derive(Default)]
pub struct RecordingSession {
    entries: Mutex<BTreeMap<Vec<String>, Change>>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh recording session behind a shared handle.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Vec<String>, Change>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of recorded paths.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Flat copy of every entry, ordered by path.
    pub fn entries(&self) -> Vec<(Vec<String>, Change)> {
        self.lock()
            .iter()
            .map(|(p, c)| (p.clone(), c.clone()))
            .collect()
    }

    /// Drain every entry, leaving the session empty.
    pub fn take(&self) -> Vec<(Vec<String>, Change)> {
        std::mem::take(&mut *self.lock()).into_iter().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Drop entries strictly below `path`.
fn supersede(entries: &mut BTreeMap<Vec<String>, Change>, path: &[String]) {
    entries.retain(|p, _| !(p.len() > path.len() && p.starts_with(path)));
}

fn tree_of(change: Option<Change>, children: Changes) -> Option<ChangeTree> {
    match (change, children.is_empty()) {
        (Some(change), true) => Some(ChangeTree::Leaf(change)),
        (Some(change), false) => Some(ChangeTree::Branch { change, children }),
        (None, false) => Some(ChangeTree::Nested(children)),
        (None, true) => None,
    }
}

fn insert_tree(node: &mut Changes, rel: &[String], change: Change) {
    let Some((head, rest)) = rel.split_first() else {
        return;
    };
    let slot = node
        .entry(head.clone())
        .or_insert_with(|| ChangeTree::Nested(Changes::new()));
    let (own, mut children) = match std::mem::replace(slot, ChangeTree::Nested(Changes::new())) {
        ChangeTree::Leaf(c) => (Some(c), Changes::new()),
        ChangeTree::Nested(children) => (None, children),
        ChangeTree::Branch { change, children } => (Some(change), children),
    };
    let own = if rest.is_empty() {
        Some(change)
    } else {
        insert_tree(&mut children, rest, change);
        own
    };
    if let Some(tree) = tree_of(own, children) {
        *slot = tree;
    }
}

impl Session for RecordingSession {
    fn add(&self, path: &[String], change: Change) {
        let mut entries = self.lock();
        supersede(&mut entries, path);
        entries.insert(path.to_vec(), change);
    }

    fn append(&self, path: &[String], values: Vec<Value>, len: u64) {
        let mut entries = self.lock();
        let merged = match entries.remove(path) {
            Some(Change::Appended {
                values: mut prior, ..
            }) => {
                prior.extend(values);
                Change::Appended { values: prior, len }
            }
            Some(Change::Replaced(mut prior)) => {
                prior.extend(values);
                Change::Replaced(prior)
            }
            // appending to a deleted list rebuilds it from scratch
            Some(Change::Removed) => Change::Replaced(values),
            Some(Change::Set(_)) | None => Change::Appended { values, len },
        };
        supersede(&mut entries, path);
        entries.insert(path.to_vec(), merged);
    }

    fn changes(&self, path: &[String]) -> Option<ChangeTree> {
        let entries = self.lock();
        let mut own = None;
        let mut nested = Changes::new();
        for (p, change) in entries.range(path.to_vec()..) {
            if !p.starts_with(path) {
                break;
            }
            if p.len() == path.len() {
                own = Some(change.clone());
            } else {
                insert_tree(&mut nested, &p[path.len()..], change.clone());
            }
        }
        tree_of(own, nested)
    }
}

impl fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingSession")
            .field("entry_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    #[test]
    fn add_records_at_path() {
        let s = RecordingSession::new();
        s.add(&path(&["m", "id"]), Change::Set(json!(1)));
        assert_eq!(
            s.changes(&path(&["m", "id"])),
            Some(ChangeTree::Leaf(Change::Set(json!(1))))
        );
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn add_overwrites_without_diffing() {
        let s = RecordingSession::new();
        s.add(&path(&["m", "id"]), Change::Set(json!(1)));
        s.add(&path(&["m", "id"]), Change::Set(json!(1)));
        assert_eq!(s.len(), 1);
        s.add(&path(&["m", "id"]), Change::Removed);
        assert_eq!(
            s.changes(&path(&["m", "id"])).unwrap().as_change(),
            Some(&Change::Removed)
        );
    }

    #[test]
    fn nested_paths_aggregate_into_tree() {
        let s = RecordingSession::new();
        s.add(&path(&["m", "hash", "a"]), Change::Set(json!(1)));
        s.add(&path(&["m", "hash", "b"]), Change::Set(json!(2)));
        s.add(&path(&["m", "id"]), Change::Set(json!(3)));

        let tree = s.changes(&path(&["m"])).unwrap();
        assert_eq!(tree.leaf_count(), 3);
        let hash = tree.get("hash").unwrap();
        assert_eq!(
            hash.get("a").and_then(ChangeTree::as_change),
            Some(&Change::Set(json!(1)))
        );
    }

    #[test]
    fn unrelated_prefixes_are_not_matched() {
        let s = RecordingSession::new();
        s.add(&path(&["store", "10", "id"]), Change::Set(json!(1)));
        assert!(s.changes(&path(&["store", "1"])).is_none());
        assert!(s.changes(&path(&["store", "10"])).is_some());
    }

    #[test]
    fn whole_value_write_supersedes_entries_below() {
        let s = RecordingSession::new();
        s.add(&path(&["m", "hash", "a"]), Change::Set(json!(1)));
        s.add(&path(&["m", "hash"]), Change::Removed);
        assert_eq!(s.len(), 1);
        assert_eq!(
            s.changes(&path(&["m", "hash"])),
            Some(ChangeTree::Leaf(Change::Removed))
        );
    }

    #[test]
    fn writes_below_a_deletion_keep_the_deletion() {
        let s = RecordingSession::new();
        s.add(&path(&["m", "hash", "a"]), Change::Set(json!(1)));
        s.add(&path(&["m", "hash"]), Change::Removed);
        s.add(&path(&["m", "hash", "b"]), Change::Set(json!(2)));
        assert_eq!(
            s.entries(),
            vec![
                (path(&["m", "hash"]), Change::Removed),
                (path(&["m", "hash", "b"]), Change::Set(json!(2))),
            ]
        );

        let tree = s.changes(&path(&["m", "hash"])).unwrap();
        assert_eq!(tree.as_change(), Some(&Change::Removed));
        assert_eq!(
            tree.get("b").and_then(ChangeTree::as_change),
            Some(&Change::Set(json!(2)))
        );
        assert!(tree.get("a").is_none());
        assert_eq!(tree.leaf_count(), 2);

        // seen from above, the hash node carries both
        let outer = s.changes(&path(&["m"])).unwrap();
        assert_eq!(outer.get("hash"), Some(&tree));
        assert_eq!(
            serde_json::to_value(&outer).unwrap(),
            json!({
                "hash": {
                    "change": {"op": "removed"},
                    "children": {"b": {"op": "set", "value": 2}}
                }
            })
        );
    }

    // -----------------------------------------------------------------------
    // Appends
    // -----------------------------------------------------------------------

    #[test]
    fn appends_accumulate() {
        let s = RecordingSession::new();
        let p = path(&["m", "list"]);
        s.append(&p, vec![json!("a")], 1);
        s.append(&p, vec![json!("b"), json!("c")], 3);
        assert_eq!(
            s.changes(&p).unwrap().as_change(),
            Some(&Change::Appended {
                values: vec![json!("a"), json!("b"), json!("c")],
                len: 3
            })
        );
    }

    #[test]
    fn append_after_replace_extends_replacement() {
        let s = RecordingSession::new();
        let p = path(&["m", "list"]);
        s.add(&p, Change::Replaced(vec![json!(1)]));
        s.append(&p, vec![json!(2)], 2);
        assert_eq!(
            s.changes(&p).unwrap().as_change(),
            Some(&Change::Replaced(vec![json!(1), json!(2)]))
        );
    }

    #[test]
    fn append_after_remove_is_a_replacement() {
        let s = RecordingSession::new();
        let p = path(&["m", "list"]);
        s.add(&p, Change::Removed);
        s.append(&p, vec![json!("x")], 1);
        assert_eq!(
            s.changes(&p).unwrap().as_change(),
            Some(&Change::Replaced(vec![json!("x")]))
        );
    }

    // -----------------------------------------------------------------------
    // Null session and utilities
    // -----------------------------------------------------------------------

    #[test]
    fn no_session_discards_everything() {
        let s = no_session();
        s.add(&path(&["m", "id"]), Change::Set(json!(1)));
        s.append(&path(&["m", "l"]), vec![json!(1)], 1);
        assert!(s.changes(&path(&["m"])).is_none());
        assert!(!s.is_tracking());
    }

    #[test]
    fn take_drains() {
        let s = RecordingSession::new();
        s.add(&path(&["a"]), Change::Removed);
        let drained = s.take();
        assert_eq!(drained.len(), 1);
        assert!(s.is_empty());
        assert!(s.is_tracking());
    }

    #[test]
    fn changes_serialize_as_nested_json() {
        let s = RecordingSession::new();
        s.add(&path(&["m", "hash", "a"]), Change::Set(json!(1)));
        s.add(&path(&["m", "id"]), Change::Removed);
        let tree = s.changes(&path(&["m"])).unwrap();
        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            json!({
                "hash": {"a": {"op": "set", "value": 1}},
                "id": {"op": "removed"}
            })
        );
    }

    #[test]
    fn debug_format() {
        let s = RecordingSession::new();
        assert!(format!("{s:?}").contains("entry_count"));
    }
}
