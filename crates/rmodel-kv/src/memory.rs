use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use crate::command::{Command, Reply};
use crate::error::{KvError, KvResult};
use crate::traits::KvStore;

/// A value held at one key.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Entry {
    Hash(BTreeMap<String, String>),
    List(VecDeque<String>),
}

/// In-memory, HashMap-based hash/list store.
///
/// Intended for tests and embedding. A batch takes the write lock once and is
/// applied in order; if any command fails, every key touched by the batch is
/// restored to its prior state before the error is returned.
///
/// A batch is rolled back before its error leaves `execute`, so the map is
/// consistent even when another thread panicked while holding the lock.
/// `execute` still reports a poisoned lock as [`KvError::Poisoned`]; the
/// inspection helpers (`len`, `keys`, `clear`) read through it.
pub struct InMemoryKv {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryKv {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every key.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Sorted list of all keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl Default for InMemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for InMemoryKv {
    fn execute(&self, commands: &[Command]) -> KvResult<Vec<Reply>> {
        let mut map = self.entries.write().map_err(|_| KvError::Poisoned)?;
        let mut undo: HashMap<String, Option<Entry>> = HashMap::new();
        let mut replies = Vec::with_capacity(commands.len());

        for command in commands {
            if command.is_write() && !undo.contains_key(command.key()) {
                undo.insert(command.key().to_string(), map.get(command.key()).cloned());
            }
            match apply(&mut map, command) {
                Ok(reply) => replies.push(reply),
                Err(e) => {
                    for (key, prior) in undo {
                        match prior {
                            Some(entry) => map.insert(key, entry),
                            None => map.remove(&key),
                        };
                    }
                    return Err(e);
                }
            }
        }
        Ok(replies)
    }
}

impl std::fmt::Debug for InMemoryKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryKv")
            .field("key_count", &self.len())
            .finish()
    }
}

fn wrong_type(key: &str) -> KvError {
    KvError::WrongType {
        key: key.to_string(),
    }
}

fn hash<'a>(map: &'a HashMap<String, Entry>, key: &str) -> KvResult<Option<&'a BTreeMap<String, String>>> {
    match map.get(key) {
        None => Ok(None),
        Some(Entry::Hash(h)) => Ok(Some(h)),
        Some(Entry::List(_)) => Err(wrong_type(key)),
    }
}

fn hash_mut<'a>(
    map: &'a mut HashMap<String, Entry>,
    key: &str,
) -> KvResult<&'a mut BTreeMap<String, String>> {
    match map
        .entry(key.to_string())
        .or_insert_with(|| Entry::Hash(BTreeMap::new()))
    {
        Entry::Hash(h) => Ok(h),
        Entry::List(_) => Err(wrong_type(key)),
    }
}

fn list<'a>(map: &'a HashMap<String, Entry>, key: &str) -> KvResult<Option<&'a VecDeque<String>>> {
    match map.get(key) {
        None => Ok(None),
        Some(Entry::List(l)) => Ok(Some(l)),
        Some(Entry::Hash(_)) => Err(wrong_type(key)),
    }
}

fn list_mut<'a>(map: &'a mut HashMap<String, Entry>, key: &str) -> KvResult<Option<&'a mut VecDeque<String>>> {
    match map.get_mut(key) {
        None => Ok(None),
        Some(Entry::List(l)) => Ok(Some(l)),
        Some(Entry::Hash(_)) => Err(wrong_type(key)),
    }
}

/// Drop `key` if it now holds an empty hash or list.
fn prune(map: &mut HashMap<String, Entry>, key: &str) {
    let empty = match map.get(key) {
        Some(Entry::Hash(h)) => h.is_empty(),
        Some(Entry::List(l)) => l.is_empty(),
        None => false,
    };
    if empty {
        map.remove(key);
    }
}

/// Resolve an inclusive `[start, stop]` range with negative indices against
/// a list of length `len`. Returns `None` for an empty selection.
fn resolve_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

fn apply(map: &mut HashMap<String, Entry>, command: &Command) -> KvResult<Reply> {
    let reply = match command {
        Command::HashGet { key, field } => match hash(map, key)?.and_then(|h| h.get(field)) {
            Some(v) => Reply::Bulk(v.clone()),
            None => Reply::Nil,
        },
        Command::HashSet { key, field, value } => {
            let created = hash_mut(map, key)?
                .insert(field.clone(), value.clone())
                .is_none();
            Reply::Int(created as i64)
        }
        Command::HashSetMany { key, entries } => {
            if !entries.is_empty() {
                let h = hash_mut(map, key)?;
                for (field, value) in entries {
                    h.insert(field.clone(), value.clone());
                }
            }
            Reply::Ok
        }
        Command::HashGetAll { key } => Reply::Hash(hash(map, key)?.cloned().unwrap_or_default()),
        Command::HashDelete { key, field } => {
            let removed = match map.get_mut(key) {
                None => false,
                Some(Entry::Hash(h)) => h.remove(field).is_some(),
                Some(Entry::List(_)) => return Err(wrong_type(key)),
            };
            prune(map, key);
            Reply::Int(removed as i64)
        }
        Command::HashLen { key } => Reply::Int(hash(map, key)?.map_or(0, |h| h.len()) as i64),
        Command::HashKeys { key } => {
            Reply::Array(hash(map, key)?.map(|h| h.keys().cloned().collect()).unwrap_or_default())
        }
        Command::HashExists { key, field } => {
            Reply::Int(hash(map, key)?.is_some_and(|h| h.contains_key(field)) as i64)
        }
        Command::HashIncrBy { key, field, delta } => {
            let h = hash_mut(map, key)?;
            let current = match h.get(field) {
                None => 0,
                Some(raw) => raw.parse::<i64>().map_err(|_| KvError::NotAnInteger {
                    key: key.clone(),
                    field: field.clone(),
                })?,
            };
            let next = current.checked_add(*delta).ok_or_else(|| KvError::NotAnInteger {
                key: key.clone(),
                field: field.clone(),
            })?;
            h.insert(field.clone(), next.to_string());
            Reply::Int(next)
        }
        Command::ListPush { key, values } => {
            if values.is_empty() {
                Reply::Int(list(map, key)?.map_or(0, |l| l.len()) as i64)
            } else {
                let entry = map
                    .entry(key.clone())
                    .or_insert_with(|| Entry::List(VecDeque::new()));
                match entry {
                    Entry::List(l) => {
                        l.extend(values.iter().cloned());
                        Reply::Int(l.len() as i64)
                    }
                    Entry::Hash(_) => return Err(wrong_type(key)),
                }
            }
        }
        Command::ListRange { key, start, stop } => {
            let items = match list(map, key)? {
                Some(l) => match resolve_range(*start, *stop, l.len()) {
                    Some((s, e)) => l.range(s..=e).cloned().collect(),
                    None => Vec::new(),
                },
                None => Vec::new(),
            };
            Reply::Array(items)
        }
        Command::ListRemove { key, value, count } => {
            let removed = match list_mut(map, key)? {
                None => 0,
                Some(l) => remove_occurrences(l, value, *count),
            };
            prune(map, key);
            Reply::Int(removed as i64)
        }
        Command::ListTrim { key, start, stop } => {
            if let Some(l) = list_mut(map, key)? {
                match resolve_range(*start, *stop, l.len()) {
                    Some((s, e)) => {
                        l.truncate(e + 1);
                        l.drain(..s);
                    }
                    None => l.clear(),
                }
            }
            prune(map, key);
            Reply::Ok
        }
        Command::ListLen { key } => Reply::Int(list(map, key)?.map_or(0, |l| l.len()) as i64),
        Command::ListPop { key } => {
            let head = list_mut(map, key)?.and_then(|l| l.pop_front());
            prune(map, key);
            head.map_or(Reply::Nil, Reply::Bulk)
        }
        Command::ListIndex { key, index } => {
            let item = list(map, key)?.and_then(|l| {
                let len = l.len() as i64;
                let i = if *index < 0 { len + index } else { *index };
                if (0..len).contains(&i) {
                    l.get(i as usize).cloned()
                } else {
                    None
                }
            });
            item.map_or(Reply::Nil, Reply::Bulk)
        }
        Command::Delete { key } => Reply::Int(map.remove(key).is_some() as i64),
        Command::Exists { key } => Reply::Int(map.contains_key(key) as i64),
    };
    Ok(reply)
}

fn remove_occurrences(l: &mut VecDeque<String>, value: &str, count: i64) -> usize {
    let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
    let mut removed = 0;
    if count >= 0 {
        let mut i = 0;
        while i < l.len() && removed < limit {
            if l[i] == value {
                l.remove(i);
                removed += 1;
            } else {
                i += 1;
            }
        }
    } else {
        let mut i = l.len();
        while i > 0 && removed < limit {
            i -= 1;
            if l[i] == value {
                l.remove(i);
                removed += 1;
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    // -----------------------------------------------------------------------
    // Hashes
    // -----------------------------------------------------------------------

    #[test]
    fn hash_set_and_get() {
        let kv = InMemoryKv::new();
        assert!(kv.hash_set("h", "a", "1").unwrap());
        assert!(!kv.hash_set("h", "a", "2").unwrap()); // update, not create
        assert_eq!(kv.hash_get("h", "a").unwrap().as_deref(), Some("2"));
        assert_eq!(kv.hash_get("h", "b").unwrap(), None);
        assert_eq!(kv.hash_get("missing", "a").unwrap(), None);
    }

    #[test]
    fn hash_get_all_and_keys_are_sorted() {
        let kv = InMemoryKv::new();
        kv.hash_set_many("h", vec![("b".into(), "2".into()), ("a".into(), "1".into())])
            .unwrap();
        assert_eq!(kv.hash_keys("h").unwrap(), strings(&["a", "b"]));
        let all = kv.hash_get_all("h").unwrap();
        assert_eq!(all.get("a").map(String::as_str), Some("1"));
        assert_eq!(kv.hash_len("h").unwrap(), 2);
        assert!(kv.hash_get_all("missing").unwrap().is_empty());
    }

    #[test]
    fn deleting_last_field_removes_key() {
        let kv = InMemoryKv::new();
        kv.hash_set("h", "a", "1").unwrap();
        assert!(kv.hash_delete("h", "a").unwrap());
        assert!(!kv.hash_delete("h", "a").unwrap());
        assert!(!kv.exists("h").unwrap());
        assert!(kv.is_empty());
    }

    #[test]
    fn hash_incr_by() {
        let kv = InMemoryKv::new();
        assert_eq!(kv.hash_incr_by("h", "n", 5).unwrap(), 5);
        assert_eq!(kv.hash_incr_by("h", "n", -7).unwrap(), -2);
        kv.hash_set("h", "s", "abc").unwrap();
        assert_eq!(
            kv.hash_incr_by("h", "s", 1).unwrap_err(),
            KvError::NotAnInteger {
                key: "h".into(),
                field: "s".into()
            }
        );
    }

    #[test]
    fn wrong_type_is_reported() {
        let kv = InMemoryKv::new();
        kv.list_push("l", strings(&["x"])).unwrap();
        assert_eq!(
            kv.hash_get("l", "a").unwrap_err(),
            KvError::WrongType { key: "l".into() }
        );
        kv.hash_set("h", "a", "1").unwrap();
        assert!(kv.list_push("h", strings(&["x"])).is_err());
    }

    // -----------------------------------------------------------------------
    // Lists
    // -----------------------------------------------------------------------

    #[test]
    fn list_push_and_range() {
        let kv = InMemoryKv::new();
        assert_eq!(kv.list_push("l", strings(&["a", "b", "c"])).unwrap(), 3);
        assert_eq!(kv.list_range("l", 0, -1).unwrap(), strings(&["a", "b", "c"]));
        assert_eq!(kv.list_range("l", 1, 1).unwrap(), strings(&["b"]));
        assert_eq!(kv.list_range("l", -2, -1).unwrap(), strings(&["b", "c"]));
        assert_eq!(kv.list_range("l", 5, 10).unwrap(), Vec::<String>::new());
        assert_eq!(kv.list_range("l", 0, 100).unwrap().len(), 3);
    }

    #[test]
    fn list_push_empty_creates_nothing() {
        let kv = InMemoryKv::new();
        assert_eq!(kv.list_push("l", vec![]).unwrap(), 0);
        assert!(!kv.exists("l").unwrap());
    }

    #[test]
    fn list_remove_directions() {
        let kv = InMemoryKv::new();
        kv.list_push("l", strings(&["a", "b", "a", "c", "a"])).unwrap();
        assert_eq!(kv.list_remove("l", "a", 1).unwrap(), 1);
        assert_eq!(kv.list_range("l", 0, -1).unwrap(), strings(&["b", "a", "c", "a"]));
        assert_eq!(kv.list_remove("l", "a", -1).unwrap(), 1);
        assert_eq!(kv.list_range("l", 0, -1).unwrap(), strings(&["b", "a", "c"]));
        assert_eq!(kv.list_remove("l", "a", 0).unwrap(), 1);
        assert_eq!(kv.list_range("l", 0, -1).unwrap(), strings(&["b", "c"]));
    }

    #[test]
    fn list_trim_pop_index() {
        let kv = InMemoryKv::new();
        kv.list_push("l", strings(&["a", "b", "c", "d"])).unwrap();
        kv.list_trim("l", 1, -2).unwrap();
        assert_eq!(kv.list_range("l", 0, -1).unwrap(), strings(&["b", "c"]));
        assert_eq!(kv.list_index("l", -1).unwrap().as_deref(), Some("c"));
        assert_eq!(kv.list_index("l", 9).unwrap(), None);
        assert_eq!(kv.list_pop("l").unwrap().as_deref(), Some("b"));
        assert_eq!(kv.list_pop("l").unwrap().as_deref(), Some("c"));
        assert_eq!(kv.list_pop("l").unwrap(), None);
        assert!(!kv.exists("l").unwrap());
    }

    #[test]
    fn list_trim_to_empty_removes_key() {
        let kv = InMemoryKv::new();
        kv.list_push("l", strings(&["a"])).unwrap();
        kv.list_trim("l", 3, 5).unwrap();
        assert_eq!(kv.list_len("l").unwrap(), 0);
        assert!(!kv.exists("l").unwrap());
    }

    // -----------------------------------------------------------------------
    // Batches
    // -----------------------------------------------------------------------

    #[test]
    fn failed_batch_rolls_back() {
        let kv = InMemoryKv::new();
        kv.hash_set("h", "a", "1").unwrap();
        kv.list_push("l", strings(&["x"])).unwrap();

        let batch = vec![
            Command::HashSet {
                key: "h".into(),
                field: "a".into(),
                value: "changed".into(),
            },
            Command::Delete { key: "l".into() },
            Command::HashIncrBy {
                key: "h".into(),
                field: "a".into(),
                delta: 1,
            },
        ];
        assert!(kv.execute(&batch).is_err());
        assert_eq!(kv.hash_get("h", "a").unwrap().as_deref(), Some("1"));
        assert_eq!(kv.list_range("l", 0, -1).unwrap(), strings(&["x"]));
    }

    #[test]
    fn delete_and_exists() {
        let kv = InMemoryKv::new();
        kv.hash_set("h", "a", "1").unwrap();
        assert!(kv.exists("h").unwrap());
        assert!(kv.delete("h").unwrap());
        assert!(!kv.delete("h").unwrap());
    }

    #[test]
    fn keys_clear_and_debug() {
        let kv = InMemoryKv::default();
        kv.hash_set("b", "f", "1").unwrap();
        kv.list_push("a", strings(&["x"])).unwrap();
        assert_eq!(kv.keys(), strings(&["a", "b"]));
        assert!(format!("{kv:?}").contains("key_count"));
        kv.clear();
        assert!(kv.is_empty());
    }

    #[test]
    fn poisoned_lock_fails_batches_but_not_inspection() {
        let kv = InMemoryKv::new();
        kv.hash_set("h", "a", "1").unwrap();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = kv.entries.write().unwrap();
            panic!("writer died");
        }));
        assert!(result.is_err());
        assert!(kv.entries.is_poisoned());

        assert!(matches!(kv.hash_get("h", "a"), Err(KvError::Poisoned)));
        assert_eq!(kv.len(), 1);
        assert_eq!(kv.keys(), strings(&["h"]));
        kv.clear();
        assert!(kv.is_empty());
    }

    proptest! {
        #[test]
        fn full_range_round_trips(items in proptest::collection::vec("[a-z]{1,3}", 0..12)) {
            let kv = InMemoryKv::new();
            kv.list_push("l", items.clone()).unwrap();
            prop_assert_eq!(kv.list_range("l", 0, -1).unwrap(), items.clone());
            prop_assert_eq!(kv.list_len("l").unwrap() as usize, items.len());
        }

        #[test]
        fn range_is_a_contiguous_window(items in proptest::collection::vec("[a-z]{1,3}", 0..12),
                                        start in -15i64..15, stop in -15i64..15) {
            let kv = InMemoryKv::new();
            kv.list_push("l", items.clone()).unwrap();
            let got = kv.list_range("l", start, stop).unwrap();
            prop_assert!(got.len() <= items.len());
            if !got.is_empty() {
                let found = items.windows(got.len()).any(|w| w == got.as_slice());
                prop_assert!(found);
            }
        }
    }
}
