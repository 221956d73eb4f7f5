use std::collections::BTreeMap;

use crate::command::{Command, Reply};
use crate::error::{KvError, KvResult};

/// Hash/list key-value store.
///
/// Backends implement a single primitive, [`execute`](KvStore::execute),
/// which runs an ordered batch of commands as one unit and returns one reply
/// per command. Every single-command helper is a one-element batch.
///
/// All implementations must satisfy these invariants:
/// - Replies are positionally aligned with the submitted commands.
/// - A batch is applied in order. If any command fails, the batch reports
///   the error and no partial reply vector is returned.
/// - Empty hashes and lists do not exist: removing the last field or element
///   removes the key.
/// - Errors from the transport or backend are propagated, never retried.
pub trait KvStore: Send + Sync {
    /// Execute a batch of commands atomically and in order.
    fn execute(&self, commands: &[Command]) -> KvResult<Vec<Reply>>;

    /// Execute a single command.
    fn run(&self, command: Command) -> KvResult<Reply> {
        self.execute(std::slice::from_ref(&command))?
            .pop()
            .ok_or(KvError::ReplyCount {
                expected: 1,
                actual: 0,
            })
    }

    fn hash_get(&self, key: &str, field: &str) -> KvResult<Option<String>> {
        self.run(Command::HashGet {
            key: key.into(),
            field: field.into(),
        })?
        .into_opt_string()
    }

    /// Set a hash field. Returns `true` if the field was newly created.
    fn hash_set(&self, key: &str, field: &str, value: &str) -> KvResult<bool> {
        self.run(Command::HashSet {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        })?
        .into_bool()
    }

    fn hash_set_many(&self, key: &str, entries: Vec<(String, String)>) -> KvResult<()> {
        self.run(Command::HashSetMany {
            key: key.into(),
            entries,
        })?
        .into_ok()
    }

    fn hash_get_all(&self, key: &str) -> KvResult<BTreeMap<String, String>> {
        self.run(Command::HashGetAll { key: key.into() })?.into_hash()
    }

    /// Delete a hash field. Returns `true` if the field existed.
    fn hash_delete(&self, key: &str, field: &str) -> KvResult<bool> {
        self.run(Command::HashDelete {
            key: key.into(),
            field: field.into(),
        })?
        .into_bool()
    }

    fn hash_len(&self, key: &str) -> KvResult<u64> {
        Ok(self.run(Command::HashLen { key: key.into() })?.into_int()? as u64)
    }

    fn hash_keys(&self, key: &str) -> KvResult<Vec<String>> {
        self.run(Command::HashKeys { key: key.into() })?.into_array()
    }

    fn hash_exists(&self, key: &str, field: &str) -> KvResult<bool> {
        self.run(Command::HashExists {
            key: key.into(),
            field: field.into(),
        })?
        .into_bool()
    }

    /// Atomically add `delta` to an integer hash field, returning the result.
    fn hash_incr_by(&self, key: &str, field: &str, delta: i64) -> KvResult<i64> {
        self.run(Command::HashIncrBy {
            key: key.into(),
            field: field.into(),
            delta,
        })?
        .into_int()
    }

    /// Append values to the tail of a list. Returns the new length.
    fn list_push(&self, key: &str, values: Vec<String>) -> KvResult<u64> {
        Ok(self
            .run(Command::ListPush {
                key: key.into(),
                values,
            })?
            .into_int()? as u64)
    }

    /// Inclusive range with negative indices counting from the tail.
    fn list_range(&self, key: &str, start: i64, stop: i64) -> KvResult<Vec<String>> {
        self.run(Command::ListRange {
            key: key.into(),
            start,
            stop,
        })?
        .into_array()
    }

    /// Remove occurrences of `value`. `count > 0` scans from the head,
    /// `count < 0` from the tail, `0` removes all. Returns the number removed.
    fn list_remove(&self, key: &str, value: &str, count: i64) -> KvResult<u64> {
        Ok(self
            .run(Command::ListRemove {
                key: key.into(),
                value: value.into(),
                count,
            })?
            .into_int()? as u64)
    }

    fn list_trim(&self, key: &str, start: i64, stop: i64) -> KvResult<()> {
        self.run(Command::ListTrim {
            key: key.into(),
            start,
            stop,
        })?
        .into_ok()
    }

    fn list_len(&self, key: &str) -> KvResult<u64> {
        Ok(self.run(Command::ListLen { key: key.into() })?.into_int()? as u64)
    }

    /// Remove and return the head of a list.
    fn list_pop(&self, key: &str) -> KvResult<Option<String>> {
        self.run(Command::ListPop { key: key.into() })?.into_opt_string()
    }

    fn list_index(&self, key: &str, index: i64) -> KvResult<Option<String>> {
        self.run(Command::ListIndex {
            key: key.into(),
            index,
        })?
        .into_opt_string()
    }

    /// Delete a key of any kind. Returns `true` if it existed.
    fn delete(&self, key: &str) -> KvResult<bool> {
        self.run(Command::Delete { key: key.into() })?.into_bool()
    }

    fn exists(&self, key: &str) -> KvResult<bool> {
        self.run(Command::Exists { key: key.into() })?.into_bool()
    }
}
