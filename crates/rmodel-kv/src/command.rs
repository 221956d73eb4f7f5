//! The command vocabulary shared by every backend.
//!
//! A [`Command`] is one primitive operation against the store. Batches are
//! plain ordered slices of commands; each command produces exactly one
//! [`Reply`] at the same position in the result.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KvError, KvResult};

/// One primitive store command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    HashGet { key: String, field: String },
    HashSet { key: String, field: String, value: String },
    HashSetMany { key: String, entries: Vec<(String, String)> },
    HashGetAll { key: String },
    HashDelete { key: String, field: String },
    HashLen { key: String },
    HashKeys { key: String },
    HashExists { key: String, field: String },
    HashIncrBy { key: String, field: String, delta: i64 },
    ListPush { key: String, values: Vec<String> },
    ListRange { key: String, start: i64, stop: i64 },
    ListRemove { key: String, value: String, count: i64 },
    ListTrim { key: String, start: i64, stop: i64 },
    ListLen { key: String },
    ListPop { key: String },
    ListIndex { key: String, index: i64 },
    Delete { key: String },
    Exists { key: String },
}

impl Command {
    /// The key this command addresses.
    pub fn key(&self) -> &str {
        match self {
            Command::HashGet { key, .. }
            | Command::HashSet { key, .. }
            | Command::HashSetMany { key, .. }
            | Command::HashGetAll { key }
            | Command::HashDelete { key, .. }
            | Command::HashLen { key }
            | Command::HashKeys { key }
            | Command::HashExists { key, .. }
            | Command::HashIncrBy { key, .. }
            | Command::ListPush { key, .. }
            | Command::ListRange { key, .. }
            | Command::ListRemove { key, .. }
            | Command::ListTrim { key, .. }
            | Command::ListLen { key }
            | Command::ListPop { key }
            | Command::ListIndex { key, .. }
            | Command::Delete { key }
            | Command::Exists { key } => key,
        }
    }

    /// Returns `true` if the command can change store state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Command::HashSet { .. }
                | Command::HashSetMany { .. }
                | Command::HashDelete { .. }
                | Command::HashIncrBy { .. }
                | Command::ListPush { .. }
                | Command::ListRemove { .. }
                | Command::ListTrim { .. }
                | Command::ListPop { .. }
                | Command::Delete { .. }
        )
    }
}

/// One reply, positionally matched to the command that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    /// Absent value (missing key, field or index).
    Nil,
    /// Acknowledgment without a payload.
    Ok,
    Int(i64),
    Bulk(String),
    Array(Vec<String>),
    Hash(BTreeMap<String, String>),
}

impl Reply {
    /// Interpret as an optional string (`Nil` → `None`).
    pub fn into_opt_string(self) -> KvResult<Option<String>> {
        match self {
            Reply::Nil => Ok(None),
            Reply::Bulk(s) => Ok(Some(s)),
            other => Err(other.unexpected("bulk or nil")),
        }
    }

    pub fn into_int(self) -> KvResult<i64> {
        match self {
            Reply::Int(n) => Ok(n),
            other => Err(other.unexpected("integer")),
        }
    }

    /// Interpret an integer reply as a boolean flag (`0` is false).
    pub fn into_bool(self) -> KvResult<bool> {
        self.into_int().map(|n| n != 0)
    }

    pub fn into_array(self) -> KvResult<Vec<String>> {
        match self {
            Reply::Array(items) => Ok(items),
            other => Err(other.unexpected("array")),
        }
    }

    pub fn into_hash(self) -> KvResult<BTreeMap<String, String>> {
        match self {
            Reply::Hash(map) => Ok(map),
            other => Err(other.unexpected("hash")),
        }
    }

    pub fn into_ok(self) -> KvResult<()> {
        match self {
            Reply::Ok => Ok(()),
            other => Err(other.unexpected("ok")),
        }
    }

    fn unexpected(&self, expected: &'static str) -> KvError {
        KvError::UnexpectedReply {
            expected,
            actual: self.to_string(),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Nil => write!(f, "nil"),
            Reply::Ok => write!(f, "OK"),
            Reply::Int(n) => write!(f, "(integer) {n}"),
            Reply::Bulk(s) => write!(f, "{s:?}"),
            Reply::Array(items) => write!(f, "array[{}]", items.len()),
            Reply::Hash(map) => write!(f, "hash[{}]", map.len()),
        }
    }
}
