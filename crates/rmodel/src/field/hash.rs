use rmodel_kv::{Pipeline, Reply};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::cursor::Cursor;
use crate::db::Db;
use crate::error::{ModelError, ModelResult};
use crate::field::{Bound, Field, Location};
use crate::schema::{FieldKind, FieldSpec};
use crate::session::{Change, SessionRef};

/// A hash stored at `<record-key>:<name>`. Every entry shares the declared
/// value type; absent entries read as the field's default.
#[derive(Clone, Debug)]
pub struct HashField {
    bound: Bound,
}

impl HashField {
    pub(crate) fn bind(
        record: &Cursor,
        spec: &'static FieldSpec,
        record_default: Option<&'static Value>,
        db: Db,
        session: SessionRef,
    ) -> Self {
        Self {
            bound: Bound::new(record, spec, record_default, db, session),
        }
    }

    /// Store key of the hash.
    pub fn key(&self) -> &str {
        self.bound.key()
    }

    fn entry_path(&self, entry: &str) -> Vec<String> {
        let mut path = self.bound.path.clone();
        path.push(entry.to_string());
        path
    }

    fn decode_all(
        &self,
        raw: impl IntoIterator<Item = (String, String)>,
    ) -> ModelResult<Map<String, Value>> {
        raw.into_iter()
            .map(|(entry, v)| {
                let value = self.bound.coerce(&v, Some(&entry))?;
                Ok((entry, value))
            })
            .collect()
    }

    pub fn get(&self, entry: &str) -> ModelResult<Value> {
        let raw = self.bound.db.kv().hash_get(self.key(), entry)?;
        self.bound.decode(raw, Some(entry))
    }

    pub fn get_as<T: DeserializeOwned>(&self, entry: &str) -> ModelResult<Option<T>> {
        let value = self.get(entry)?;
        self.bound.convert(value, Some(entry))
    }

    /// Store one entry and record it at `<field-path>/<entry>`.
    pub fn set(&self, entry: &str, value: impl Into<Value>) -> ModelResult<Value> {
        let value = value.into();
        let raw = self.bound.encode(value.clone(), Some(entry))?;
        self.bound.db.kv().hash_set(self.key(), entry, &raw)?;
        self.bound.session.add(&self.entry_path(entry), Change::Set(value));
        self.bound.coerce(&raw, Some(entry))
    }

    /// Store several entries in one command.
    pub fn set_many<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>) -> ModelResult<()>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let entries: Vec<(String, Value)> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let raw = entries
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.bound.encode(v.clone(), Some(k))?)))
            .collect::<ModelResult<Vec<_>>>()?;
        self.bound.db.kv().hash_set_many(self.key(), raw)?;
        for (entry, value) in entries {
            self.bound.session.add(&self.entry_path(&entry), Change::Set(value));
        }
        Ok(())
    }

    /// Store `value` under the next positional entry (the current size).
    /// Returns the entry name used.
    pub fn add(&self, value: impl Into<Value>) -> ModelResult<String> {
        let entry = self.len()?.to_string();
        self.set(&entry, value)?;
        Ok(entry)
    }

    /// Delete one entry. Returns `true` if it existed.
    pub fn remove(&self, entry: &str) -> ModelResult<bool> {
        let removed = self.bound.db.kv().hash_delete(self.key(), entry)?;
        self.bound.session.add(&self.entry_path(entry), Change::Removed);
        Ok(removed)
    }

    /// Every entry, coerced. Empty when the hash does not exist.
    pub fn all(&self) -> ModelResult<Map<String, Value>> {
        let raw = self.bound.db.kv().hash_get_all(self.key())?;
        self.decode_all(raw)
    }

    pub fn contains(&self, entry: &str) -> ModelResult<bool> {
        Ok(self.bound.db.kv().hash_exists(self.key(), entry)?)
    }

    /// Number of entries.
    pub fn len(&self) -> ModelResult<u64> {
        Ok(self.bound.db.kv().hash_len(self.key())?)
    }

    pub fn is_empty(&self) -> ModelResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Entry names in store order.
    pub fn keys(&self) -> ModelResult<Vec<String>> {
        Ok(self.bound.db.kv().hash_keys(self.key())?)
    }

    fn overflow(&self, entry: &str, current: i64, op: char, delta: i64) -> ModelError {
        ModelError::TypeMismatch {
            at: self.bound.at(Some(entry)),
            raw: format!("{current} {op} {delta}"),
            expected: "int".into(),
        }
    }

    fn current_int(&self, entry: &str) -> ModelResult<i64> {
        let value = self.get(entry)?;
        match &value {
            Value::Null => Ok(0),
            Value::Number(n) => n.as_i64().ok_or_else(|| ModelError::TypeMismatch {
                at: self.bound.at(Some(entry)),
                raw: value.to_string(),
                expected: "int".into(),
            }),
            other => Err(ModelError::TypeMismatch {
                at: self.bound.at(Some(entry)),
                raw: other.to_string(),
                expected: "int".into(),
            }),
        }
    }

    /// Read-modify-write counter: add `delta` to an entry. Recorded in the
    /// session like any other `set`.
    pub fn incr(&self, entry: &str, delta: i64) -> ModelResult<i64> {
        let current = self.current_int(entry)?;
        let next = current
            .checked_add(delta)
            .ok_or_else(|| self.overflow(entry, current, '+', delta))?;
        self.set(entry, next)?;
        Ok(next)
    }

    /// Read-modify-write counter: subtract `delta` from an entry and drop
    /// the entry once it reaches zero.
    pub fn decr(&self, entry: &str, delta: i64) -> ModelResult<i64> {
        let current = self.current_int(entry)?;
        let next = current
            .checked_sub(delta)
            .ok_or_else(|| self.overflow(entry, current, '-', delta))?;
        if next == 0 {
            self.remove(entry)?;
        } else {
            self.set(entry, next)?;
        }
        Ok(next)
    }
}

impl Field for HashField {
    fn name(&self) -> &str {
        self.bound.spec.name
    }

    fn kind(&self) -> FieldKind {
        FieldKind::Hash
    }

    fn path(&self) -> &[String] {
        &self.bound.path
    }

    fn session(&self) -> &SessionRef {
        &self.bound.session
    }

    fn db(&self) -> &Db {
        &self.bound.db
    }

    fn location(&self) -> Location {
        Location::Hash {
            key: self.key().to_string(),
        }
    }

    fn queue_read(&self, pipe: &mut Pipeline) {
        pipe.hash_get_all(self.key());
    }

    fn read_reply(&self, reply: Reply) -> ModelResult<Value> {
        Ok(Value::Object(self.decode_all(reply.into_hash()?)?))
    }
}
