//! Typed field bindings.
//!
//! A binding is the per-record view of one declared field: the field's
//! [`FieldSpec`], the cursor its data lives under, the store handle and the
//! session writes are recorded in. Bindings own no data.
//!
//! - [`ScalarField`] -- one field of the record's own hash
//! - [`HashField`] -- a hash at `<record-key>:<name>`
//! - [`ListField`] -- a list at `<record-key>:<name>`

pub mod hash;
pub mod list;
pub mod scalar;

use rmodel_kv::{Pipeline, Reply};
use serde::Serialize;
use serde_json::Value;

use crate::cursor::Cursor;
use crate::db::Db;
use crate::error::{ModelError, ModelResult};
use crate::schema::{FieldKind, FieldSpec};
use crate::session::{Change, ChangeTree, SessionRef};
use crate::value;

pub use hash::HashField;
pub use list::ListField;
pub use scalar::ScalarField;

/// Where a field's data physically lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    /// One field of a hash.
    HashField { key: String, field: String },
    /// A whole hash.
    Hash { key: String },
    /// A whole list.
    List { key: String },
}

impl Location {
    pub fn key(&self) -> &str {
        match self {
            Location::HashField { key, .. } | Location::Hash { key } | Location::List { key } => key,
        }
    }

    pub(crate) fn queue_delete(&self, pipe: &mut Pipeline) {
        match self {
            Location::HashField { key, field } => pipe.hash_delete(key, field),
            Location::Hash { key } | Location::List { key } => pipe.delete(key),
        };
    }

    pub(crate) fn queue_exists(&self, pipe: &mut Pipeline) {
        match self {
            Location::HashField { key, field } => pipe.hash_exists(key, field),
            Location::Hash { key } | Location::List { key } => pipe.exists(key),
        };
    }

    /// Queue a raw (uncoerced) read of the whole location.
    pub(crate) fn queue_raw_read(&self, pipe: &mut Pipeline) {
        match self {
            Location::HashField { key, field } => pipe.hash_get(key, field),
            Location::Hash { key } => pipe.hash_get_all(key),
            Location::List { key } => pipe.list_range(key, 0, -1),
        };
    }

    /// Queue writing back a reply produced by
    /// [`queue_raw_read`](Location::queue_raw_read). Absent data queues
    /// nothing.
    pub(crate) fn queue_write(&self, pipe: &mut Pipeline, raw: Reply) -> ModelResult<()> {
        match self {
            Location::HashField { key, field } => {
                if let Some(value) = raw.into_opt_string()? {
                    pipe.hash_set(key, field, &value);
                }
            }
            Location::Hash { key } => {
                let entries: Vec<(String, String)> = raw.into_hash()?.into_iter().collect();
                if !entries.is_empty() {
                    pipe.hash_set_many(key, entries);
                }
            }
            Location::List { key } => {
                let values = raw.into_array()?;
                if !values.is_empty() {
                    pipe.list_push(key, values);
                }
            }
        }
        Ok(())
    }

    /// The same location with its key translated by `rebase`.
    pub(crate) fn with_key(&self, key: String) -> Location {
        match self {
            Location::HashField { field, .. } => Location::HashField {
                key,
                field: field.clone(),
            },
            Location::Hash { .. } => Location::Hash { key },
            Location::List { .. } => Location::List { key },
        }
    }
}

/// Common behaviour of every leaf binding.
///
/// Records drive batched reads and deletes through this trait: each field
/// queues its own commands into a shared [`Pipeline`] and decodes its own
/// reply.
pub trait Field {
    /// Declared field name (the binding's prefix).
    fn name(&self) -> &str;

    fn kind(&self) -> FieldKind;

    /// Session path of this field: the record's segments plus the name.
    fn path(&self) -> &[String];

    fn session(&self) -> &SessionRef;

    fn db(&self) -> &Db;

    fn location(&self) -> Location;

    /// Queue the commands that read this field's full value.
    fn queue_read(&self, pipe: &mut Pipeline);

    /// Decode the reply produced by [`queue_read`](Field::queue_read).
    fn read_reply(&self, reply: Reply) -> ModelResult<Value>;

    /// Queue deletion of this field's data.
    fn queue_clean(&self, pipe: &mut Pipeline) {
        self.location().queue_delete(pipe);
    }

    /// Delete the field's data and record the deletion.
    fn clean(&self) -> ModelResult<()> {
        let mut pipe = Pipeline::new();
        self.queue_clean(&mut pipe);
        self.db().execute(pipe)?;
        self.session().add(self.path(), Change::Removed);
        Ok(())
    }

    /// Everything the session recorded for this field.
    fn changes(&self) -> Option<ChangeTree> {
        self.session().changes(self.path())
    }
}

/// Per-instance binding state shared by the three field kinds.
#[derive(Clone, Debug)]
pub(crate) struct Bound {
    pub(crate) spec: &'static FieldSpec,
    pub(crate) record_default: Option<&'static Value>,
    /// Cursor of the data: the record's own for scalars, the record's child
    /// for hashes and lists.
    pub(crate) cursor: Cursor,
    pub(crate) path: Vec<String>,
    pub(crate) db: Db,
    pub(crate) session: SessionRef,
}

impl Bound {
    pub(crate) fn new(
        record: &Cursor,
        spec: &'static FieldSpec,
        record_default: Option<&'static Value>,
        db: Db,
        session: SessionRef,
    ) -> Self {
        let cursor = match spec.kind {
            FieldKind::Scalar => record.clone(),
            _ => record.child(spec.name),
        };
        Self {
            spec,
            record_default,
            cursor,
            path: record.path_with(spec.name),
            db,
            session,
        }
    }

    pub(crate) fn key(&self) -> &str {
        self.cursor.key()
    }

    /// Human-readable location for error messages.
    pub(crate) fn at(&self, entry: Option<&str>) -> String {
        match (self.spec.kind, entry) {
            (FieldKind::Scalar, _) => format!("{}/{}", self.cursor.key(), self.spec.name),
            (_, Some(entry)) => format!("{}/{entry}", self.cursor.key()),
            (_, None) => self.cursor.key().to_string(),
        }
    }

    /// Default chain: field default, then record default, then null.
    pub(crate) fn default_value(&self) -> Value {
        self.spec
            .default
            .as_ref()
            .or(self.record_default)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Coerce a stored string and apply the load transform.
    pub(crate) fn coerce(&self, raw: &str, entry: Option<&str>) -> ModelResult<Value> {
        let value = self
            .spec
            .value_type
            .coerce(raw)
            .ok_or_else(|| ModelError::TypeMismatch {
                at: self.at(entry),
                raw: raw.to_string(),
                expected: self.spec.value_type.to_string(),
            })?;
        Ok(match self.spec.on_load {
            Some(load) => load(value),
            None => value,
        })
    }

    /// Coerce an optional stored string, falling back to the default chain.
    pub(crate) fn decode(&self, raw: Option<String>, entry: Option<&str>) -> ModelResult<Value> {
        match raw {
            Some(raw) => self.coerce(&raw, entry),
            None => Ok(self.default_value()),
        }
    }

    /// Apply the save transform and flatten to the stored string.
    ///
    /// The result is checked against the declared type so a value that
    /// could never be read back is rejected before it reaches the store.
    pub(crate) fn encode(&self, value: Value, entry: Option<&str>) -> ModelResult<String> {
        let value = match self.spec.on_save {
            Some(save) => save(value),
            None => value,
        };
        let raw = value::encode(&value).map_err(|reason| ModelError::Unencodable {
            at: self.at(entry),
            value: value.to_string(),
            reason,
        })?;
        if self.spec.value_type.coerce(&raw).is_none() {
            return Err(ModelError::TypeMismatch {
                at: self.at(entry),
                raw,
                expected: self.spec.value_type.to_string(),
            });
        }
        Ok(raw)
    }

    /// Deserialize a coerced value into a concrete Rust type.
    pub(crate) fn convert<T: serde::de::DeserializeOwned>(
        &self,
        value: Value,
        entry: Option<&str>,
    ) -> ModelResult<Option<T>> {
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|_| ModelError::TypeMismatch {
                at: self.at(entry),
                raw: value.to_string(),
                expected: std::any::type_name::<T>().to_string(),
            })
    }
}
