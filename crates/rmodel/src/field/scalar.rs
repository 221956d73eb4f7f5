use rmodel_kv::{Pipeline, Reply};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cursor::Cursor;
use crate::db::Db;
use crate::error::{ModelError, ModelResult};
use crate::field::{Bound, Field, Location};
use crate::schema::{FieldKind, FieldSpec};
use crate::session::{Change, SessionRef};
use crate::value::ValueType;

/// A scalar stored as one field of the record's own hash.
#[derive(Clone, Debug)]
pub struct ScalarField {
    bound: Bound,
}

impl ScalarField {
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

    pub fn value_type(&self) -> ValueType {
        self.bound.spec.value_type
    }

    /// Read and coerce the value, resolving absence through the default
    /// chain.
    pub fn get(&self) -> ModelResult<Value> {
        let raw = self.bound.db.kv().hash_get(self.bound.key(), self.name())?;
        self.bound.decode(raw, None)
    }

    /// Read into a concrete type. `Ok(None)` when the value and every
    /// default are absent.
    pub fn get_as<T: DeserializeOwned>(&self) -> ModelResult<Option<T>> {
        let value = self.get()?;
        self.bound.convert(value, None)
    }

    /// Store a value and record it in the session. Returns the value as it
    /// will read back.
    pub fn set(&self, value: impl Into<Value>) -> ModelResult<Value> {
        let value = value.into();
        let raw = self.bound.encode(value.clone(), None)?;
        self.bound
            .db
            .kv()
            .hash_set(self.bound.key(), self.name(), &raw)?;
        self.bound.session.add(&self.bound.path, Change::Set(value));
        self.bound.coerce(&raw, None)
    }

    /// Atomically add `delta` in the store. Not recorded in the session.
    pub fn increment(&self, delta: i64) -> ModelResult<i64> {
        if self.value_type() != ValueType::Int {
            return Err(ModelError::KindMismatch {
                field: self.name().to_string(),
                expected: "int",
                actual: self.value_type().name(),
            });
        }
        Ok(self
            .bound
            .db
            .kv()
            .hash_incr_by(self.bound.key(), self.name(), delta)?)
    }

    /// Atomically subtract `delta` in the store. Not recorded in the session.
    pub fn decrement(&self, delta: i64) -> ModelResult<i64> {
        let negated = delta.checked_neg().ok_or_else(|| ModelError::TypeMismatch {
            at: self.bound.at(None),
            raw: format!("-({delta})"),
            expected: "int".into(),
        })?;
        self.increment(negated)
    }
}

impl Field for ScalarField {
    fn name(&self) -> &str {
        self.bound.spec.name
    }

    fn kind(&self) -> FieldKind {
        FieldKind::Scalar
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
        Location::HashField {
            key: self.bound.key().to_string(),
            field: self.name().to_string(),
        }
    }

    fn queue_read(&self, pipe: &mut Pipeline) {
        pipe.hash_get(self.bound.key(), self.name());
    }

    fn read_reply(&self, reply: Reply) -> ModelResult<Value> {
        self.bound.decode(reply.into_opt_string()?, None)
    }
}
