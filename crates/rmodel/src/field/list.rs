use rmodel_kv::{Pipeline, Reply};
use serde_json::Value;

use crate::cursor::Cursor;
use crate::db::Db;
use crate::error::ModelResult;
use crate::field::{Bound, Field, Location};
use crate::schema::{FieldKind, FieldSpec};
use crate::session::{Change, SessionRef};

/// A list stored at `<record-key>:<name>`. Elements are coerced one by one;
/// the save transform applies to each element written.
#[derive(Clone, Debug)]
pub struct ListField {
    bound: Bound,
}

impl ListField {
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

    pub fn key(&self) -> &str {
        self.bound.key()
    }

    fn encode_all(&self, values: &[Value]) -> ModelResult<Vec<String>> {
        values
            .iter()
            .map(|v| self.bound.encode(v.clone(), None))
            .collect()
    }

    fn decode_all(&self, raw: Vec<String>) -> ModelResult<Vec<Value>> {
        raw.iter().map(|r| self.bound.coerce(r, None)).collect()
    }

    /// Push values onto the tail. Returns the new length.
    pub fn append<I, V>(&self, values: I) -> ModelResult<u64>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return self.len();
        }
        let raw = self.encode_all(&values)?;
        let len = self.bound.db.kv().list_push(self.key(), raw)?;
        self.bound.session.append(&self.bound.path, values, len);
        Ok(len)
    }

    /// Inclusive range; negative indices count from the tail.
    pub fn range(&self, from: i64, to: i64) -> ModelResult<Vec<Value>> {
        let raw = self.bound.db.kv().list_range(self.key(), from, to)?;
        self.decode_all(raw)
    }

    pub fn all(&self) -> ModelResult<Vec<Value>> {
        self.range(0, -1)
    }

    /// Remove occurrences of `value` (see [`KvStore::list_remove`] for the
    /// meaning of `count`). Not recorded in the session.
    ///
    /// [`KvStore::list_remove`]: rmodel_kv::KvStore::list_remove
    pub fn remove(&self, value: impl Into<Value>, count: i64) -> ModelResult<u64> {
        let raw = self.bound.encode(value.into(), None)?;
        Ok(self.bound.db.kv().list_remove(self.key(), &raw, count)?)
    }

    /// Keep only the inclusive range `from..=to`. Not recorded in the session.
    pub fn trim(&self, from: i64, to: i64) -> ModelResult<()> {
        Ok(self.bound.db.kv().list_trim(self.key(), from, to)?)
    }

    /// Remove and return the head element. Not recorded in the session.
    pub fn pop(&self) -> ModelResult<Option<Value>> {
        self.bound
            .db
            .kv()
            .list_pop(self.key())?
            .map(|raw| self.bound.coerce(&raw, None))
            .transpose()
    }

    pub fn by_index(&self, index: i64) -> ModelResult<Option<Value>> {
        self.bound
            .db
            .kv()
            .list_index(self.key(), index)?
            .map(|raw| self.bound.coerce(&raw, None))
            .transpose()
    }

    /// Replace the whole list in one atomic batch.
    pub fn set<I, V>(&self, values: I) -> ModelResult<Vec<Value>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let raw = self.encode_all(&values)?;
        let mut pipe = Pipeline::new();
        pipe.delete(self.key());
        if !raw.is_empty() {
            pipe.list_push(self.key(), raw.clone());
        }
        self.bound.db.execute(pipe)?;
        self.bound
            .session
            .add(&self.bound.path, Change::Replaced(values));
        self.decode_all(raw)
    }

    pub fn len(&self) -> ModelResult<u64> {
        Ok(self.bound.db.kv().list_len(self.key())?)
    }

    pub fn is_empty(&self) -> ModelResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Whether any element reads back equal to `value` once stored.
    pub fn contains(&self, value: impl Into<Value>) -> ModelResult<bool> {
        let raw = self.bound.encode(value.into(), None)?;
        let needle = self.bound.coerce(&raw, None)?;
        Ok(self.all()?.contains(&needle))
    }
}

impl Field for ListField {
    fn name(&self) -> &str {
        self.bound.spec.name
    }

    fn kind(&self) -> FieldKind {
        FieldKind::List
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
        Location::List {
            key: self.key().to_string(),
        }
    }

    fn queue_read(&self, pipe: &mut Pipeline) {
        pipe.list_range(self.key(), 0, -1);
    }

    fn read_reply(&self, reply: Reply) -> ModelResult<Value> {
        Ok(Value::Array(self.decode_all(reply.into_array()?)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::schema::Schema;
    use crate::session::{no_session, RecordingSession};
    use crate::value::ValueType;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::LazyLock;

    fn double(v: Value) -> Value {
        match v.as_i64() {
            Some(n) => json!(n * 2),
            None => v,
        }
    }

    static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
        Schema::builder("S")
            .list("list", ValueType::Int)
            .list("names", ValueType::Str)
            .list("doubled", ValueType::Int)
            .on_save(double)
            .build()
    });

    fn bind(name: &str, db: &Db, session: SessionRef) -> ListField {
        ListField::bind(
            &Cursor::root("m"),
            SCHEMA.field(name).unwrap(),
            SCHEMA.record_default(name),
            db.clone(),
            session,
        )
    }

    // -----------------------------------------------------------------------
    // Reads and writes
    // -----------------------------------------------------------------------

    #[test]
    fn append_then_range() {
        let db = Db::in_memory();
        let l = bind("list", &db, no_session());
        assert_eq!(l.append([1, 2]).unwrap(), 2);
        assert_eq!(l.append([3]).unwrap(), 3);
        assert_eq!(l.key(), "m:list");
        assert_eq!(l.all().unwrap(), vec![json!(1), json!(2), json!(3)]);
        assert_eq!(l.range(1, -1).unwrap(), vec![json!(2), json!(3)]);
        assert_eq!(l.len().unwrap(), 3);
    }

    #[test]
    fn empty_append_is_a_no_op() {
        let db = Db::in_memory();
        let session = RecordingSession::shared();
        let l = bind("list", &db, session.clone());
        assert_eq!(l.append(Vec::<i64>::new()).unwrap(), 0);
        assert!(session.is_empty());
    }

    #[test]
    fn set_replaces_atomically() {
        let db = Db::in_memory();
        let l = bind("names", &db, no_session());
        l.append(["old"]).unwrap();
        assert_eq!(l.set(["a", "b"]).unwrap(), vec![json!("a"), json!("b")]);
        assert_eq!(l.all().unwrap(), vec![json!("a"), json!("b")]);
        l.set(Vec::<String>::new()).unwrap();
        assert!(l.is_empty().unwrap());
        assert!(!db.kv().exists("m:names").unwrap());
    }

    #[test]
    fn remove_trim_pop_index() {
        let db = Db::in_memory();
        let l = bind("list", &db, no_session());
        l.set([1, 2, 1, 3, 1]).unwrap();
        assert_eq!(l.remove(1, 2).unwrap(), 2);
        assert_eq!(l.all().unwrap(), vec![json!(2), json!(3), json!(1)]);
        l.trim(0, 1).unwrap();
        assert_eq!(l.all().unwrap(), vec![json!(2), json!(3)]);
        assert_eq!(l.by_index(-1).unwrap(), Some(json!(3)));
        assert_eq!(l.by_index(9).unwrap(), None);
        assert_eq!(l.pop().unwrap(), Some(json!(2)));
        assert_eq!(l.pop().unwrap(), Some(json!(3)));
        assert_eq!(l.pop().unwrap(), None);
    }

    #[test]
    fn contains_compares_coerced_values() {
        let db = Db::in_memory();
        let l = bind("list", &db, no_session());
        l.append([4, 5]).unwrap();
        assert!(l.contains(5).unwrap());
        assert!(l.contains("5").unwrap());
        assert!(!l.contains(6).unwrap());
    }

    #[test]
    fn save_transform_applies_per_element() {
        let db = Db::in_memory();
        let l = bind("doubled", &db, no_session());
        l.append([1, 2]).unwrap();
        assert_eq!(l.all().unwrap(), vec![json!(2), json!(4)]);
    }

    #[test]
    fn bad_element_fails_whole_read() {
        let db = Db::in_memory();
        db.kv()
            .list_push("m:list", vec!["1".into(), "x".into()])
            .unwrap();
        let l = bind("list", &db, no_session());
        assert!(matches!(
            l.all().unwrap_err(),
            ModelError::TypeMismatch { .. }
        ));
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    #[test]
    fn appends_and_replacements_are_distinct() {
        let db = Db::in_memory();
        let session = RecordingSession::shared();
        let l = bind("list", &db, session.clone());
        l.append([1]).unwrap();
        l.append([2]).unwrap();
        assert_eq!(
            l.changes().unwrap().as_change(),
            Some(&Change::Appended {
                values: vec![json!(1), json!(2)],
                len: 2
            })
        );
        l.set([9]).unwrap();
        assert_eq!(
            l.changes().unwrap().as_change(),
            Some(&Change::Replaced(vec![json!(9)]))
        );
    }

    #[test]
    fn structural_edits_are_untracked() {
        let db = Db::in_memory();
        let l = bind("list", &db, no_session());
        l.set([1, 2, 3]).unwrap();

        let session = RecordingSession::shared();
        let tracked = bind("list", &db, session.clone());
        tracked.remove(1, 0).unwrap();
        tracked.trim(0, 0).unwrap();
        tracked.pop().unwrap();
        assert!(session.is_empty());
    }

    proptest! {
        #[test]
        fn set_then_read_round_trips(values in proptest::collection::vec(any::<i64>(), 0..20)) {
            let db = Db::in_memory();
            let l = bind("list", &db, no_session());
            l.set(values.clone()).unwrap();
            let expected: Vec<Value> = values.into_iter().map(Value::from).collect();
            prop_assert_eq!(l.all().unwrap(), expected);
        }
    }
}
