//! Records: a schema bound at one cursor.
//!
//! A [`Record`] holds one [`Binding`] per declared field, in declaration
//! order. Nested unit fields become nested records (or collections when the
//! nested schema assigns an item schema), all sharing the parent's store
//! handle and session.
//!
//! Whole-record reads and deletes are planned first and then executed as a
//! single pipeline, so `data()` and `remove()` cost one round trip no matter
//! how many fields the record has.

use rmodel_kv::{Pipeline, Reply};
use serde_json::{Map, Value};
use tracing::debug;

use crate::collection::Collection;
use crate::cursor::Cursor;
use crate::db::Db;
use crate::error::{ModelError, ModelResult};
use crate::field::{Field, HashField, ListField, Location, ScalarField};
use crate::schema::{FieldKind, Schema};
use crate::session::{Change, ChangeTree, Changes, SessionRef};

/// The per-record binding of one declared field.
#[derive(Clone, Debug)]
pub enum Binding {
    Scalar(ScalarField),
    Hash(HashField),
    List(ListField),
    Unit(Record),
    Collection(Collection),
}

impl Binding {
    pub fn name(&self) -> &str {
        match self {
            Binding::Scalar(f) => f.name(),
            Binding::Hash(f) => f.name(),
            Binding::List(f) => f.name(),
            Binding::Unit(r) => r.prefix(),
            Binding::Collection(c) => c.record().prefix(),
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Binding::Scalar(_) => FieldKind::Scalar,
            Binding::Hash(_) => FieldKind::Hash,
            Binding::List(_) => FieldKind::List,
            Binding::Unit(_) | Binding::Collection(_) => FieldKind::Unit,
        }
    }

    /// The leaf view, for scalar, hash and list bindings.
    pub fn as_field(&self) -> Option<&dyn Field> {
        match self {
            Binding::Scalar(f) => Some(f),
            Binding::Hash(f) => Some(f),
            Binding::List(f) => Some(f),
            Binding::Unit(_) | Binding::Collection(_) => None,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Binding::Collection(_) => "collection",
            other => other.kind().name(),
        }
    }
}

/// One stored location owned by a record tree, with the session path to
/// record its deletion at. Index hashes carry no path.
#[derive(Clone, Debug)]
pub(crate) struct Leaf {
    pub(crate) location: Location,
    pub(crate) path: Option<Vec<String>>,
}

impl Leaf {
    fn of(field: &dyn Field) -> Self {
        Self {
            location: field.location(),
            path: Some(field.path().to_vec()),
        }
    }
}

enum PlanEntry {
    Field(Box<dyn Field>),
    Group(ReadPlan),
}

/// A tree of field reads, queued into one pipeline and assembled back into
/// a JSON object of the same shape.
pub(crate) struct ReadPlan {
    entries: Vec<(String, PlanEntry)>,
}

impl ReadPlan {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn push_field(&mut self, name: impl Into<String>, field: Box<dyn Field>) {
        self.entries.push((name.into(), PlanEntry::Field(field)));
    }

    pub(crate) fn push_group(&mut self, name: impl Into<String>, plan: ReadPlan) {
        self.entries.push((name.into(), PlanEntry::Group(plan)));
    }

    fn queue(&self, pipe: &mut Pipeline) {
        for (_, entry) in &self.entries {
            match entry {
                PlanEntry::Field(f) => f.queue_read(pipe),
                PlanEntry::Group(plan) => plan.queue(pipe),
            }
        }
    }

    fn assemble(&self, replies: &mut impl Iterator<Item = Reply>) -> ModelResult<Value> {
        let mut out = Map::new();
        for (name, entry) in &self.entries {
            let value = match entry {
                PlanEntry::Field(f) => {
                    let reply = replies.next().ok_or(rmodel_kv::KvError::UnexpectedReply {
                        expected: "reply",
                        actual: "end of batch".into(),
                    })?;
                    f.read_reply(reply)?
                }
                PlanEntry::Group(plan) => plan.assemble(replies)?,
            };
            out.insert(name.clone(), value);
        }
        Ok(Value::Object(out))
    }
}

/// A record read queued into a caller-owned pipeline. Resolve it against the
/// replies of that pipeline once executed.
pub struct PendingData {
    plan: ReadPlan,
    offset: usize,
    len: usize,
}

impl PendingData {
    pub(crate) fn queue(plan: ReadPlan, pipe: &mut Pipeline) -> Self {
        let offset = pipe.len();
        plan.queue(pipe);
        let len = pipe.len() - offset;
        Self { plan, offset, len }
    }

    /// Number of commands this read queued.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Assemble the record's data from the full reply vector of the
    /// pipeline this read was queued into.
    pub fn resolve(self, replies: &[Reply]) -> ModelResult<Value> {
        let window = replies
            .get(self.offset..self.offset + self.len)
            .ok_or(rmodel_kv::KvError::ReplyCount {
                expected: self.offset + self.len,
                actual: replies.len(),
            })?;
        self.plan.assemble(&mut window.iter().cloned())
    }
}

/// Delete every leaf in one atomic batch, then record the deletions.
pub(crate) fn remove_leaves(
    db: &Db,
    session: &SessionRef,
    leaves: &[Leaf],
    mut pipe: Pipeline,
) -> ModelResult<Vec<Reply>> {
    for leaf in leaves {
        leaf.location.queue_delete(&mut pipe);
    }
    let replies = db.execute(pipe)?;
    for path in leaves.iter().filter_map(|l| l.path.as_deref()) {
        session.add(path, Change::Removed);
    }
    Ok(replies)
}

/// A schema bound at a cursor.
#[derive(Clone, Debug)]
pub struct Record {
    schema: &'static Schema,
    cursor: Cursor,
    db: Db,
    session: SessionRef,
    bindings: Vec<Binding>,
}

impl Record {
    /// Open a root record at the schema's declared prefix.
    pub fn open(db: &Db, schema: &'static Schema, session: SessionRef) -> ModelResult<Self> {
        Self::bind(db, schema, Cursor::root(schema.prefix()), session)
    }

    /// Open a root record at an explicit prefix.
    pub fn open_at(
        db: &Db,
        schema: &'static Schema,
        prefix: &str,
        session: SessionRef,
    ) -> ModelResult<Self> {
        Self::bind(db, schema, Cursor::root(prefix), session)
    }

    /// Open a record one segment below `parent`.
    pub fn open_under(
        db: &Db,
        parent: &Cursor,
        schema: &'static Schema,
        prefix: &str,
        session: SessionRef,
    ) -> ModelResult<Self> {
        Self::bind(db, schema, parent.child(prefix), session)
    }

    /// Bind every declared field at `cursor`, then run the init hook.
    pub(crate) fn bind(
        db: &Db,
        schema: &'static Schema,
        cursor: Cursor,
        session: SessionRef,
    ) -> ModelResult<Self> {
        let mut bindings = Vec::with_capacity(schema.fields().len());
        for spec in schema.fields() {
            let record_default = schema.record_default(spec.name);
            let binding = match (spec.kind, spec.nested) {
                (FieldKind::Scalar, _) => Binding::Scalar(ScalarField::bind(
                    &cursor,
                    spec,
                    record_default,
                    db.clone(),
                    session.clone(),
                )),
                (FieldKind::Hash, _) => Binding::Hash(HashField::bind(
                    &cursor,
                    spec,
                    record_default,
                    db.clone(),
                    session.clone(),
                )),
                (FieldKind::List, _) => Binding::List(ListField::bind(
                    &cursor,
                    spec,
                    record_default,
                    db.clone(),
                    session.clone(),
                )),
                (FieldKind::Unit, Some(nested)) if nested.is_collection() => {
                    Binding::Collection(Collection::bind(
                        db,
                        nested,
                        cursor.child(spec.name),
                        session.clone(),
                    )?)
                }
                (FieldKind::Unit, Some(nested)) => Binding::Unit(Record::bind(
                    db,
                    nested,
                    cursor.child(spec.name),
                    session.clone(),
                )?),
                (FieldKind::Unit, None) => {
                    return Err(ModelError::KindMismatch {
                        field: spec.name.to_string(),
                        expected: "unit",
                        actual: "unit without schema",
                    })
                }
            };
            bindings.push(binding);
        }

        let record = Self {
            schema,
            cursor,
            db: db.clone(),
            session,
            bindings,
        };
        if let Some(init) = schema.on_init() {
            init(&record)?;
        }
        Ok(record)
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Store key of the record's own hash.
    pub fn key(&self) -> &str {
        self.cursor.key()
    }

    /// The last cursor segment: the record's name within its parent.
    pub fn prefix(&self) -> &str {
        self.cursor.prefix()
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn session(&self) -> &SessionRef {
        &self.session
    }

    /// Bindings in declaration order.
    pub fn fields(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn field(&self, name: &str) -> ModelResult<&Binding> {
        self.bindings
            .iter()
            .find(|b| b.name() == name)
            .ok_or_else(|| ModelError::UnknownField {
                schema: self.schema.name().to_string(),
                field: name.to_string(),
            })
    }

    fn mismatch(binding: &Binding, expected: &'static str) -> ModelError {
        ModelError::KindMismatch {
            field: binding.name().to_string(),
            expected,
            actual: binding.kind_name(),
        }
    }

    pub fn scalar(&self, name: &str) -> ModelResult<&ScalarField> {
        match self.field(name)? {
            Binding::Scalar(f) => Ok(f),
            other => Err(Self::mismatch(other, "scalar")),
        }
    }

    pub fn hash(&self, name: &str) -> ModelResult<&HashField> {
        match self.field(name)? {
            Binding::Hash(f) => Ok(f),
            other => Err(Self::mismatch(other, "hash")),
        }
    }

    pub fn list(&self, name: &str) -> ModelResult<&ListField> {
        match self.field(name)? {
            Binding::List(f) => Ok(f),
            other => Err(Self::mismatch(other, "list")),
        }
    }

    pub fn unit(&self, name: &str) -> ModelResult<&Record> {
        match self.field(name)? {
            Binding::Unit(r) => Ok(r),
            other => Err(Self::mismatch(other, "unit")),
        }
    }

    pub fn collection(&self, name: &str) -> ModelResult<&Collection> {
        match self.field(name)? {
            Binding::Collection(c) => Ok(c),
            other => Err(Self::mismatch(other, "collection")),
        }
    }

    /// Plan reads of every field, recursing into nested records and
    /// collections.
    pub(crate) fn read_plan(&self) -> ModelResult<ReadPlan> {
        let mut plan = ReadPlan::new();
        for binding in &self.bindings {
            match binding {
                Binding::Scalar(f) => plan.push_field(f.name(), Box::new(f.clone())),
                Binding::Hash(f) => plan.push_field(f.name(), Box::new(f.clone())),
                Binding::List(f) => plan.push_field(f.name(), Box::new(f.clone())),
                Binding::Unit(r) => plan.push_group(r.prefix(), r.read_plan()?),
                Binding::Collection(c) => plan.push_group(c.record().prefix(), c.read_plan()?),
            }
        }
        Ok(plan)
    }

    /// Queue this record's reads into a caller-owned pipeline.
    pub fn data_in(&self, pipe: &mut Pipeline) -> ModelResult<PendingData> {
        Ok(PendingData::queue(self.read_plan()?, pipe))
    }

    /// Every field's value, keyed by field name, read in one round trip.
    /// Absent fields read as their defaults.
    pub fn data(&self) -> ModelResult<Value> {
        let mut pipe = Pipeline::new();
        let pending = self.data_in(&mut pipe)?;
        let replies = self.db.execute(pipe)?;
        pending.resolve(&replies)
    }

    /// Every stored location the record tree owns.
    pub(crate) fn leaves(&self) -> ModelResult<Vec<Leaf>> {
        let mut leaves = Vec::new();
        for binding in &self.bindings {
            match binding {
                Binding::Scalar(f) => leaves.push(Leaf::of(f)),
                Binding::Hash(f) => leaves.push(Leaf::of(f)),
                Binding::List(f) => leaves.push(Leaf::of(f)),
                Binding::Unit(r) => leaves.extend(r.leaves()?),
                Binding::Collection(c) => leaves.extend(c.leaves()?),
            }
        }
        Ok(leaves)
    }

    /// Delete every field in one atomic batch and record each deletion.
    pub fn remove(&self) -> ModelResult<()> {
        let leaves = self.leaves()?;
        remove_leaves(&self.db, &self.session, &leaves, Pipeline::new())?;
        debug!(key = %self.cursor, leaves = leaves.len(), "record removed");
        Ok(())
    }

    /// Whether any field of the record tree holds data.
    pub fn exists(&self) -> ModelResult<bool> {
        let mut pipe = Pipeline::new();
        for leaf in self.leaves()? {
            leaf.location.queue_exists(&mut pipe);
        }
        for reply in self.db.execute(pipe)? {
            if reply.into_bool()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `true` when nothing is stored for this record.
    pub fn is_empty(&self) -> ModelResult<bool> {
        Ok(!self.exists()?)
    }

    /// Everything the session recorded below this record, keyed by field
    /// name. `None` when nothing was written or the session does not track.
    pub fn changes(&self) -> Option<Changes> {
        match self.session.changes(self.cursor.items())? {
            ChangeTree::Nested(changes) | ChangeTree::Branch { children: changes, .. } => {
                Some(changes)
            }
            ChangeTree::Leaf(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{no_session, RecordingSession};
    use crate::value::ValueType;
    use rmodel_kv::InMemoryKv;
    use serde_json::json;
    use std::sync::{Arc, LazyLock};

    fn tag(record: &Record) -> ModelResult<()> {
        record.scalar("kind")?.set("tagged")?;
        Ok(())
    }

    fn reject(_record: &Record) -> ModelResult<()> {
        Err(ModelError::Hook("not allowed".into()))
    }

    static INNER: LazyLock<Schema> = LazyLock::new(|| {
        Schema::builder("Inner")
            .scalar_with_default("depth", ValueType::Int, 1)
            .list("steps", ValueType::Str)
            .build()
    });

    static OUTER: LazyLock<Schema> = LazyLock::new(|| {
        Schema::builder("Outer")
            .prefix("outer")
            .scalar("id", ValueType::Int)
            .scalar("name", ValueType::Str)
            .hash_with_default("hash", ValueType::Int, 0)
            .list("list", ValueType::Int)
            .unit("inner", &INNER)
            .default("name", "nobody")
            .build()
    });

    static TAGGED: LazyLock<Schema> = LazyLock::new(|| {
        Schema::builder("Tagged")
            .scalar("kind", ValueType::Str)
            .on_init(tag)
            .build()
    });

    static REJECTED: LazyLock<Schema> =
        LazyLock::new(|| Schema::builder("Rejected").on_init(reject).build());

    fn outer(db: &Db, session: SessionRef) -> Record {
        Record::open(db, &OUTER, session).unwrap()
    }

    // -----------------------------------------------------------------------
    // Binding
    // -----------------------------------------------------------------------

    #[test]
    fn fields_follow_declaration_order() {
        let db = Db::in_memory();
        let r = outer(&db, no_session());
        let names: Vec<_> = r.fields().iter().map(Binding::name).collect();
        assert_eq!(names, vec!["id", "name", "hash", "list", "inner"]);
        assert_eq!(r.key(), "outer");
        assert_eq!(r.unit("inner").unwrap().key(), "outer:inner");
    }

    #[test]
    fn open_at_and_under() {
        let db = Db::in_memory();
        let r = Record::open_at(&db, &OUTER, "1", no_session()).unwrap();
        assert_eq!(r.key(), "1");
        let child =
            Record::open_under(&db, r.cursor(), &INNER, "x", no_session()).unwrap();
        assert_eq!(child.key(), "1:x");
        assert_eq!(child.list("steps").unwrap().key(), "1:x:steps");
    }

    #[test]
    fn accessor_errors() {
        let db = Db::in_memory();
        let r = outer(&db, no_session());
        assert!(matches!(
            r.scalar("missing").unwrap_err(),
            ModelError::UnknownField { .. }
        ));
        assert!(matches!(
            r.hash("id").unwrap_err(),
            ModelError::KindMismatch { expected: "hash", actual: "scalar", .. }
        ));
        assert!(r.collection("inner").is_err());
        assert!(r.field("list").unwrap().as_field().is_some());
        assert!(r.field("inner").unwrap().as_field().is_none());
    }

    #[test]
    fn init_hook_runs_on_every_construction() {
        let db = Db::in_memory();
        let r = Record::open(&db, &TAGGED, no_session()).unwrap();
        assert_eq!(r.scalar("kind").unwrap().get().unwrap(), json!("tagged"));
        let err = Record::open(&db, &REJECTED, no_session()).unwrap_err();
        assert!(matches!(err, ModelError::Hook(_)));
    }

    // -----------------------------------------------------------------------
    // Data
    // -----------------------------------------------------------------------

    #[test]
    fn data_of_fresh_record_is_all_defaults() {
        let db = Db::in_memory();
        let r = outer(&db, no_session());
        assert_eq!(
            r.data().unwrap(),
            json!({
                "id": null,
                "name": "nobody",
                "hash": {},
                "list": [],
                "inner": {"depth": 1, "steps": []}
            })
        );
    }

    #[test]
    fn data_reads_whole_tree_in_one_batch() {
        let db = Db::in_memory();
        let r = outer(&db, no_session());
        r.scalar("id").unwrap().set(1).unwrap();
        r.hash("hash").unwrap().set("a", 2).unwrap();
        r.list("list").unwrap().append([3, 4]).unwrap();
        r.unit("inner").unwrap().list("steps").unwrap().append(["go"]).unwrap();

        let mut pipe = Pipeline::new();
        let pending = r.data_in(&mut pipe).unwrap();
        assert_eq!(pending.len(), 6);
        let replies = db.execute(pipe).unwrap();
        assert_eq!(
            pending.resolve(&replies).unwrap(),
            json!({
                "id": 1,
                "name": "nobody",
                "hash": {"a": 2},
                "list": [3, 4],
                "inner": {"depth": 1, "steps": ["go"]}
            })
        );
    }

    #[test]
    fn two_reads_share_one_pipeline() {
        let db = Db::in_memory();
        let a = Record::open_at(&db, &INNER, "a", no_session()).unwrap();
        let b = Record::open_at(&db, &INNER, "b", no_session()).unwrap();
        a.scalar("depth").unwrap().set(5).unwrap();

        let mut pipe = Pipeline::new();
        let pa = a.data_in(&mut pipe).unwrap();
        let pb = b.data_in(&mut pipe).unwrap();
        let replies = db.execute(pipe).unwrap();
        assert_eq!(pa.resolve(&replies).unwrap()["depth"], json!(5));
        assert_eq!(pb.resolve(&replies).unwrap()["depth"], json!(1));
    }

    #[test]
    fn resolve_against_short_replies_fails() {
        let db = Db::in_memory();
        let r = outer(&db, no_session());
        let mut pipe = Pipeline::new();
        let pending = r.data_in(&mut pipe).unwrap();
        assert!(pending.resolve(&[]).is_err());
    }

    #[test]
    fn corrupt_scalar_fails_batched_read() {
        let db = Db::in_memory();
        let r = outer(&db, no_session());
        r.list("list").unwrap().append([1]).unwrap();
        db.kv().hash_set("outer", "id", "seven").unwrap();

        let err = r.data().unwrap_err();
        assert!(matches!(
            err,
            ModelError::TypeMismatch { ref at, ref raw, .. } if at == "outer/id" && raw == "seven"
        ));

        let mut pipe = Pipeline::new();
        let pending = r.data_in(&mut pipe).unwrap();
        let replies = db.execute(pipe).unwrap();
        assert!(matches!(
            pending.resolve(&replies).unwrap_err(),
            ModelError::TypeMismatch { .. }
        ));
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    #[test]
    fn remove_leaves_only_defaults() {
        let kv = Arc::new(InMemoryKv::new());
        let db = Db::new(kv.clone());
        let r = outer(&db, no_session());
        let fresh = r.data().unwrap();
        r.scalar("id").unwrap().set(7).unwrap();
        r.hash("hash").unwrap().set("x", 1).unwrap();
        r.unit("inner").unwrap().scalar("depth").unwrap().set(3).unwrap();
        assert!(r.exists().unwrap());

        r.remove().unwrap();
        assert_eq!(r.data().unwrap(), fresh);
        assert!(r.is_empty().unwrap());
        assert!(kv.is_empty());
    }

    #[test]
    fn remove_records_every_field() {
        let db = Db::in_memory();
        let session = RecordingSession::shared();
        let r = outer(&db, session.clone());
        r.remove().unwrap();
        let changes = r.changes().unwrap();
        assert_eq!(
            changes.get("id").and_then(ChangeTree::as_change),
            Some(&Change::Removed)
        );
        let inner = changes.get("inner").unwrap();
        assert_eq!(inner.leaf_count(), 2);
    }

    // -----------------------------------------------------------------------
    // Changes
    // -----------------------------------------------------------------------

    #[test]
    fn no_writes_means_no_changes() {
        let db = Db::in_memory();
        let session = RecordingSession::shared();
        assert!(outer(&db, session).changes().is_none());
        assert!(outer(&db, no_session()).changes().is_none());
    }

    #[test]
    fn nested_writes_appear_at_full_path() {
        let db = Db::in_memory();
        let session = RecordingSession::shared();
        let r = outer(&db, session.clone());
        r.scalar("id").unwrap().set(1).unwrap();
        r.unit("inner").unwrap().scalar("depth").unwrap().set(2).unwrap();

        let changes = r.changes().unwrap();
        assert_eq!(
            serde_json::to_value(&changes).unwrap(),
            json!({
                "id": {"op": "set", "value": 1},
                "inner": {"depth": {"op": "set", "value": 2}}
            })
        );
        assert_eq!(
            r.unit("inner").unwrap().changes().unwrap().len(),
            1
        );
    }
}
