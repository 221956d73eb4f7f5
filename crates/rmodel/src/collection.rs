//! Collections: records of one item schema under a shared cursor.
//!
//! Membership lives in an index hash at `<collection-key>:_KEY`, mapping each
//! child key to the configured marker. A key is a member from the moment
//! `add`/`set` registers it until `remove_item` drops it. Child records are
//! views built on demand; `get` never touches the index.

use std::fmt;

use rmodel_kv::{Pipeline, Reply};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::KeyAllocation;
use crate::cursor::Cursor;
use crate::db::Db;
use crate::error::{ModelError, ModelResult};
use crate::field::Location;
use crate::record::{remove_leaves, Leaf, PendingData, ReadPlan, Record};
use crate::schema::Schema;
use crate::session::{Changes, SessionRef};

/// Field of the sequence hash holding the last issued key.
const SEQUENCE_FIELD: &str = "last";

fn first_flag(replies: Vec<Reply>) -> ModelResult<bool> {
    let first = replies
        .into_iter()
        .next()
        .ok_or(rmodel_kv::KvError::ReplyCount {
            expected: 1,
            actual: 0,
        })?;
    Ok(first.into_bool()?)
}

/// A record whose schema assigns an item schema, plus the children it
/// indexes.
#[derive(Clone, Debug)]
pub struct Collection {
    record: Record,
    item: &'static Schema,
}

impl Collection {
    /// Open a root collection at the schema's declared prefix.
    pub fn open(db: &Db, schema: &'static Schema, session: SessionRef) -> ModelResult<Self> {
        Self::bind(db, schema, Cursor::root(schema.prefix()), session)
    }

    pub fn open_at(
        db: &Db,
        schema: &'static Schema,
        prefix: &str,
        session: SessionRef,
    ) -> ModelResult<Self> {
        Self::bind(db, schema, Cursor::root(prefix), session)
    }

    pub fn open_under(
        db: &Db,
        parent: &Cursor,
        schema: &'static Schema,
        prefix: &str,
        session: SessionRef,
    ) -> ModelResult<Self> {
        Self::bind(db, schema, parent.child(prefix), session)
    }

    pub(crate) fn bind(
        db: &Db,
        schema: &'static Schema,
        cursor: Cursor,
        session: SessionRef,
    ) -> ModelResult<Self> {
        let item = schema
            .assign()
            .ok_or_else(|| ModelError::NotACollection(schema.name().to_string()))?;
        Ok(Self {
            record: Record::bind(db, schema, cursor, session)?,
            item,
        })
    }

    /// The collection's own fields.
    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn item_schema(&self) -> &'static Schema {
        self.item
    }

    pub fn cursor(&self) -> &Cursor {
        self.record.cursor()
    }

    pub fn key(&self) -> &str {
        self.record.key()
    }

    fn db(&self) -> &Db {
        self.record.db()
    }

    /// Key of the membership index hash.
    pub fn index_key(&self) -> String {
        self.cursor().index_key()
    }

    /// Member keys, in store order.
    pub fn keys(&self) -> ModelResult<Vec<String>> {
        Ok(self.db().kv().hash_keys(&self.index_key())?)
    }

    pub fn contains(&self, key: impl fmt::Display) -> ModelResult<bool> {
        Ok(self
            .db()
            .kv()
            .hash_exists(&self.index_key(), &key.to_string())?)
    }

    /// Number of members.
    pub fn len(&self) -> ModelResult<u64> {
        Ok(self.db().kv().hash_len(&self.index_key())?)
    }

    pub fn is_empty(&self) -> ModelResult<bool> {
        Ok(self.len()? == 0)
    }

    /// The key the next `add` would use. Does not reserve it.
    pub fn new_key(&self) -> ModelResult<String> {
        match self.db().config().key_allocation {
            KeyAllocation::Doubling => Ok(KeyAllocation::doubling_key(self.len()?).to_string()),
            KeyAllocation::Counter => {
                let last = self
                    .db()
                    .kv()
                    .hash_get(&self.cursor().sequence_key(), SEQUENCE_FIELD)?
                    .and_then(|raw| raw.parse::<u64>().ok())
                    .unwrap_or(0);
                Ok((last + 1).to_string())
            }
        }
    }

    fn allocate_key(&self) -> ModelResult<String> {
        match self.db().config().key_allocation {
            KeyAllocation::Doubling => self.new_key(),
            KeyAllocation::Counter => Ok(self
                .db()
                .kv()
                .hash_incr_by(&self.cursor().sequence_key(), SEQUENCE_FIELD, 1)?
                .to_string()),
        }
    }

    /// Create a member under a freshly allocated key, sharing this
    /// collection's session.
    pub fn add(&self, args: &[Value]) -> ModelResult<Record> {
        self.add_in(args, self.record.session().clone())
    }

    /// Like [`add`](Collection::add), recording into `session` instead.
    pub fn add_in(&self, args: &[Value], session: SessionRef) -> ModelResult<Record> {
        let key = self.allocate_key()?;
        if self.contains(&key)? {
            warn!(collection = %self.cursor(), key = %key, "allocated key already indexed");
        }
        self.set_in(&key, args, session)
    }

    /// Create (or overwrite) the member at `key`. The new hook runs even when
    /// the key is already indexed.
    pub fn set(&self, key: impl fmt::Display, args: &[Value]) -> ModelResult<Record> {
        self.set_in(key, args, self.record.session().clone())
    }

    pub fn set_in(
        &self,
        key: impl fmt::Display,
        args: &[Value],
        session: SessionRef,
    ) -> ModelResult<Record> {
        let key = key.to_string();
        let child = self.get_in(&key, session)?;
        if let Some(hook) = self.item.on_new() {
            hook(&child, args)?;
        }
        self.db().kv().hash_set(
            &self.index_key(),
            &key,
            &self.db().config().index_marker,
        )?;
        info!(collection = %self.cursor(), key = %key, "collection item added");
        Ok(child)
    }

    /// A view of the member at `key`, indexed or not.
    pub fn get(&self, key: impl fmt::Display) -> ModelResult<Record> {
        self.get_in(key, self.record.session().clone())
    }

    pub fn get_in(&self, key: impl fmt::Display, session: SessionRef) -> ModelResult<Record> {
        Record::bind(
            self.db(),
            self.item,
            self.cursor().child(key.to_string()),
            session,
        )
    }

    /// Every member with its key.
    pub fn items(&self) -> ModelResult<Vec<(String, Record)>> {
        self.keys()?
            .into_iter()
            .map(|key| {
                let record = self.get(&key)?;
                Ok((key, record))
            })
            .collect()
    }

    /// Drop `key` from the index and delete its data in one atomic batch.
    /// Returns `true` if the key was indexed.
    pub fn remove_item(&self, key: impl fmt::Display) -> ModelResult<bool> {
        let key = key.to_string();
        let child = self.get(&key)?;
        let mut pipe = Pipeline::new();
        pipe.hash_delete(&self.index_key(), &key);
        let replies = remove_leaves(self.db(), self.record.session(), &child.leaves()?, pipe)?;
        info!(collection = %self.cursor(), key = %key, "collection item removed");
        first_flag(replies)
    }

    /// Rename a member. With `relocate_on_move` the member's data moves to
    /// the new key in the same atomic batch as the index update; otherwise
    /// only the index entry is renamed. Returns `false` without touching the
    /// store when `old` is not a member.
    ///
    /// Moves are not recorded in the session.
    pub fn move_item(&self, old: impl fmt::Display, new: impl fmt::Display) -> ModelResult<bool> {
        let (old, new) = (old.to_string(), new.to_string());
        if !self.contains(&old)? {
            return Ok(false);
        }
        if old == new {
            return Ok(true);
        }
        let index = self.index_key();
        let marker = self.db().config().index_marker.clone();
        let mut write = Pipeline::new();
        write.hash_delete(&index, &old);

        if self.db().config().relocate_on_move {
            let source = self.get(&old)?;
            let target = self.get(&new)?;
            let leaves = source.leaves()?;

            let mut read = Pipeline::new();
            for leaf in &leaves {
                leaf.location.queue_raw_read(&mut read);
            }
            let raw = self.db().execute(read)?;

            for leaf in target.leaves()? {
                leaf.location.queue_delete(&mut write);
            }
            for (leaf, reply) in leaves.iter().zip(raw) {
                let Some(key) =
                    Cursor::rebase_key(leaf.location.key(), source.cursor(), target.cursor())
                else {
                    warn!(key = leaf.location.key(), "leaf outside moved record");
                    continue;
                };
                leaf.location.with_key(key).queue_write(&mut write, reply)?;
                leaf.location.queue_delete(&mut write);
            }
        }

        write.hash_set(&index, &new, &marker);
        let replies = self.db().execute(write)?;
        info!(collection = %self.cursor(), old = %old, new = %new, "collection item moved");
        first_flag(replies)
    }

    pub(crate) fn read_plan(&self) -> ModelResult<ReadPlan> {
        let mut plan = self.record.read_plan()?;
        for (key, child) in self.items()? {
            plan.push_group(key, child.read_plan()?);
        }
        Ok(plan)
    }

    /// Queue the reads of the collection's own fields and every member.
    /// Listing the members costs one round trip at plan time.
    pub fn data_in(&self, pipe: &mut Pipeline) -> ModelResult<PendingData> {
        Ok(PendingData::queue(self.read_plan()?, pipe))
    }

    /// Own fields merged with every member's data keyed by member key.
    pub fn data(&self) -> ModelResult<Value> {
        let mut pipe = Pipeline::new();
        let pending = self.data_in(&mut pipe)?;
        let replies = self.db().execute(pipe)?;
        pending.resolve(&replies)
    }

    pub(crate) fn leaves(&self) -> ModelResult<Vec<Leaf>> {
        let mut leaves = self.record.leaves()?;
        for (_, child) in self.items()? {
            leaves.extend(child.leaves()?);
        }
        leaves.push(Leaf {
            location: Location::Hash {
                key: self.index_key(),
            },
            path: None,
        });
        Ok(leaves)
    }

    /// Delete own fields, every member and the index in one atomic batch.
    /// A key counter, if any, survives so keys are never reissued.
    pub fn remove(&self) -> ModelResult<()> {
        let leaves = self.leaves()?;
        remove_leaves(self.db(), self.record.session(), &leaves, Pipeline::new())?;
        info!(collection = %self.cursor(), leaves = leaves.len(), "collection removed");
        Ok(())
    }

    /// Session changes below the collection, members keyed by member key.
    pub fn changes(&self) -> Option<Changes> {
        self.record.changes()
    }
}
