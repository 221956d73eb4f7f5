//! Nested records over a flat hash/list key-value store.
//!
//! Every record lives at a [`Cursor`]: a path of segments whose `:`-joined
//! form is the store key of the record's own hash. Scalar fields are fields
//! of that hash; hash and list fields live one segment deeper. Collections
//! track their members in an index hash at `<collection-key>:_KEY`.
//!
//! # Pieces
//!
//! - [`Schema`] -- explicit, static declaration of a record type
//! - [`Record`] -- a schema bound at a cursor, one [`Binding`] per field
//! - [`Collection`] -- a record that indexes child records of one type
//! - [`ScalarField`] / [`HashField`] / [`ListField`] -- typed field views
//! - [`Session`] -- change recording shared across a record tree
//! - [`Db`] -- store handle plus [`ModelConfig`], injected everywhere
//!
//! ```
//! use std::sync::LazyLock;
//! use rmodel::{Collection, Db, RecordingSession, Schema, ValueType};
//! use serde_json::json;
//!
//! static ITEM: LazyLock<Schema> = LazyLock::new(|| {
//!     Schema::builder("Item")
//!         .scalar("id", ValueType::Int)
//!         .hash_with_default("hash", ValueType::Int, 0)
//!         .build()
//! });
//! static STORE: LazyLock<Schema> =
//!     LazyLock::new(|| Schema::builder("store").assign(&ITEM).build());
//!
//! let db = Db::in_memory();
//! let session = RecordingSession::shared();
//! let store = Collection::open(&db, &STORE, session.clone()).unwrap();
//!
//! let item = store.add(&[]).unwrap();
//! item.scalar("id").unwrap().set(7).unwrap();
//! assert_eq!(item.key(), "store:1");
//! assert_eq!(item.data().unwrap(), json!({"id": 7, "hash": {}}));
//! assert!(store.changes().is_some());
//! ```
//!
//! # Design Rules
//!
//! 1. A cursor's key is always the join of its segments; children never
//!    mutate their parent.
//! 2. Whole-record reads and deletes are one pipeline.
//! 3. Absent data is not an error: it reads as the field default, then the
//!    record default, then null.
//! 4. Writes are recorded in the session after the store accepted them.
//! 5. Store errors propagate unmodified, never retried.

pub mod collection;
pub mod config;
pub mod cursor;
pub mod db;
pub mod error;
pub mod field;
pub mod record;
pub mod schema;
pub mod session;
pub mod value;

pub use collection::Collection;
pub use config::{KeyAllocation, ModelConfig};
pub use cursor::{Cursor, DELIMITER, INDEX_SEGMENT, SEQUENCE_SEGMENT};
pub use db::Db;
pub use error::{ModelError, ModelResult};
pub use field::{Field, HashField, ListField, Location, ScalarField};
pub use record::{Binding, PendingData, Record};
pub use schema::{FieldKind, FieldSpec, InitHook, NewHook, Schema, SchemaBuilder, Transform};
pub use session::{
    no_session, Change, ChangeTree, Changes, NoSession, RecordingSession, Session, SessionRef,
};
pub use value::ValueType;

// Store types callers need to construct a `Db`.
pub use rmodel_kv::{InMemoryKv, KvStore};
