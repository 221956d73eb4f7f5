//! Explicit schema registration.
//!
//! A [`Schema`] is declared once per record type, usually in a `static`
//! behind [`LazyLock`](std::sync::LazyLock), and lists every field with its
//! kind, value type and default. Records bind against it at construction.
//!
//! ```
//! use std::sync::LazyLock;
//! use rmodel::{Schema, ValueType};
//!
//! static ITEM: LazyLock<Schema> = LazyLock::new(|| {
//!     Schema::builder("Item")
//!         .scalar("id", ValueType::Int)
//!         .scalar("total", ValueType::Int)
//!         .hash_with_default("hash", ValueType::Int, 0)
//!         .build()
//! });
//!
//! static STORE: LazyLock<Schema> = LazyLock::new(|| {
//!     Schema::builder("Store")
//!         .prefix("store")
//!         .assign(&ITEM)
//!         .scalar_with_default("name", ValueType::Str, "default_name")
//!         .build()
//! });
//!
//! assert!(STORE.is_collection());
//! assert_eq!(ITEM.fields().len(), 3);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::ModelResult;
use crate::record::Record;
use crate::value::ValueType;

/// Called when a collection creates a new item, with the caller's arguments.
pub type NewHook = fn(&Record, &[Value]) -> ModelResult<()>;

/// Called every time a record is constructed.
pub type InitHook = fn(&Record) -> ModelResult<()>;

/// Value transform applied on save or load.
pub type Transform = fn(Value) -> Value;

/// Storage shape of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// A field of the record's own hash.
    Scalar,
    /// A hash at `<record-key>:<name>`.
    Hash,
    /// A list at `<record-key>:<name>`.
    List,
    /// A nested record or collection rooted at `<record-key>:<name>`.
    Unit,
}

impl FieldKind {
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Scalar => "scalar",
            FieldKind::Hash => "hash",
            FieldKind::List => "list",
            FieldKind::Unit => "unit",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One declared field.
#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub value_type: ValueType,
    /// Returned when the field (or hash entry) is absent.
    pub default: Option<Value>,
    pub on_save: Option<Transform>,
    pub on_load: Option<Transform>,
    /// Schema of a [`FieldKind::Unit`] field.
    pub nested: Option<&'static Schema>,
}

impl FieldSpec {
    fn new(name: &'static str, kind: FieldKind, value_type: ValueType) -> Self {
        Self {
            name,
            kind,
            value_type,
            default: None,
            on_save: None,
            on_load: None,
            nested: None,
        }
    }
}

/// The declared shape of a record type.
pub struct Schema {
    name: &'static str,
    prefix: &'static str,
    fields: Vec<FieldSpec>,
    defaults: BTreeMap<&'static str, Value>,
    assign: Option<&'static Schema>,
    on_new: Option<NewHook>,
    on_init: Option<InitHook>,
}

impl Schema {
    pub fn builder(name: &'static str) -> SchemaBuilder {
        SchemaBuilder {
            schema: Schema {
                name,
                prefix: name,
                fields: Vec::new(),
                defaults: BTreeMap::new(),
                assign: None,
                on_new: None,
                on_init: None,
            },
            last: None,
        }
    }

    /// Type name, used in errors and logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Root prefix for records opened without a parent or explicit prefix.
    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    /// Declared fields in declaration order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Record-level fallback for `field`.
    pub fn record_default(&self, field: &str) -> Option<&Value> {
        self.defaults.get(field)
    }

    /// Item schema for collections.
    pub fn assign(&self) -> Option<&'static Schema> {
        self.assign
    }

    pub fn is_collection(&self) -> bool {
        self.assign.is_some()
    }

    pub fn on_new(&self) -> Option<NewHook> {
        self.on_new
    }

    pub fn on_init(&self) -> Option<InitHook> {
        self.on_init
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .field("fields", &self.fields.iter().map(|s| s.name).collect::<Vec<_>>())
            .field("assign", &self.assign.map(Schema::name))
            .finish()
    }
}

/// Builder for [`Schema`]. Redeclaring a field name replaces the earlier
/// declaration.
#[derive(Debug)]
pub struct SchemaBuilder {
    schema: Schema,
    last: Option<usize>,
}

impl SchemaBuilder {
    pub fn prefix(mut self, prefix: &'static str) -> Self {
        self.schema.prefix = prefix;
        self
    }

    fn push(mut self, spec: FieldSpec) -> Self {
        let fields = &mut self.schema.fields;
        match fields.iter().position(|f| f.name == spec.name) {
            Some(i) => {
                fields[i] = spec;
                self.last = Some(i);
            }
            None => {
                fields.push(spec);
                self.last = Some(fields.len() - 1);
            }
        }
        self
    }

    pub fn scalar(self, name: &'static str, value_type: ValueType) -> Self {
        self.push(FieldSpec::new(name, FieldKind::Scalar, value_type))
    }

    pub fn scalar_with_default(
        self,
        name: &'static str,
        value_type: ValueType,
        default: impl Into<Value>,
    ) -> Self {
        let mut spec = FieldSpec::new(name, FieldKind::Scalar, value_type);
        spec.default = Some(default.into());
        self.push(spec)
    }

    pub fn hash(self, name: &'static str, value_type: ValueType) -> Self {
        self.push(FieldSpec::new(name, FieldKind::Hash, value_type))
    }

    /// A hash whose absent entries read as `default`.
    pub fn hash_with_default(
        self,
        name: &'static str,
        value_type: ValueType,
        default: impl Into<Value>,
    ) -> Self {
        let mut spec = FieldSpec::new(name, FieldKind::Hash, value_type);
        spec.default = Some(default.into());
        self.push(spec)
    }

    pub fn list(self, name: &'static str, value_type: ValueType) -> Self {
        self.push(FieldSpec::new(name, FieldKind::List, value_type))
    }

    /// A nested record or collection stored under `<record-key>:<name>`.
    pub fn unit(self, name: &'static str, schema: &'static Schema) -> Self {
        let mut spec = FieldSpec::new(name, FieldKind::Unit, ValueType::Str);
        spec.nested = Some(schema);
        self.push(spec)
    }

    /// Transform applied to values of the most recently declared field
    /// before they are stored.
    pub fn on_save(mut self, transform: Transform) -> Self {
        if let Some(last) = self.last.and_then(|i| self.schema.fields.get_mut(i)) {
            last.on_save = Some(transform);
        }
        self
    }

    /// Transform applied to values of the most recently declared field after
    /// they are read and coerced.
    pub fn on_load(mut self, transform: Transform) -> Self {
        if let Some(last) = self.last.and_then(|i| self.schema.fields.get_mut(i)) {
            last.on_load = Some(transform);
        }
        self
    }

    /// Record-level fallback consulted when a field is absent and has no
    /// default of its own.
    pub fn default(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.schema.defaults.insert(field, value.into());
        self
    }

    /// Make this a collection of `item` records.
    pub fn assign(mut self, item: &'static Schema) -> Self {
        self.schema.assign = Some(item);
        self
    }

    pub fn on_new(mut self, hook: NewHook) -> Self {
        self.schema.on_new = Some(hook);
        self
    }

    pub fn on_init(mut self, hook: InitHook) -> Self {
        self.schema.on_init = Some(hook);
        self
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}
