use rmodel_kv::KvError;
use thiserror::Error;

/// Errors produced by the record layer.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Stored data cannot be read as the field's declared type.
    #[error("type mismatch at {at}: cannot read {raw:?} as {expected}")]
    TypeMismatch {
        at: String,
        raw: String,
        expected: String,
    },

    /// A value has no flat string form (null, array or object in a
    /// scalar position).
    #[error("cannot store {value} at {at}: {reason}")]
    Unencodable {
        at: String,
        value: String,
        reason: &'static str,
    },

    /// The schema declares no field with this name.
    #[error("{schema} has no field {field:?}")]
    UnknownField { schema: String, field: String },

    /// The field exists but is of a different kind.
    #[error("field {field:?} is a {actual}, not a {expected}")]
    KindMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// A collection was opened over a schema without an item schema.
    #[error("schema {0} does not assign an item schema")]
    NotACollection(String),

    /// A `new`/`init` hook rejected the record.
    #[error("hook failed: {0}")]
    Hook(String),

    /// Configuration could not be loaded or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// Store failure, propagated unmodified.
    #[error(transparent)]
    Kv(#[from] KvError),
}

/// Result alias for record-layer operations.
pub type ModelResult<T> = Result<T, ModelError>;
