/// Errors from key-value store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KvError {
    /// A command addressed a key holding a different kind of value.
    #[error("WRONGTYPE operation against key {key} holding the wrong kind of value")]
    WrongType { key: String },

    /// A hash increment hit a field whose value is not an integer.
    #[error("hash field {key}/{field} is not an integer")]
    NotAnInteger { key: String, field: String },

    /// A reply did not have the shape the caller asked for.
    #[error("unexpected reply: expected {expected}, got {actual}")]
    UnexpectedReply {
        expected: &'static str,
        actual: String,
    },

    /// The backend returned fewer replies than commands were queued.
    #[error("batch returned {actual} replies for {expected} commands")]
    ReplyCount { expected: usize, actual: usize },

    /// Failure reported by the storage backend (connection, timeout, ...).
    #[error("backend error: {0}")]
    Backend(String),

    /// An internal lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Result alias for store operations.
pub type KvResult<T> = Result<T, KvError>;
