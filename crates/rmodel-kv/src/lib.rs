//! Hash/list key-value store interface for rmodel.
//!
//! rmodel never implements storage itself. It maps records onto a store that
//! exposes hash and list primitives plus an ordered, atomic batch. This crate
//! defines that capability set and ships an in-memory backend.
//!
//! # Pieces
//!
//! - [`Command`] / [`Reply`] -- the primitive vocabulary, one reply per command
//! - [`KvStore`] -- the backend trait; one required method, `execute`
//! - [`Pipeline`] -- builder for batches executed as one round trip
//! - [`InMemoryKv`] -- `HashMap`-based backend for tests and embedding
//!
//! # Design Rules
//!
//! 1. Replies are positionally aligned with commands.
//! 2. A failed batch returns no partial result.
//! 3. Empty hashes and lists do not exist as keys.
//! 4. Backend errors are propagated unmodified, never retried.

pub mod command;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod traits;

pub use command::{Command, Reply};
pub use error::{KvError, KvResult};
pub use memory::InMemoryKv;
pub use pipeline::Pipeline;
pub use traits::KvStore;
