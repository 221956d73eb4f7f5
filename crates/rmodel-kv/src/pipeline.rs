use tracing::debug;

use crate::command::{Command, Reply};
use crate::error::{KvError, KvResult};
use crate::traits::KvStore;

/// Builder for an ordered batch of commands executed as one round trip.
///
/// Replies come back in queue order. Callers that interleave reads of
/// different shapes keep their own cursor into the reply vector.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an arbitrary command.
    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn hash_get(&mut self, key: &str, field: &str) -> &mut Self {
        self.push(Command::HashGet {
            key: key.into(),
            field: field.into(),
        })
    }

    pub fn hash_set(&mut self, key: &str, field: &str, value: &str) -> &mut Self {
        self.push(Command::HashSet {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        })
    }

    pub fn hash_set_many(&mut self, key: &str, entries: Vec<(String, String)>) -> &mut Self {
        self.push(Command::HashSetMany {
            key: key.into(),
            entries,
        })
    }

    pub fn hash_get_all(&mut self, key: &str) -> &mut Self {
        self.push(Command::HashGetAll { key: key.into() })
    }

    pub fn hash_delete(&mut self, key: &str, field: &str) -> &mut Self {
        self.push(Command::HashDelete {
            key: key.into(),
            field: field.into(),
        })
    }

    pub fn hash_len(&mut self, key: &str) -> &mut Self {
        self.push(Command::HashLen { key: key.into() })
    }

    pub fn hash_exists(&mut self, key: &str, field: &str) -> &mut Self {
        self.push(Command::HashExists {
            key: key.into(),
            field: field.into(),
        })
    }

    pub fn list_push(&mut self, key: &str, values: Vec<String>) -> &mut Self {
        self.push(Command::ListPush {
            key: key.into(),
            values,
        })
    }

    pub fn list_range(&mut self, key: &str, start: i64, stop: i64) -> &mut Self {
        self.push(Command::ListRange {
            key: key.into(),
            start,
            stop,
        })
    }

    pub fn list_len(&mut self, key: &str) -> &mut Self {
        self.push(Command::ListLen { key: key.into() })
    }

    pub fn delete(&mut self, key: &str) -> &mut Self {
        self.push(Command::Delete { key: key.into() })
    }

    pub fn exists(&mut self, key: &str) -> &mut Self {
        self.push(Command::Exists { key: key.into() })
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Execute the batch against `store` as a single unit.
    ///
    /// An empty pipeline never reaches the store. A backend that returns a
    /// reply count different from the command count is reported as
    /// [`KvError::ReplyCount`] instead of being silently misaligned.
    pub fn execute(self, store: &dyn KvStore) -> KvResult<Vec<Reply>> {
        if self.commands.is_empty() {
            return Ok(Vec::new());
        }
        let expected = self.commands.len();
        let replies = store.execute(&self.commands)?;
        if replies.len() != expected {
            return Err(KvError::ReplyCount {
                expected,
                actual: replies.len(),
            });
        }
        debug!(commands = expected, "pipeline executed");
        Ok(replies)
    }
}
