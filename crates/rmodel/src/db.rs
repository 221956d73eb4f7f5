use std::fmt;
use std::sync::Arc;

use rmodel_kv::{InMemoryKv, KvStore, Pipeline, Reply};

use crate::config::ModelConfig;
use crate::error::ModelResult;

/// Store handle plus configuration, injected into every record.
///
/// Cloning is cheap; clones share the same store and config.
#[derive(Clone)]
pub struct Db {
    kv: Arc<dyn KvStore>,
    config: Arc<ModelConfig>,
}

impl Db {
    /// Wrap a store with the default configuration.
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self::with_config(kv, ModelConfig::default())
    }

    pub fn with_config(kv: Arc<dyn KvStore>, config: ModelConfig) -> Self {
        Self {
            kv,
            config: Arc::new(config),
        }
    }

    /// A handle over a fresh [`InMemoryKv`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryKv::new()))
    }

    pub fn kv(&self) -> &dyn KvStore {
        self.kv.as_ref()
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Execute a batch as one round trip.
    pub fn execute(&self, pipe: Pipeline) -> ModelResult<Vec<Reply>> {
        Ok(pipe.execute(self.kv())?)
    }
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db").field("config", &self.config).finish()
    }
}
