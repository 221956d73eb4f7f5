use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// How a collection picks the key for [`add`](crate::Collection::add).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAllocation {
    /// `2 × len`, or `1` for an empty collection. Compatible with existing
    /// key spaces, but a key can be reissued after removals.
    #[default]
    Doubling,
    /// A per-collection counter at `<collection-key>:_SEQ`. Never reissues a
    /// key, even after the item is removed.
    Counter,
}

impl KeyAllocation {
    /// The doubling formula for a collection holding `count` items.
    pub fn doubling_key(count: u64) -> u64 {
        if count == 0 {
            1
        } else {
            count.saturating_mul(2)
        }
    }
}

/// Record-layer configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Key allocation policy for collection `add`.
    pub key_allocation: KeyAllocation,
    /// Whether `move_item` relocates the item's data along with its index
    /// entry. When `false` only the index entry is renamed.
    pub relocate_on_move: bool,
    /// Value stored against each key in a collection's index hash.
    pub index_marker: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            key_allocation: KeyAllocation::Doubling,
            relocate_on_move: true,
            index_marker: crate::cursor::INDEX_SEGMENT.to_string(),
        }
    }
}

impl ModelConfig {
    /// Behaviour of existing deployments: doubling keys, index-only moves.
    pub fn legacy() -> Self {
        Self {
            relocate_on_move: false,
            ..Default::default()
        }
    }

    /// Parse from a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> ModelResult<Self> {
        toml::from_str(s).map_err(|e| ModelError::Config(e.to_string()))
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ModelResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml(&self) -> ModelResult<String> {
        toml::to_string(self).map_err(|e| ModelError::Config(e.to_string()))
    }
}
