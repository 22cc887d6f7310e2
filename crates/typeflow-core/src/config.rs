//! Configuration of the type inference pass

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferConfig {
    /// Rounds allowed to change committed types before giving up
    pub max_rounds: u32,
    /// Skip MULTIEQUAL and INDIRECT edges until the stack has had a heritage pass
    pub require_heritage_for_merges: bool,
    pub propagate_across_returns: bool,
    pub propagate_spacebase: bool,
}

impl Default for InferConfig {
    fn default() -> Self {
        Self {
            max_rounds: 7,
            require_heritage_for_merges: true,
            propagate_across_returns: true,
            propagate_spacebase: true,
        }
    }
}

impl InferConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
