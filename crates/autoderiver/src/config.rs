//! Engine configuration, loadable from a JSON file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{CategoryDomain, CategoryRecord, PredicateError};
use crate::script::DEFAULT_MAX_CALL_DEPTH;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Nested script function calls allowed before evaluation fails.
    pub max_call_depth: usize,
    pub legacy: LegacyRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            legacy: LegacyRules::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

/// Record normalization for schemas written against the coarser legacy
/// category space. Both fields are predicate expressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyRules {
    /// Records here lose their rounding.
    pub rounding_neutral: String,
    /// Only records here keep their rare-contrast class.
    pub rare_contrast: String,
}

impl Default for LegacyRules {
    fn default() -> Self {
        Self {
            rounding_neutral: "脣音 或 開合中立韻".to_owned(),
            rare_contrast: "重紐韻".to_owned(),
        }
    }
}

impl LegacyRules {
    pub fn adjust(
        &self,
        record: CategoryRecord,
        domain: &dyn CategoryDomain,
    ) -> Result<CategoryRecord, PredicateError> {
        let mut adjusted = record;
        if adjusted.rounding.is_some() && domain.belongs_to(record, &self.rounding_neutral)? {
            adjusted = adjusted.without_rounding();
        }
        if adjusted.rare.is_some() && !domain.belongs_to(record, &self.rare_contrast)? {
            adjusted = adjusted.without_rare();
        }
        Ok(adjusted)
    }
}
