//! Errors raised at the schema boundary.

use std::fmt;

use thiserror::Error;

use crate::domain::CategoryRecord;
use crate::parameters::ItemsError;
use crate::script::ScriptError;

/// The record and character a derivation was running for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationContext {
    pub record: CategoryRecord,
    pub head: Option<String>,
}

impl DerivationContext {
    pub fn new(record: CategoryRecord, head: Option<&str>) -> Self {
        Self {
            record,
            head: head.map(str::to_owned),
        }
    }
}

impl fmt::Display for DerivationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.record)?;
        if let Some(head) = &self.head {
            write!(f, " ({head})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("schema '{schema}': configuration failed: {source}")]
    Configuration {
        schema: String,
        #[source]
        source: ScriptError,
    },
    #[error("schema '{schema}': invalid parameters: {source}")]
    Parameters {
        schema: String,
        #[source]
        source: ItemsError,
    },
    #[error("schema '{schema}' failed on {context}: {source}")]
    Derivation {
        schema: String,
        context: DerivationContext,
        #[source]
        source: ScriptError,
    },
    #[error("schema '{schema}' returned no result for {context}")]
    NoResult {
        schema: String,
        context: DerivationContext,
    },
    #[error("schema not found: {0}")]
    SchemaNotFound(String),
    #[error("no schemas to evaluate")]
    NoSchemas,
}

impl EngineError {
    /// The schema the error was raised at.
    pub fn schema(&self) -> Option<&str> {
        match self {
            EngineError::Configuration { schema, .. }
            | EngineError::Parameters { schema, .. }
            | EngineError::Derivation { schema, .. }
            | EngineError::NoResult { schema, .. } => Some(schema),
            EngineError::SchemaNotFound(_) | EngineError::NoSchemas => None,
        }
    }

    /// The underlying script error, kept for diagnostics.
    pub fn script_error(&self) -> Option<&ScriptError> {
        match self {
            EngineError::Configuration { source, .. } | EngineError::Derivation { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    pub fn context(&self) -> Option<&DerivationContext> {
        match self {
            EngineError::Derivation { context, .. } | EngineError::NoResult { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }
}
