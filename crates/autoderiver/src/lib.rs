//! Evaluation engine for phonological derivation schemas.
//!
//! A schema is a small script that either declares its options
//! (configuration mode) or derives a pronunciation for one category record
//! (derivation mode). The engine runs schemas over an article or over the
//! whole category domain and aggregates what they produce.

pub mod config;
pub mod domain;
pub mod error;
pub mod evaluate;
pub mod format;
pub mod parameters;
pub mod persistence;
pub mod require;
pub mod schema;
pub mod script;
pub mod state;

pub use config::{ConfigError, EngineConfig, LegacyRules};
pub use domain::{CategoryDomain, CategoryRecord, Entry, TableDomain};
pub use error::{DerivationContext, EngineError};
pub use evaluate::{EvaluationOptions, EvaluationOutput, Operation, evaluate};
pub use format::{ResultNode, Tag};
pub use parameters::{ParameterItem, ParameterSet, ParameterValue};
pub use require::{Resolver, SchemaRegistry};
pub use schema::Schema;
pub use script::{ScriptError, ScriptSource};
pub use state::{AppState, SchemaState};
