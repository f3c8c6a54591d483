//! Application state: the schema list, the article and the evaluation
//! options. Every transition returns a new state.

use thiserror::Error;
use tracing::debug;
use ulid::Ulid;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::evaluate::EvaluationOptions;
use crate::parameters::{ParameterSet, ParameterValue};
use crate::persistence::{PersistedSchema, PersistedState};
use crate::require::SchemaRegistry;
use crate::schema::Schema;
use crate::script::ScriptSource;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("schema name must not be empty")]
    EmptyName,
    #[error("a schema named '{0}' already exists")]
    DuplicateName(String),
    #[error("no schema with id {0}")]
    UnknownSchema(Ulid),
    #[error("position {0} is out of range")]
    OutOfRange(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaState {
    /// Session identity, stable across renames and reorders.
    pub id: Ulid,
    pub name: String,
    pub input: ScriptSource,
    pub parameters: ParameterSet,
}

impl SchemaState {
    pub fn schema(&self) -> Schema {
        Schema::new(self.name.clone(), self.input.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub schemas: Vec<SchemaState>,
    pub article: String,
    pub options: EvaluationOptions,
}

impl AppState {
    pub fn schema(&self, id: Ulid) -> Option<&SchemaState> {
        self.schemas.iter().find(|schema| schema.id == id)
    }

    pub fn schema_named(&self, name: &str) -> Option<&SchemaState> {
        self.schemas.iter().find(|schema| schema.name == name)
    }

    fn position(&self, id: Ulid) -> Result<usize, StateError> {
        self.schemas
            .iter()
            .position(|schema| schema.id == id)
            .ok_or(StateError::UnknownSchema(id))
    }

    fn with_schema(&self, index: usize, schema: SchemaState) -> Self {
        let mut next = self.clone();
        next.schemas[index] = schema;
        next
    }

    /// `base`, or `base-2`, `base-3`, … whichever is free first.
    pub fn unique_name(&self, base: &str) -> String {
        let base = if base.trim().is_empty() { "schema" } else { base.trim() };
        if self.schema_named(base).is_none() {
            return base.to_owned();
        }
        (2..)
            .map(|n| format!("{base}-{n}"))
            .find(|name| self.schema_named(name).is_none())
            .unwrap_or_else(|| base.to_owned())
    }

    /// Append a schema. Its name is made unique; a failing configuration
    /// leaves it without parameters.
    pub fn add_schema(&self, name: &str, input: ScriptSource, config: &EngineConfig) -> Self {
        let name = self.unique_name(name);
        let schema = Schema::new(name.clone(), input.clone());
        let parameters = ParameterSet::from_schema(&schema, None, config);
        debug!(%name, "schema added");
        let mut next = self.clone();
        next.schemas.push(SchemaState {
            id: Ulid::new(),
            name,
            input,
            parameters,
        });
        next
    }

    pub fn rename(&self, id: Ulid, name: &str) -> Result<Self, StateError> {
        let index = self.position(id)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(StateError::EmptyName);
        }
        if self
            .schemas
            .iter()
            .any(|schema| schema.id != id && schema.name == name)
        {
            return Err(StateError::DuplicateName(name.to_owned()));
        }
        Ok(self.with_schema(
            index,
            SchemaState {
                name: name.to_owned(),
                ..self.schemas[index].clone()
            },
        ))
    }

    /// Replace a schema's source and refresh its parameters. A failing
    /// configuration keeps the previous parameters and is returned as the
    /// issue to show next to the schema. Handing back the schema's own
    /// source is a no-op.
    pub fn edit_input(
        &self,
        id: Ulid,
        input: ScriptSource,
        config: &EngineConfig,
    ) -> Result<(Self, Option<EngineError>), StateError> {
        let index = self.position(id)?;
        let current = &self.schemas[index];
        if input.ptr_eq(&current.input) {
            return Ok((self.clone(), None));
        }
        let schema = Schema::new(current.name.clone(), input.clone());
        let (parameters, issue) = match current.parameters.try_refresh(&schema, config) {
            Ok(parameters) => (parameters, None),
            Err(error) => (current.parameters.clone(), Some(error)),
        };
        let next = self.with_schema(
            index,
            SchemaState {
                input,
                parameters,
                ..current.clone()
            },
        );
        Ok((next, issue))
    }

    pub fn set_parameter(
        &self,
        id: Ulid,
        key: &str,
        value: ParameterValue,
    ) -> Result<Self, StateError> {
        let index = self.position(id)?;
        let current = &self.schemas[index];
        Ok(self.with_schema(
            index,
            SchemaState {
                parameters: current.parameters.set(key, value),
                ..current.clone()
            },
        ))
    }

    /// Move the schema at `from` to position `to`.
    pub fn reorder(&self, from: usize, to: usize) -> Result<Self, StateError> {
        let len = self.schemas.len();
        for position in [from, to] {
            if position >= len {
                return Err(StateError::OutOfRange(position));
            }
        }
        let mut next = self.clone();
        let schema = next.schemas.remove(from);
        next.schemas.insert(to, schema);
        Ok(next)
    }

    pub fn delete(&self, id: Ulid) -> Result<Self, StateError> {
        let index = self.position(id)?;
        let mut next = self.clone();
        next.schemas.remove(index);
        Ok(next)
    }

    pub fn with_article(&self, article: impl Into<String>) -> Self {
        Self {
            article: article.into(),
            ..self.clone()
        }
    }

    pub fn with_options(&self, options: EvaluationOptions) -> Self {
        Self {
            options,
            ..self.clone()
        }
    }

    /// The schemas in order, compiled, with their current values.
    pub fn registry(&self) -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        for state in &self.schemas {
            registry.insert(state.schema(), state.parameters.pack());
        }
        registry
    }

    pub fn persisted(&self) -> PersistedState {
        PersistedState {
            schemas: self
                .schemas
                .iter()
                .map(|schema| PersistedSchema {
                    name: schema.name.clone(),
                    input: schema.input.to_string(),
                    parameters: schema.parameters.pack(),
                })
                .collect(),
            article: self.article.clone(),
            options: self.options.clone(),
        }
    }

    /// Rebuild from storage: configuration runs again and the stored values
    /// are carried over. A schema that fails to configure keeps its stored
    /// values untouched; its error is returned alongside the state.
    pub fn restore(persisted: &PersistedState, config: &EngineConfig) -> (Self, Vec<EngineError>) {
        let mut state = Self {
            schemas: Vec::with_capacity(persisted.schemas.len()),
            article: persisted.article.clone(),
            options: persisted.options.clone(),
        };
        let mut issues = Vec::new();
        for stored in &persisted.schemas {
            let name = state.unique_name(&stored.name);
            let input = ScriptSource::from(stored.input.as_str());
            let schema = Schema::new(name.clone(), input.clone());
            let parameters =
                match ParameterSet::try_from_schema(&schema, Some(&stored.parameters), config) {
                    Ok(parameters) => parameters,
                    Err(error) => {
                        issues.push(error);
                        ParameterSet::stored(stored.parameters.clone())
                    }
                };
            state.schemas.push(SchemaState {
                id: Ulid::new(),
                name,
                input,
                parameters,
            });
        }
        (state, issues)
    }
}
