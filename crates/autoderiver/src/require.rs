//! Cross-schema `require`: schema registry, require chain and resolver.

use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use crate::config::EngineConfig;
use crate::domain::{CategoryDomain, CategoryRecord};
use crate::error::EngineError;
use crate::format::ResultNode;
use crate::parameters::{OptionsView, PackedValues};
use crate::schema::Schema;
use crate::script::{ErrorKind, RequireHandle, Requirer, ScriptError, Value};

/// The schemas of one evaluation pass, each with its stored option values.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: IndexMap<String, RegisteredSchema>,
}

#[derive(Debug, Clone)]
pub struct RegisteredSchema {
    pub schema: Schema,
    pub packed: PackedValues,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, schema: Schema, packed: PackedValues) {
        self.schemas
            .insert(schema.name().to_owned(), RegisteredSchema { schema, packed });
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredSchema> {
        self.schemas.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredSchema> {
        self.schemas.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Schemas currently being derived, innermost last. Persistent: pushing
/// shares the tail.
#[derive(Debug, Clone, Default)]
pub struct RequireChain(Option<Rc<ChainLink>>);

#[derive(Debug)]
struct ChainLink {
    name: Rc<str>,
    parent: RequireChain,
}

impl RequireChain {
    pub fn push(&self, name: Rc<str>) -> Self {
        Self(Some(Rc::new(ChainLink {
            name,
            parent: self.clone(),
        })))
    }

    pub fn contains(&self, name: &str) -> bool {
        let mut link = self.0.as_deref();
        while let Some(current) = link {
            if &*current.name == name {
                return true;
            }
            link = current.parent.0.as_deref();
        }
        false
    }

    /// Names from the outermost schema inwards.
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut link = self.0.as_deref();
        while let Some(current) = link {
            names.push(current.name.to_string());
            link = current.parent.0.as_deref();
        }
        names.reverse();
        names
    }
}

/// Derives schemas of a registry, resolving `require` between them.
#[derive(Clone)]
pub struct Resolver<'a> {
    registry: &'a SchemaRegistry,
    domain: &'a dyn CategoryDomain,
    config: &'a EngineConfig,
    chain: RequireChain,
}

impl<'a> Resolver<'a> {
    pub fn new(
        registry: &'a SchemaRegistry,
        domain: &'a dyn CategoryDomain,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            registry,
            domain,
            config,
            chain: RequireChain::default(),
        }
    }

    pub fn registry(&self) -> &'a SchemaRegistry {
        self.registry
    }

    pub fn domain(&self) -> &'a dyn CategoryDomain {
        self.domain
    }

    pub fn config(&self) -> &'a EngineConfig {
        self.config
    }

    fn entered(&self, name: &str) -> Self {
        Self {
            chain: self.chain.push(Rc::from(name)),
            ..self.clone()
        }
    }

    /// Derive `name` for one record with its stored options.
    pub fn derive_schema(
        &self,
        name: &str,
        record: CategoryRecord,
        head: Option<&str>,
    ) -> Result<Vec<ResultNode>, EngineError> {
        let entry = self
            .registry
            .get(name)
            .ok_or_else(|| EngineError::SchemaNotFound(name.to_owned()))?;
        entry.schema.derive(
            record,
            head,
            OptionsView::new(entry.packed.clone()),
            &self.entered(name),
            self.domain,
            self.config,
        )
    }

    /// Derive every registered schema for one record, in registry order.
    pub fn derive_all(
        &self,
        record: CategoryRecord,
        head: Option<&str>,
    ) -> Result<Vec<Vec<ResultNode>>, EngineError> {
        self.registry
            .names()
            .map(|name| self.derive_schema(name, record, head))
            .collect()
    }
}

impl Requirer for Resolver<'_> {
    fn require(&self, name: &str) -> Result<RequireHandle, ErrorKind> {
        if self.chain.contains(name) {
            let mut chain = self.chain.names();
            chain.push(name.to_owned());
            return Err(ErrorKind::RequireCycle { chain });
        }
        if self.registry.get(name).is_none() {
            return Err(ErrorKind::SchemaNotFound(name.to_owned()));
        }
        Ok(RequireHandle {
            name: Rc::from(name),
            chain: self.chain.clone(),
        })
    }

    fn derive(
        &self,
        handle: &RequireHandle,
        record: CategoryRecord,
        head: Option<&str>,
        options: Option<&PackedValues>,
        call_depth: usize,
    ) -> Result<Value, ScriptError> {
        let entry = self
            .registry
            .get(&handle.name)
            .ok_or_else(|| ErrorKind::SchemaNotFound(handle.name.to_string()))?;
        let mut packed = entry.packed.clone();
        if let Some(options) = options {
            packed.extend(options.iter().map(|(key, value)| (key.clone(), value.clone())));
        }
        trace!(schema = %handle.name, %record, "required derivation");
        let resolver = Self {
            chain: handle.chain.push(handle.name.clone()),
            ..self.clone()
        };
        entry
            .schema
            .invoke(
                record,
                head,
                OptionsView::new(packed),
                &resolver,
                self.domain,
                self.config,
                call_depth,
            )
            .map_err(|error| error.within(Some(&handle.name), None, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TableDomain;
    use crate::script::{DEFAULT_MAX_CALL_DEPTH, ScriptSource};

    fn registry(schemas: &[(&str, &str)]) -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        for (name, code) in schemas {
            registry.insert(Schema::new(*name, ScriptSource::from(*code)), PackedValues::new());
        }
        registry
    }

    fn derive(registry: &SchemaRegistry, name: &str) -> Result<Vec<ResultNode>, EngineError> {
        let domain = TableDomain::default();
        let config = EngineConfig::default();
        Resolver::new(registry, &domain, &config).derive_schema(
            name,
            "見開一歌平".parse().unwrap(),
            Some("歌"),
        )
    }

    fn cycle_of(error: EngineError) -> Vec<String> {
        match error.script_error().map(|error| &error.kind) {
            Some(ErrorKind::RequireCycle { chain }) => chain.clone(),
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn chain_is_persistent() {
        let root = RequireChain::default().push("A".into());
        let left = root.push("B".into());
        let right = root.push("C".into());
        assert_eq!(left.names(), ["A", "B"]);
        assert_eq!(right.names(), ["A", "C"]);
        assert!(!right.contains("B"));
    }

    #[test]
    fn self_require_is_a_cycle() {
        let registry = registry(&[(
            "A",
            "Require/schema(require, name: 'A') |> Require/derive_this()",
        )]);
        let error = derive(&registry, "A").unwrap_err();
        assert_eq!(cycle_of(error), ["A", "A"]);
    }

    #[test]
    fn indirect_cycle_names_the_chain() {
        let registry = registry(&[
            ("A", "Require/schema(require, name: 'B') |> Require/derive_this()"),
            ("B", "Require/schema(require, name: 'A') |> Require/derive_this()"),
        ]);
        let error = derive(&registry, "A").unwrap_err();
        assert_eq!(
            error.script_error().unwrap().to_string(),
            "circular require: A -> B -> A"
        );
    }

    #[test]
    fn unknown_schema_is_reported() {
        let registry = registry(&[("A", "Require/schema(require, name: 'Z')")]);
        let error = derive(&registry, "A").unwrap_err();
        assert_eq!(
            error.script_error().map(|error| &error.kind),
            Some(&ErrorKind::SchemaNotFound("Z".to_owned()))
        );
    }

    #[test]
    fn required_schema_sees_layered_options() {
        let registry = registry(&[
            (
                "outer",
                "inner: Require/schema(require, name: 'inner')\n\
                 (inner |> Require/derive(record: record, options: [upper: True])) + '/' + (inner |> Require/derive_this())",
            ),
            (
                "inner",
                "options.upper |> WHEN { True => 'K', __ => record.initial }",
            ),
        ]);
        let nodes = derive(&registry, "outer").unwrap();
        assert_eq!(nodes, vec![ResultNode::Text("K/見".to_owned())]);
    }

    #[test]
    fn the_same_schema_may_be_required_twice_in_sequence() {
        let registry = registry(&[
            (
                "outer",
                "h: Require/schema(require, name: 'leaf')\n(h |> Require/derive_this()) + (h |> Require/derive_this())",
            ),
            ("leaf", "record.tone"),
        ]);
        assert_eq!(
            derive(&registry, "outer").unwrap(),
            vec![ResultNode::Text("平平".to_owned())]
        );
    }

    const COUNTDOWN: &str =
        "FUNCTION down(n) { n |> WHEN { 0 => 'done', __ => down(n: n - 1) } }\n";

    fn countdown(from: usize) -> String {
        format!("{COUNTDOWN}down(n: {from})")
    }

    fn depth_limit_of(error: EngineError) -> usize {
        match error.script_error().map(|error| &error.kind) {
            Some(ErrorKind::CallDepthExceeded(limit)) => *limit,
            other => panic!("expected the depth limit, got {other:?}"),
        }
    }

    #[test]
    fn recursion_to_the_default_limit_completes() {
        // `down(n: 63)` makes 64 nested calls
        let registry = registry(&[("down", countdown(DEFAULT_MAX_CALL_DEPTH - 1).as_str())]);
        assert_eq!(
            derive(&registry, "down").unwrap(),
            vec![ResultNode::Text("done".to_owned())]
        );
    }

    #[test]
    fn runaway_recursion_is_reported() {
        let registry = registry(&[("down", countdown(250).as_str())]);
        let error = derive(&registry, "down").unwrap_err();
        assert_eq!(depth_limit_of(error), DEFAULT_MAX_CALL_DEPTH);
    }

    #[test]
    fn required_schemas_share_the_call_budget() {
        let registry = registry(&[
            ("outer", "Require/schema(require, name: 'down') |> Require/derive_this()"),
            ("down", countdown(DEFAULT_MAX_CALL_DEPTH - 1).as_str()),
        ]);
        assert!(derive(&registry, "down").is_ok());
        let error = derive(&registry, "outer").unwrap_err();
        assert_eq!(depth_limit_of(error), DEFAULT_MAX_CALL_DEPTH);
    }
}
