//! A schema: one script usable in both configuration and derivation mode.

use std::rc::Rc;

use tracing::trace;

use crate::config::EngineConfig;
use crate::domain::{CategoryDomain, CategoryRecord};
use crate::error::{DerivationContext, EngineError};
use crate::format::{RawResult, ResultNode, render};
use crate::parameters::{OptionsView, ParameterItem, items_from_value};
use crate::script::{
    ErrorKind, Invocation, Program, Requirer, ScriptError, ScriptSource, Value, compile, evaluate,
};

/// A named, compiled script. Compilation happens once, in [`Schema::new`];
/// a script that fails to compile still makes a schema whose every
/// invocation reports the syntax error.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    source: ScriptSource,
    program: Result<Rc<Program>, ScriptError>,
}

impl Schema {
    pub fn new(name: impl Into<String>, source: ScriptSource) -> Self {
        let program = compile(&source).map(Rc::new);
        Self {
            name: name.into(),
            source,
            program,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &ScriptSource {
        &self.source
    }

    pub fn compile_error(&self) -> Option<&ScriptError> {
        self.program.as_ref().err()
    }

    fn program(&self) -> Result<&Program, ScriptError> {
        self.program.as_deref().map_err(Clone::clone)
    }

    /// Configuration mode: `record`, `head` and `require` are `Null`.
    pub fn configure(
        &self,
        options: OptionsView,
        config: &EngineConfig,
    ) -> Result<Vec<ParameterItem>, EngineError> {
        let configuration_error = |source| EngineError::Configuration {
            schema: self.name.clone(),
            source,
        };
        let program = self.program().map_err(configuration_error)?;
        let invocation =
            Invocation::configuration(options).with_max_call_depth(config.max_call_depth);
        let value = evaluate(program, &invocation).map_err(configuration_error)?;
        items_from_value(&value).map_err(|source| EngineError::Parameters {
            schema: self.name.clone(),
            source,
        })
    }

    /// Derivation mode, returning the script's raw value. In legacy mode the
    /// record is normalized first. `call_depth` is the depth a requiring
    /// schema has already used; top-level derivations start at zero.
    #[allow(clippy::too_many_arguments)]
    pub fn invoke(
        &self,
        record: CategoryRecord,
        head: Option<&str>,
        options: OptionsView,
        requirer: &dyn Requirer,
        domain: &dyn CategoryDomain,
        config: &EngineConfig,
        call_depth: usize,
    ) -> Result<Value, ScriptError> {
        let program = self.program()?;
        let record = if options.is_legacy() {
            config
                .legacy
                .adjust(record, domain)
                .map_err(|error| ScriptError::unlocated(ErrorKind::Domain(error.to_string())))?
        } else {
            record
        };
        trace!(schema = %self.name, %record, "deriving");
        let invocation = Invocation::derivation(record, head, options, requirer)
            .with_domain(domain)
            .with_max_call_depth(config.max_call_depth)
            .with_call_depth(call_depth);
        evaluate(program, &invocation)
    }

    /// Derivation mode, returning the rendered result. `Null` is reported
    /// as [`EngineError::NoResult`].
    pub fn derive(
        &self,
        record: CategoryRecord,
        head: Option<&str>,
        options: OptionsView,
        requirer: &dyn Requirer,
        domain: &dyn CategoryDomain,
        config: &EngineConfig,
    ) -> Result<Vec<ResultNode>, EngineError> {
        let derivation_error = |source| EngineError::Derivation {
            schema: self.name.clone(),
            context: DerivationContext::new(record, head),
            source,
        };
        let value = self
            .invoke(record, head, options, requirer, domain, config, 0)
            .map_err(derivation_error)?;
        let raw = RawResult::from_value(&value)
            .map_err(|kind| derivation_error(ScriptError::unlocated(kind)))?
            .ok_or_else(|| EngineError::NoResult {
                schema: self.name.clone(),
                context: DerivationContext::new(record, head),
            })?;
        Ok(render(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ParameterItem;

    #[test]
    fn same_script_serves_both_modes() {
        let schema = Schema::new(
            "both",
            ScriptSource::from(
                "record |> WHEN {\n    Null => LIST { [key: 'tone', value: True] }\n    __ => record.initial\n}",
            ),
        );
        let items = schema
            .configure(OptionsView::default(), &EngineConfig::default())
            .unwrap();
        assert!(matches!(&items[0], ParameterItem::Option(option) if option.key == "tone"));
    }

    #[test]
    fn syntax_errors_surface_on_every_call() {
        let schema = Schema::new("broken", ScriptSource::from("LIST {"));
        assert!(schema.compile_error().is_some());
        let error = schema
            .configure(OptionsView::default(), &EngineConfig::default())
            .unwrap_err();
        assert!(matches!(error, EngineError::Configuration { .. }));
    }
}
