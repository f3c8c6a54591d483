use std::sync::Arc;

use super::{LEGACY_KEY, PackedValues, ParameterValue};

static EMPTY: OptionsView = OptionsView { values: None };

/// Read-only view of packed values handed to scripts as `options`.
///
/// Every lookup succeeds: a key without a stored value answers with the
/// shared empty view, so scripts can probe `options.a.b` without checks.
#[derive(Debug, Clone, Default)]
pub struct OptionsView {
    values: Option<Arc<PackedValues>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    Value(&'a ParameterValue),
    Empty(&'static OptionsView),
}

impl OptionsView {
    pub fn new(values: PackedValues) -> Self {
        Self {
            values: Some(Arc::new(values)),
        }
    }

    pub fn empty() -> &'static OptionsView {
        &EMPTY
    }

    pub fn get(&self, key: &str) -> Lookup<'_> {
        match self.values.as_deref().and_then(|values| values.get(key)) {
            Some(value) => Lookup::Value(value),
            None => Lookup::Empty(&EMPTY),
        }
    }

    /// True for the empty view and for a view over no values.
    pub fn is_empty(&self) -> bool {
        self.values.as_deref().is_none_or(PackedValues::is_empty)
    }

    pub fn packed(&self) -> Option<&PackedValues> {
        self.values.as_deref()
    }

    pub fn is_legacy(&self) -> bool {
        self.get(LEGACY_KEY) == Lookup::Value(&ParameterValue::Bool(true))
    }
}

impl PartialEq for OptionsView {
    fn eq(&self, other: &Self) -> bool {
        match (self.packed(), other.packed()) {
            (Some(a), Some(b)) => a == b,
            _ => self.is_empty() && other.is_empty(),
        }
    }
}
