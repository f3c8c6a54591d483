//! The editable options a schema declares in configuration mode.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::schema::Schema;

mod item;
pub use item::{
    Choice, ControlKind, ItemsError, OptionItem, PackedValues, ParameterItem, ParameterValue,
    items_from_value,
};

mod view;
pub use view::{Lookup, OptionsView};

/// Reserved hidden option selecting the legacy derivation variant.
pub const LEGACY_KEY: &str = "$legacy";

/// Declared items plus the current value of every option.
///
/// Immutable: every update returns a new set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    items: Arc<[ParameterItem]>,
    packed: PackedValues,
}

impl ParameterSet {
    /// A set holding the items' defaults.
    pub fn from_items(items: Vec<ParameterItem>) -> Self {
        let packed = items
            .iter()
            .filter_map(ParameterItem::as_option)
            .map(|option| (option.key.clone(), option.value.clone()))
            .collect();
        Self {
            items: items.into(),
            packed,
        }
    }

    /// Run configuration mode with `previous` visible as `options`, then
    /// carry `previous` over.
    pub fn try_from_schema(
        schema: &Schema,
        previous: Option<&PackedValues>,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        let options = previous.cloned().map(OptionsView::new).unwrap_or_default();
        let fresh = Self::from_items(schema.configure(options, config)?);
        debug!(schema = schema.name(), options = fresh.size(), "parameters configured");
        Ok(match previous {
            Some(previous) => fresh.restore(previous),
            None => fresh,
        })
    }

    /// Like [`Self::try_from_schema`], but a failing configuration yields the
    /// empty set.
    pub fn from_schema(
        schema: &Schema,
        previous: Option<&PackedValues>,
        config: &EngineConfig,
    ) -> Self {
        Self::try_from_schema(schema, previous, config).unwrap_or_else(|error| {
            warn!(schema = schema.name(), %error, "configuration failed, no parameters");
            Self::default()
        })
    }

    /// No declared items, only `packed`. Held by a schema that currently
    /// fails to configure, so its stored values survive until it is fixed.
    pub fn stored(packed: PackedValues) -> Self {
        Self {
            items: Arc::from([]),
            packed,
        }
    }

    pub fn items(&self) -> &[ParameterItem] {
        &self.items
    }

    pub fn options(&self) -> impl Iterator<Item = &OptionItem> {
        self.items.iter().filter_map(ParameterItem::as_option)
    }

    pub fn option(&self, key: &str) -> Option<&OptionItem> {
        self.options().find(|option| option.key == key)
    }

    /// Number of visible options.
    pub fn size(&self) -> usize {
        self.options().filter(|option| !option.hidden).count()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ParameterValue> {
        self.packed.get(key)
    }

    pub fn packed(&self) -> &PackedValues {
        &self.packed
    }

    pub fn pack(&self) -> PackedValues {
        self.packed.clone()
    }

    pub fn view(&self) -> OptionsView {
        OptionsView::new(self.packed.clone())
    }

    pub fn is_legacy(&self) -> bool {
        self.packed.get(LEGACY_KEY) == Some(&ParameterValue::Bool(true))
    }

    /// Update one value. Undeclared keys and values the option does not
    /// accept leave the set unchanged.
    pub fn set(&self, key: &str, value: ParameterValue) -> Self {
        match self.option(key) {
            Some(option) if option.accepts(&value) => {
                let mut packed = self.packed.clone();
                packed.insert(key.to_owned(), value);
                Self {
                    items: self.items.clone(),
                    packed,
                }
            }
            Some(_) => {
                warn!(key, %value, "value rejected by option");
                self.clone()
            }
            None => {
                warn!(key, "no such option");
                self.clone()
            }
        }
    }

    /// Keep the current items but take stored values from `old`.
    ///
    /// When the two item lists differ, keys flagged `reset` in either list
    /// fall back to their current default.
    pub fn combine(&self, old: &ParameterSet) -> Self {
        let resetting = if self.items == old.items {
            Vec::new()
        } else {
            self.options()
                .chain(old.options())
                .filter(|option| option.reset)
                .map(|option| option.key.as_str())
                .collect()
        };
        self.carry_over(&old.packed, &resetting)
    }

    /// Take stored values from a bare packed map, e.g. one restored from
    /// persistence.
    pub fn restore(&self, packed: &PackedValues) -> Self {
        self.carry_over(packed, &[])
    }

    fn carry_over(&self, old: &PackedValues, resetting: &[&str]) -> Self {
        let packed = self
            .options()
            .map(|option| {
                let value = old
                    .get(&option.key)
                    .filter(|_| !resetting.contains(&option.key.as_str()))
                    .filter(|value| option.accepts(value))
                    .unwrap_or(&option.value);
                (option.key.clone(), value.clone())
            })
            .collect();
        Self {
            items: self.items.clone(),
            packed,
        }
    }

    /// Re-run configuration against `schema` and combine with `self`.
    pub fn try_refresh(&self, schema: &Schema, config: &EngineConfig) -> Result<Self, EngineError> {
        let options = OptionsView::new(self.packed.clone());
        let fresh = Self::from_items(schema.configure(options, config)?);
        Ok(fresh.combine(self))
    }

    /// Like [`Self::try_refresh`]; on failure `self` is kept.
    pub fn refresh(&self, schema: &Schema, config: &EngineConfig) -> Self {
        self.try_refresh(schema, config).unwrap_or_else(|error| {
            warn!(schema = schema.name(), %error, "refresh failed, keeping parameters");
            self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptSource;

    fn schema(code: &str) -> Schema {
        Schema::new("test", ScriptSource::from(code))
    }

    fn configured(code: &str) -> ParameterSet {
        ParameterSet::try_from_schema(&schema(code), None, &EngineConfig::default()).unwrap()
    }

    fn packed(pairs: &[(&str, ParameterValue)]) -> PackedValues {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn set_then_pack() {
        let set = configured("LIST { [key: 'x', value: True] }");
        let updated = set.set("x", ParameterValue::Bool(false));
        assert_eq!(updated.pack(), packed(&[("x", ParameterValue::Bool(false))]));
        // the source set is untouched
        assert_eq!(set.get("x"), Some(&ParameterValue::Bool(true)));
    }

    #[test]
    fn old_value_wins_without_reset() {
        let set = configured("LIST { [key: 'x', value: True] }");
        let old = set.set("x", ParameterValue::Bool(false));
        let fresh = configured("LIST { [key: 'x', value: True] }");
        assert_eq!(fresh.combine(&old).get("x"), Some(&ParameterValue::Bool(false)));
        assert_eq!(
            fresh
                .restore(&packed(&[("x", ParameterValue::Bool(true))]))
                .pack(),
            packed(&[("x", ParameterValue::Bool(true))])
        );
    }

    #[test]
    fn reset_keys_drop_their_value_when_the_source_changes() {
        let old = configured("LIST { [key: 'k', value: 1, reset: True] }")
            .set("k", ParameterValue::number(5.0));
        let changed = configured("LIST { 'Label'\n[key: 'k', value: 1] }");
        assert_eq!(changed.combine(&old).get("k"), Some(&ParameterValue::number(1.0)));
        // an unchanged source keeps everything
        assert_eq!(old.combine(&old), old);
    }

    #[test]
    fn kind_changes_and_stale_choices_fall_back_to_defaults() {
        let old = configured("LIST { LIST { 'm', 'a', 'a', 'b' }, [key: 'n', value: 1] }")
            .set("m", ParameterValue::Text("b".into()))
            .set("n", ParameterValue::number(3.0));
        let fresh = configured("LIST { LIST { 'm', 'a', 'a', 'c' }, [key: 'n', value: 'one'] }");
        let combined = fresh.combine(&old);
        assert_eq!(combined.get("m"), Some(&ParameterValue::Text("a".into())));
        assert_eq!(combined.get("n"), Some(&ParameterValue::Text("one".into())));
    }

    #[test]
    fn undeclared_keys_are_dropped_and_ignored() {
        let old = configured("LIST { [key: 'gone', value: 1], [key: 'x', value: 2] }");
        let fresh = configured("LIST { [key: 'x', value: 0] }");
        let combined = fresh.combine(&old);
        assert_eq!(combined.pack(), packed(&[("x", ParameterValue::number(2.0))]));
        assert_eq!(combined.set("gone", ParameterValue::number(9.0)), combined);
    }

    #[test]
    fn failing_configuration_degrades() {
        let broken = schema("Error/raise(message: 'nope')");
        let config = EngineConfig::default();
        assert!(ParameterSet::try_from_schema(&broken, None, &config).is_err());
        assert!(ParameterSet::from_schema(&broken, None, &config).is_empty());
        assert!(ParameterSet::from_schema(&schema("'not a list'"), None, &config).is_empty());

        let set = configured("LIST { [key: 'x', value: True] }").set("x", ParameterValue::Bool(false));
        assert_eq!(set.refresh(&schema("LIST { "), &config), set);
    }

    #[test]
    fn configuration_sees_previous_values() {
        let code = "LIST { [key: 'x', value: True], [key: 'y', value: options.x ?? 'unset'] }";
        let set = ParameterSet::try_from_schema(
            &schema(code),
            Some(&packed(&[("x", ParameterValue::Bool(false))])),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(set.get("x"), Some(&ParameterValue::Bool(false)));
        assert!(matches!(
            set.option("y").map(|option| &option.value),
            Some(ParameterValue::Bool(false))
        ));
    }

    #[test]
    fn size_counts_visible_options() {
        let set = configured("LIST { 'Group', Newline, [key: 'a', value: 1], [key: '$legacy', value: True, hidden: True] }");
        assert_eq!(set.size(), 1);
        assert!(set.is_legacy());
    }
}
