//! Runtime values of the script language.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use ordered_float::OrderedFloat;

use super::ErrorKind;
use crate::domain::CategoryRecord;
use crate::format::ResultNode;
use crate::parameters::{Lookup, OptionsView, ParameterValue};
use crate::require::RequireChain;

/// Runtime value type.
/// Aggregates are `Rc`-wrapped so cloning a value is O(1).
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(Rc<str>),
    /// Any PascalCase tag other than `True`, `False` and `Null`.
    Tag(Rc<str>),
    List(Rc<Vec<Value>>),
    Object(Rc<IndexMap<String, Value>>),
    Record(CategoryRecord),
    /// The `options` parameter: a view that never fails a field lookup.
    Options(OptionsView),
    /// The `require` parameter in derivation mode.
    Require,
    /// A handle returned by `Require/schema`.
    Schema(RequireHandle),
    /// A formatted result built with the `Format/*` functions.
    Node(Rc<ResultNode>),
}

/// Bound reference to another schema, obtained through `require`.
///
/// Holds the chain that was active when it was created; the chain is only
/// extended when the handle is actually used to derive.
#[derive(Debug, Clone)]
pub struct RequireHandle {
    pub name: Rc<str>,
    pub chain: RequireChain,
}

impl Value {
    pub fn text(text: impl AsRef<str>) -> Self {
        Value::Text(Rc::from(text.as_ref()))
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Rc::new(items.into_iter().collect()))
    }

    pub fn object(fields: impl IntoIterator<Item = (impl Into<String>, Value)>) -> Self {
        Value::Object(Rc::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Tag(_) => "tag",
            Value::List(_) => "list",
            Value::Object(_) => "object",
            Value::Record(_) => "record",
            Value::Options(_) => "options",
            Value::Require => "require",
            Value::Schema(_) => "schema handle",
            Value::Node(_) => "formatted result",
        }
    }

    /// `Null`, or an option that was never set.
    pub fn is_absent(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Options(view) => view.is_empty(),
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Field access with the `.` operator.
    pub fn field(&self, name: &str) -> Result<Value, ErrorKind> {
        let unknown = || ErrorKind::UnknownField {
            field: name.to_owned(),
            on: self.type_name().to_owned(),
        };
        match self {
            Value::Object(fields) => fields.get(name).cloned().ok_or_else(unknown),
            Value::Options(view) => Ok(match view.get(name) {
                Lookup::Value(value) => Value::from(value.clone()),
                Lookup::Empty(empty) => Value::Options(empty.clone()),
            }),
            Value::Record(record) => {
                let optional = |feature: Option<char>| {
                    feature.map_or(Value::Null, |feature| Value::text(feature.to_string()))
                };
                match name {
                    "initial" => Ok(Value::text(record.initial.to_string())),
                    "rounding" => Ok(optional(record.rounding)),
                    "division" => Ok(Value::text(record.division.to_string())),
                    "rare" => Ok(optional(record.rare)),
                    "rhyme" => Ok(Value::text(record.rhyme.to_string())),
                    "tone" => Ok(Value::text(record.tone.to_string())),
                    "description" => Ok(Value::text(record.description())),
                    _ => Err(unknown()),
                }
            }
            Value::Node(node) if name == "text" => Ok(Value::text(node.plain_text())),
            _ => Err(unknown()),
        }
    }

    /// Short representation used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Value::Text(text) => format!("'{text}'"),
            Value::List(items) => format!("list of {}", items.len()),
            Value::Object(fields) => format!(
                "[{}]",
                fields.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
            ),
            Value::Record(record) => record.description(),
            Value::Schema(handle) => format!("schema '{}'", handle.name),
            other => other.to_string(),
        }
    }

    pub fn to_parameter_value(&self) -> Option<ParameterValue> {
        match self {
            Value::Bool(value) => Some(ParameterValue::Bool(*value)),
            Value::Number(value) => Some(ParameterValue::Number(OrderedFloat(*value))),
            Value::Text(value) => Some(ParameterValue::Text(value.to_string())),
            _ => None,
        }
    }
}

pub(crate) fn format_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(value) => write!(f, "{}", if *value { "True" } else { "False" }),
            Value::Number(value) => f.write_str(&format_number(*value)),
            Value::Text(value) => f.write_str(value),
            Value::Tag(tag) => f.write_str(tag),
            Value::List(items) => {
                for item in items.iter() {
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Object(_) => f.write_str("[object]"),
            Value::Record(record) => f.write_str(&record.description()),
            Value::Options(_) => f.write_str("[options]"),
            Value::Require => f.write_str("[require]"),
            Value::Schema(handle) => write!(f, "[schema {}]", handle.name),
            Value::Node(node) => f.write_str(&node.plain_text()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, Value::Options(view)) | (Value::Options(view), Value::Null) => {
                view.is_empty()
            }
            (Value::Options(a), Value::Options(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Tag(a), Value::Tag(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Require, Value::Require) => true,
            (Value::Schema(a), Value::Schema(b)) => a.name == b.name,
            (Value::Node(a), Value::Node(b)) => a == b,
            _ => false,
        }
    }
}

impl From<ParameterValue> for Value {
    fn from(value: ParameterValue) -> Self {
        match value {
            ParameterValue::Bool(value) => Value::Bool(value),
            ParameterValue::Number(value) => Value::Number(value.into_inner()),
            ParameterValue::Text(value) => Value::text(value),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::text(value)
    }
}
