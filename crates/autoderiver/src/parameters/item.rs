//! Parameter items and their wire shape.

use std::fmt;

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::script::Value;

/// Key to current value, in declaration order.
pub type PackedValues = IndexMap<String, ParameterValue>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Number(OrderedFloat<f64>),
    Text(String),
}

impl ParameterValue {
    pub fn number(number: f64) -> Self {
        ParameterValue::Number(OrderedFloat(number))
    }

    pub fn same_kind(&self, other: &ParameterValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Parse a command-line style value: `true`/`false`, a number, or text.
    pub fn parse_loose(text: &str) -> Self {
        match text {
            "true" | "True" => ParameterValue::Bool(true),
            "false" | "False" => ParameterValue::Bool(false),
            _ => text
                .parse::<f64>()
                .map(ParameterValue::number)
                .unwrap_or_else(|_| ParameterValue::Text(text.to_owned())),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(value) => write!(f, "{value}"),
            ParameterValue::Number(value) => {
                f.write_str(&crate::script::format_number(value.into_inner()))
            }
            ParameterValue::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Toggle,
    Number,
    Text,
    Choice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub value: ParameterValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionItem {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The default value.
    pub value: ParameterValue,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub reset: bool,
}

impl OptionItem {
    pub fn kind(&self) -> ControlKind {
        if !self.choices.is_empty() {
            return ControlKind::Choice;
        }
        match self.value {
            ParameterValue::Bool(_) => ControlKind::Toggle,
            ParameterValue::Number(_) => ControlKind::Number,
            ParameterValue::Text(_) => ControlKind::Text,
        }
    }

    /// Whether `value` is a valid setting for this option.
    pub fn accepts(&self, value: &ParameterValue) -> bool {
        match self.kind() {
            ControlKind::Choice => self.choices.iter().any(|choice| &choice.value == value),
            _ => self.value.same_kind(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterItem {
    Newline,
    GroupLabel {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Option(OptionItem),
}

impl ParameterItem {
    pub fn as_option(&self) -> Option<&OptionItem> {
        match self {
            ParameterItem::Option(option) => Some(option),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemsError {
    #[error("configuration must return a list, found {0}")]
    NotAList(String),
    #[error("item {index}: {reason}")]
    Malformed { index: usize, reason: String },
    #[error("duplicate option key '{0}'")]
    DuplicateKey(String),
}

/// Interpret the value a schema returned in configuration mode.
pub fn items_from_value(value: &Value) -> Result<Vec<ParameterItem>, ItemsError> {
    let Value::List(values) = value else {
        return Err(ItemsError::NotAList(value.type_name().to_owned()));
    };
    let mut items = Vec::with_capacity(values.len());
    let mut keys = std::collections::HashSet::new();
    for (index, value) in values.iter().enumerate() {
        let item = item_from_value(value).map_err(|reason| ItemsError::Malformed { index, reason })?;
        if let ParameterItem::Option(option) = &item {
            if !keys.insert(option.key.clone()) {
                return Err(ItemsError::DuplicateKey(option.key.clone()));
            }
        }
        items.push(item);
    }
    Ok(items)
}

fn scalar(value: &Value, what: &str) -> Result<ParameterValue, String> {
    value
        .to_parameter_value()
        .ok_or_else(|| format!("{what} must be a boolean, number or text, found {}", value.type_name()))
}

fn optional_text(fields: &IndexMap<String, Value>, name: &str) -> Result<Option<String>, String> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Text(text)) => Ok(Some(text.to_string())),
        Some(other) => Err(format!("'{name}' must be text, found {}", other.type_name())),
    }
}

fn flag(fields: &IndexMap<String, Value>, name: &str) -> Result<bool, String> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(other) => Err(format!("'{name}' must be True or False, found {}", other.type_name())),
    }
}

fn choice(value: &Value) -> Result<Choice, String> {
    match value {
        Value::Object(fields) => Ok(Choice {
            value: scalar(fields.get("value").unwrap_or(&Value::Null), "choice value")?,
            text: optional_text(fields, "text")?,
        }),
        other => Ok(Choice {
            value: scalar(other, "choice")?,
            text: None,
        }),
    }
}

fn option(
    key: &Value,
    value: &Value,
    choices: Vec<Choice>,
    fields: Option<&IndexMap<String, Value>>,
) -> Result<ParameterItem, String> {
    let Value::Text(key) = key else {
        return Err(format!("option key must be text, found {}", key.type_name()));
    };
    let option = match fields {
        Some(fields) => OptionItem {
            key: key.to_string(),
            text: optional_text(fields, "text")?,
            description: optional_text(fields, "description")?,
            value: scalar(value, "option value")?,
            choices,
            hidden: flag(fields, "hidden")?,
            disabled: flag(fields, "disabled")?,
            reset: flag(fields, "reset")?,
        },
        None => OptionItem {
            key: key.to_string(),
            text: None,
            description: None,
            value: scalar(value, "option value")?,
            choices,
            hidden: false,
            disabled: false,
            reset: false,
        },
    };
    if !option.choices.is_empty() && !option.accepts(&option.value) {
        return Err(format!("default of '{}' is not one of its choices", option.key));
    }
    Ok(ParameterItem::Option(option))
}

fn item_from_value(value: &Value) -> Result<ParameterItem, String> {
    match value {
        Value::Null => Ok(ParameterItem::Newline),
        Value::Tag(tag) if &**tag == "Newline" => Ok(ParameterItem::Newline),
        Value::Text(text) => Ok(ParameterItem::GroupLabel {
            text: text.to_string(),
            description: None,
        }),
        Value::List(parts) => match parts.as_slice() {
            [key, value, choices @ ..] => option(
                key,
                value,
                choices.iter().map(choice).collect::<Result<_, _>>()?,
                None,
            ),
            _ => Err("a list item needs at least a key and a value".to_owned()),
        },
        Value::Object(fields) => match (fields.get("key"), fields.get("value")) {
            (Some(key), Some(value)) => {
                let choices = match fields.get("options") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::List(choices)) => {
                        choices.iter().map(choice).collect::<Result<_, _>>()?
                    }
                    Some(other) => {
                        return Err(format!("'options' must be a list, found {}", other.type_name()));
                    }
                };
                option(key, value, choices, Some(fields))
            }
            (Some(_), None) => Err("option without a value".to_owned()),
            (None, _) => match optional_text(fields, "text")? {
                Some(text) => Ok(ParameterItem::GroupLabel {
                    text,
                    description: optional_text(fields, "description")?,
                }),
                None => Err("object item needs a key or a text".to_owned()),
            },
        },
        other => Err(format!("unexpected {}", other.type_name())),
    }
}
