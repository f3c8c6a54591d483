//! `Module/function` builtins available to every script.

use std::rc::Rc;

use smallvec::SmallVec;

use super::{ErrorKind, Invocation, RequireHandle, ScriptError, Value};
use crate::domain::CategoryRecord;
use crate::format::{Formatter, ResultNode, Tag, children_of};
use crate::parameters::PackedValues;

/// Arguments of one builtin call. The piped value, when present, fills the
/// first parameter unless that parameter is also given by name.
pub(super) struct Arguments<'a> {
    function: String,
    piped: Option<Value>,
    named: SmallVec<[(&'a str, Value); 4]>,
}

impl<'a> Arguments<'a> {
    pub(super) fn new(
        function: String,
        piped: Option<Value>,
        named: SmallVec<[(&'a str, Value); 4]>,
    ) -> Self {
        Self {
            function,
            piped,
            named,
        }
    }

    fn take(&mut self, name: &str) -> Option<Value> {
        let position = self.named.iter().position(|(n, _)| *n == name)?;
        Some(self.named.remove(position).1)
    }

    /// The first parameter.
    fn input(&mut self, name: &str) -> Result<Value, ErrorKind> {
        match self.take(name) {
            Some(value) => Ok(value),
            None => self.piped.take().ok_or_else(|| self.missing(name)),
        }
    }

    fn required(&mut self, name: &str) -> Result<Value, ErrorKind> {
        self.take(name).ok_or_else(|| self.missing(name))
    }

    /// An optional argument; `Null` counts as absent.
    fn optional(&mut self, name: &str) -> Option<Value> {
        self.take(name).filter(|value| !value.is_absent())
    }

    fn missing(&self, name: &str) -> ErrorKind {
        ErrorKind::MissingArgument {
            function: self.function.clone(),
            argument: name.to_owned(),
        }
    }

    fn mismatch(&self, expected: &'static str, found: &Value) -> ErrorKind {
        ErrorKind::TypeMismatch {
            function: self.function.clone(),
            expected,
            found: found.type_name().to_owned(),
        }
    }

    fn text(&self, value: Value) -> Result<Rc<str>, ErrorKind> {
        match value {
            Value::Text(text) => Ok(text),
            other => Err(self.mismatch("text", &other)),
        }
    }

    fn number(&self, value: Value) -> Result<f64, ErrorKind> {
        value.as_number().ok_or_else(|| self.mismatch("number", &value))
    }

    fn index(&self, value: Value) -> Result<usize, ErrorKind> {
        let number = self.number(value)?;
        if number < 0.0 || number.fract() != 0.0 {
            return Err(ErrorKind::TypeMismatch {
                function: self.function.clone(),
                expected: "non-negative integer",
                found: super::format_number(number),
            });
        }
        Ok(number as usize)
    }

    fn list(&self, value: Value) -> Result<Rc<Vec<Value>>, ErrorKind> {
        match value {
            Value::List(items) => Ok(items),
            other => Err(self.mismatch("list", &other)),
        }
    }

    fn record(&self, value: Value) -> Result<CategoryRecord, ErrorKind> {
        match value {
            Value::Record(record) => Ok(record),
            other => Err(self.mismatch("record", &other)),
        }
    }

    fn packed(&self, value: Option<Value>) -> Result<Option<PackedValues>, ErrorKind> {
        let Some(value) = value else {
            return Ok(None);
        };
        match value {
            Value::Options(view) => Ok(view.packed().cloned()),
            Value::Object(fields) => fields
                .iter()
                .map(|(key, value)| {
                    value
                        .to_parameter_value()
                        .map(|value| (key.clone(), value))
                        .ok_or_else(|| self.mismatch("boolean, number or text option", value))
                })
                .collect::<Result<PackedValues, _>>()
                .map(Some),
            other => Err(self.mismatch("options", &other)),
        }
    }

    fn finish(&mut self) -> Result<(), ErrorKind> {
        let unexpected = match (self.named.first(), &self.piped) {
            (Some((name, _)), _) => (*name).to_owned(),
            (None, Some(_)) => "piped value".to_owned(),
            (None, None) => return Ok(()),
        };
        Err(ErrorKind::UnexpectedArgument {
            function: self.function.clone(),
            argument: unexpected,
        })
    }
}

fn chars_slice(text: &str, start: usize, end: Option<usize>) -> String {
    let count = text.chars().count();
    let end = end.unwrap_or(count).min(count);
    let start = start.min(end);
    text.chars().skip(start).take(end - start).collect()
}

fn element(tag: Tag, prop: Option<String>, children: Vec<ResultNode>) -> Value {
    let node = match prop {
        Some(prop) => Formatter.property(tag, prop).children(children),
        None => Formatter.element(tag, children),
    };
    Value::Node(Rc::new(node))
}

fn style_tag(name: &str) -> Option<Tag> {
    Some(match name {
        "Format/bold" => Tag::Bold,
        "Format/italic" => Tag::Italic,
        "Format/underline" => Tag::Underline,
        "Format/strikethrough" => Tag::Strikethrough,
        "Format/superscript" => Tag::Superscript,
        "Format/subscript" => Tag::Subscript,
        "Format/fragment" => Tag::Fragment,
        "Format/color" => Tag::Color,
        "Format/background" => Tag::Background,
        "Format/size" => Tag::FontSize,
        _ => return None,
    })
}

pub(super) fn call(
    name: &str,
    arguments: &mut Arguments<'_>,
    invocation: &Invocation<'_>,
    depth: usize,
) -> Result<Value, ScriptError> {
    let value = match name {
        "Text/length" => {
            let text = arguments.input("text")?;
            Value::Number(arguments.text(text)?.chars().count() as f64)
        }
        "Text/slice" => {
            let text = arguments.input("text")?;
            let text = arguments.text(text)?;
            let start = arguments.required("start")?;
            let start = arguments.index(start)?;
            let end = match arguments.optional("end") {
                Some(end) => Some(arguments.index(end)?),
                None => None,
            };
            Value::text(chars_slice(&text, start, end))
        }
        "Text/replace" => {
            let text = arguments.input("text")?;
            let text = arguments.text(text)?;
            let from = arguments.required("from")?;
            let from = arguments.text(from)?;
            let to = arguments.required("to")?;
            let to = arguments.text(to)?;
            if from.is_empty() {
                Value::Text(text)
            } else {
                Value::text(text.replace(&*from, &to))
            }
        }
        "Text/contains" | "Text/starts_with" | "Text/ends_with" => {
            let text = arguments.input("text")?;
            let text = arguments.text(text)?;
            let pattern = arguments.required("pattern")?;
            let pattern = arguments.text(pattern)?;
            Value::Bool(match name {
                "Text/contains" => text.contains(&*pattern),
                "Text/starts_with" => text.starts_with(&*pattern),
                _ => text.ends_with(&*pattern),
            })
        }
        "Text/chars" => {
            let text = arguments.input("text")?;
            let text = arguments.text(text)?;
            Value::list(text.chars().map(|c| Value::text(c.to_string())))
        }
        "List/length" => {
            let list = arguments.input("list")?;
            Value::Number(arguments.list(list)?.len() as f64)
        }
        "List/get" => {
            let list = arguments.input("list")?;
            let list = arguments.list(list)?;
            let index = arguments.required("index")?;
            let index = arguments.index(index)?;
            list.get(index).cloned().unwrap_or(Value::Null)
        }
        "List/join" => {
            let list = arguments.input("list")?;
            let list = arguments.list(list)?;
            let separator = match arguments.optional("separator") {
                Some(separator) => arguments.text(separator)?.to_string(),
                None => String::new(),
            };
            Value::text(
                list.iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(&separator),
            )
        }
        "List/contains" => {
            let list = arguments.input("list")?;
            let list = arguments.list(list)?;
            let item = arguments.required("item")?;
            Value::Bool(list.contains(&item))
        }
        "List/append" => {
            let list = arguments.input("list")?;
            let list = arguments.list(list)?;
            let item = arguments.required("item")?;
            let mut items = Vec::with_capacity(list.len() + 1);
            items.extend(list.iter().cloned());
            items.push(item);
            Value::List(Rc::new(items))
        }
        "Number/to_text" => {
            let number = arguments.input("number")?;
            Value::text(super::format_number(arguments.number(number)?))
        }
        "Record/is" => {
            let record = arguments.input("record")?;
            let record = arguments.record(record)?;
            let expr = arguments.required("expr")?;
            let expr = arguments.text(expr)?;
            let domain = invocation.domain.ok_or_else(|| {
                ErrorKind::Domain("no category domain is attached to this evaluation".to_owned())
            })?;
            Value::Bool(
                domain
                    .belongs_to(record, &expr)
                    .map_err(|error| ErrorKind::Domain(error.to_string()))?,
            )
        }
        "Record/describe" => {
            let record = arguments.input("record")?;
            Value::text(arguments.record(record)?.description())
        }
        "Options/get" => {
            let options = arguments.input("options")?;
            let key = arguments.required("key")?;
            let key = arguments.text(key)?;
            options.field(&key)?
        }
        "Require/schema" => {
            let require = arguments.input("require")?;
            if !matches!(require, Value::Require) {
                return Err(ErrorKind::RequireUnavailable.into());
            }
            let name = arguments.required("name")?;
            let name = arguments.text(name)?;
            let requirer = invocation.requirer.ok_or(ErrorKind::RequireUnavailable)?;
            Value::Schema(requirer.require(&name)?)
        }
        "Require/derive" | "Require/derive_this" => {
            let handle = arguments.input("schema")?;
            let handle: RequireHandle = match handle {
                Value::Schema(handle) => handle,
                other => return Err(arguments.mismatch("schema handle", &other).into()),
            };
            let (record, head) = if name == "Require/derive" {
                let record = arguments.required("record")?;
                let record = arguments.record(record)?;
                let head = match arguments.optional("head") {
                    Some(head) => Some(arguments.text(head)?),
                    None => None,
                };
                (record, head)
            } else {
                let record = invocation.record.ok_or(ErrorKind::RequireUnavailable)?;
                (record, invocation.head.map(Rc::from))
            };
            let options = arguments.optional("options");
            let options = arguments.packed(options)?;
            let requirer = invocation.requirer.ok_or(ErrorKind::RequireUnavailable)?;
            arguments.finish()?;
            // entering the required schema counts as one more call
            return requirer.derive(
                &handle,
                record,
                head.as_deref(),
                options.as_ref(),
                depth + 1,
            );
        }
        "Error/raise" => {
            let message = arguments.input("message")?;
            return Err(ErrorKind::Raised(message.to_string()).into());
        }
        _ => match style_tag(name) {
            Some(tag) if tag.takes_property() => {
                let prop = arguments.input("value")?;
                let prop = arguments.text(prop)?;
                let children = arguments.required("children")?;
                element(tag, Some(prop.to_string()), children_of(&children)?)
            }
            Some(tag) => {
                let children = arguments.input("children")?;
                element(tag, None, children_of(&children)?)
            }
            None => return Err(ErrorKind::UnknownFunction(name.to_owned()).into()),
        },
    };
    arguments.finish()?;
    Ok(value)
}
