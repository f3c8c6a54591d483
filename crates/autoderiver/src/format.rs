//! Result trees: the canonical, comparable form of one derivation's output.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::script::{ErrorKind, Value};

/// Inline style markers a result tree may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Superscript,
    Subscript,
    Color,
    Background,
    FontSize,
    Fragment,
}

impl Tag {
    pub fn takes_property(self) -> bool {
        matches!(self, Tag::Color | Tag::Background | Tag::FontSize)
    }
}

/// One node of a result tree. Immutable once built; two trees are equal
/// exactly when their serialized forms are.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultNode {
    Text(String),
    Element {
        tag: Tag,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prop: Option<String>,
        children: Vec<ResultNode>,
    },
}

impl ResultNode {
    pub fn plain_text(&self) -> String {
        let mut text = String::new();
        self.write_plain_text(&mut text);
        text
    }

    fn write_plain_text(&self, out: &mut String) {
        match self {
            ResultNode::Text(text) => out.push_str(text),
            ResultNode::Element { children, .. } => {
                for child in children {
                    child.write_plain_text(out);
                }
            }
        }
    }
}

/// The constructor capability handed to templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct Formatter;

/// A property-bearing tag waiting for its children: `color("red").children(..)`.
#[derive(Debug, Clone)]
pub struct PropertyTag {
    tag: Tag,
    prop: String,
}

impl PropertyTag {
    pub fn children(self, children: impl IntoIterator<Item = ResultNode>) -> ResultNode {
        ResultNode::Element {
            tag: self.tag,
            prop: Some(self.prop),
            children: children.into_iter().collect(),
        }
    }
}

impl Formatter {
    pub fn text(&self, text: impl Into<String>) -> ResultNode {
        ResultNode::Text(text.into())
    }

    pub fn element(&self, tag: Tag, children: impl IntoIterator<Item = ResultNode>) -> ResultNode {
        ResultNode::Element {
            tag,
            prop: None,
            children: children.into_iter().collect(),
        }
    }

    pub fn bold(&self, children: impl IntoIterator<Item = ResultNode>) -> ResultNode {
        self.element(Tag::Bold, children)
    }

    pub fn italic(&self, children: impl IntoIterator<Item = ResultNode>) -> ResultNode {
        self.element(Tag::Italic, children)
    }

    pub fn underline(&self, children: impl IntoIterator<Item = ResultNode>) -> ResultNode {
        self.element(Tag::Underline, children)
    }

    pub fn strikethrough(&self, children: impl IntoIterator<Item = ResultNode>) -> ResultNode {
        self.element(Tag::Strikethrough, children)
    }

    pub fn superscript(&self, children: impl IntoIterator<Item = ResultNode>) -> ResultNode {
        self.element(Tag::Superscript, children)
    }

    pub fn subscript(&self, children: impl IntoIterator<Item = ResultNode>) -> ResultNode {
        self.element(Tag::Subscript, children)
    }

    pub fn fragment(&self, children: impl IntoIterator<Item = ResultNode>) -> ResultNode {
        self.element(Tag::Fragment, children)
    }

    pub fn property(&self, tag: Tag, prop: impl Into<String>) -> PropertyTag {
        PropertyTag {
            tag,
            prop: prop.into(),
        }
    }

    pub fn color(&self, color: impl Into<String>) -> PropertyTag {
        self.property(Tag::Color, color)
    }

    pub fn background(&self, color: impl Into<String>) -> PropertyTag {
        self.property(Tag::Background, color)
    }

    pub fn size(&self, size: impl Into<String>) -> PropertyTag {
        self.property(Tag::FontSize, size)
    }
}

/// What a derivation hands to the formatter before normalization.
#[derive(Clone)]
pub enum RawResult {
    Text(String),
    /// Flattened into a single `fragment` element.
    List(Vec<RawResult>),
    Template(Rc<dyn Fn(&Formatter) -> ResultNode>),
    Node(ResultNode),
}

impl fmt::Debug for RawResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawResult::Text(text) => f.debug_tuple("Text").field(text).finish(),
            RawResult::List(items) => f.debug_tuple("List").field(items).finish(),
            RawResult::Template(_) => f.write_str("Template(..)"),
            RawResult::Node(node) => f.debug_tuple("Node").field(node).finish(),
        }
    }
}

impl From<&str> for RawResult {
    fn from(text: &str) -> Self {
        RawResult::Text(text.to_owned())
    }
}

impl RawResult {
    /// Interpret a script value. `Null` means "no result" and yields `None`.
    pub fn from_value(value: &Value) -> Result<Option<Self>, ErrorKind> {
        Ok(Some(match value {
            Value::Null => return Ok(None),
            Value::Options(view) if view.is_empty() => return Ok(None),
            Value::Text(text) => RawResult::Text(text.to_string()),
            Value::Number(_) | Value::Tag(_) => RawResult::Text(value.to_string()),
            Value::Node(node) => RawResult::Node(node.as_ref().clone()),
            Value::List(items) => RawResult::List(
                items
                    .iter()
                    .map(|item| {
                        RawResult::from_value(item)
                            .map(|raw| raw.unwrap_or_else(|| RawResult::Text(String::new())))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            other => {
                return Err(ErrorKind::TypeMismatch {
                    function: "result".to_owned(),
                    expected: "text, list or formatted result",
                    found: other.type_name().to_owned(),
                });
            }
        }))
    }
}

/// Normalize a raw result into its node list.
pub fn render(raw: &RawResult) -> Vec<ResultNode> {
    match raw {
        RawResult::Text(text) => vec![ResultNode::Text(text.clone())],
        RawResult::List(items) => vec![ResultNode::Element {
            tag: Tag::Fragment,
            prop: None,
            children: items.iter().flat_map(render).collect(),
        }],
        RawResult::Template(template) => vec![template(&Formatter)],
        RawResult::Node(node) => vec![node.clone()],
    }
}

/// Canonical serialization, usable as a deduplication key.
pub fn stringify(nodes: &[ResultNode]) -> String {
    // Only strings and derived enums: serializing into a string cannot fail.
    serde_json::to_string(nodes).expect("Failed to serialize result tree")
}

pub fn is_equal(a: &[ResultNode], b: &[ResultNode]) -> bool {
    stringify(a) == stringify(b)
}

pub fn plain_text(nodes: &[ResultNode]) -> String {
    nodes.iter().map(ResultNode::plain_text).collect()
}

/// Flatten script-produced children into one node list; lists splice.
pub(crate) fn children_of(value: &Value) -> Result<Vec<ResultNode>, ErrorKind> {
    match value {
        Value::List(items) => {
            let mut children = Vec::with_capacity(items.len());
            for item in items.iter() {
                children.extend(children_of(item)?);
            }
            Ok(children)
        }
        other => Ok(RawResult::from_value(other)?
            .map(|raw| render(&raw))
            .unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn independently_built_trees_are_equal() {
        let build = || {
            render(&RawResult::Template(Rc::new(|f: &Formatter| {
                f.fragment([
                    f.bold([f.text("p")]),
                    f.color("red").children([f.text("a")]),
                ])
            })))
        };
        let (a, b) = (build(), build());
        assert!(is_equal(&a, &b));
        assert_eq!(stringify(&a), stringify(&b));
    }

    #[test]
    fn nested_lists_flatten_into_fragments() {
        let raw = RawResult::List(vec![
            "a".into(),
            RawResult::List(vec!["b".into(), "c".into()]),
        ]);
        let nodes = render(&raw);
        assert_eq!(
            stringify(&nodes),
            r#"[{"tag":"fragment","children":["a",{"tag":"fragment","children":["b","c"]}]}]"#
        );
        assert_eq!(plain_text(&nodes), "abc");
    }

    #[test]
    fn empty_text_is_a_result_and_null_is_not() {
        assert!(RawResult::from_value(&Value::text("")).unwrap().is_some());
        assert!(RawResult::from_value(&Value::Null).unwrap().is_none());
    }

    #[test]
    fn serialized_tree_parses_back() {
        let nodes = render(&RawResult::Template(Rc::new(|f: &Formatter| {
            f.size("80%").children([f.superscript([f.text("2")])])
        })));
        let text = stringify(&nodes);
        let parsed: Vec<ResultNode> = serde_json::from_str(&text).unwrap();
        assert_eq!(stringify(&parsed), text);
    }
}
