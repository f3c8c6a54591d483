use autoderiver::format::{RawResult, is_equal, render, stringify};
use autoderiver::parameters::{Choice, OptionItem, PackedValues, ParameterItem, ParameterValue};
use autoderiver::script::ErrorKind;
use autoderiver::{
    EngineConfig, EngineError, ParameterSet, ResultNode, Resolver, Schema, SchemaRegistry,
    ScriptSource, Tag, TableDomain,
};
use proptest::prelude::*;

fn tag() -> impl Strategy<Value = Tag> {
    prop_oneof![
        Just(Tag::Bold),
        Just(Tag::Italic),
        Just(Tag::Underline),
        Just(Tag::Strikethrough),
        Just(Tag::Superscript),
        Just(Tag::Subscript),
        Just(Tag::Fragment),
        Just(Tag::Color),
        Just(Tag::Background),
        Just(Tag::FontSize),
    ]
}

fn node() -> impl Strategy<Value = ResultNode> {
    let leaf = "[a-z甲乙丙]{0,4}".prop_map(ResultNode::Text);
    leaf.prop_recursive(4, 32, 4, |inner| {
        (tag(), "[a-z#0-9]{1,6}", prop::collection::vec(inner, 0..4)).prop_map(
            |(tag, prop, children)| ResultNode::Element {
                tag,
                prop: tag.takes_property().then_some(prop),
                children,
            },
        )
    })
}

fn value() -> impl Strategy<Value = ParameterValue> {
    prop_oneof![
        any::<bool>().prop_map(ParameterValue::Bool),
        (-100i32..100).prop_map(|number| ParameterValue::number(f64::from(number))),
        "[a-z]{0,3}".prop_map(ParameterValue::Text),
    ]
}

fn option(index: usize, default: ParameterValue, with_choices: bool, reset: bool) -> ParameterItem {
    let choices = if with_choices {
        vec![
            Choice {
                value: default.clone(),
                text: None,
            },
            Choice {
                value: ParameterValue::Text("other".to_owned()),
                text: None,
            },
        ]
    } else {
        Vec::new()
    };
    ParameterItem::Option(OptionItem {
        key: format!("key{index}"),
        text: None,
        description: None,
        value: default,
        choices,
        hidden: false,
        disabled: false,
        reset,
    })
}

fn parameter_set() -> impl Strategy<Value = ParameterSet> {
    prop::collection::vec((value(), any::<bool>(), any::<bool>(), value()), 0..6).prop_map(
        |options| {
            let items = options
                .iter()
                .enumerate()
                .map(|(index, (default, with_choices, reset, _))| {
                    option(index, default.clone(), *with_choices, *reset)
                })
                .collect();
            options.into_iter().enumerate().fold(
                ParameterSet::from_items(items),
                |set, (index, (_, _, _, update))| set.set(&format!("key{index}"), update),
            )
        },
    )
}

proptest! {
    #[test]
    fn combining_with_itself_changes_nothing(set in parameter_set()) {
        prop_assert_eq!(set.combine(&set), set.clone());
        prop_assert_eq!(set.restore(set.packed()), set);
    }

    #[test]
    fn equal_trees_stringify_equally(nodes in prop::collection::vec(node(), 0..4)) {
        let rebuilt: Vec<ResultNode> = serde_json::from_str(&stringify(&nodes)).unwrap();
        prop_assert!(is_equal(&nodes, &rebuilt));
        prop_assert_eq!(rebuilt, nodes);
    }

    #[test]
    fn rendering_a_node_keeps_it(node in node()) {
        let rendered = render(&RawResult::Node(node.clone()));
        prop_assert_eq!(stringify(&rendered), stringify(std::slice::from_ref(&node)));
    }

    #[test]
    fn require_cycles_are_detected(length in 2usize..6) {
        let names = (0..length).map(|index| format!("s{index}")).collect::<Vec<_>>();
        let mut registry = SchemaRegistry::new();
        for (index, name) in names.iter().enumerate() {
            let next = &names[(index + 1) % length];
            let code = format!(
                "Require/schema(require, name: '{next}') |> Require/derive(record: record)"
            );
            registry.insert(Schema::new(name.as_str(), ScriptSource::from(code)), PackedValues::new());
        }
        let domain = TableDomain::from_json(
            r#"{ "records": [{ "description": "見開一歌平" }] }"#,
        )
        .unwrap();
        let config = EngineConfig::default();
        let resolver = Resolver::new(&registry, &domain, &config);
        let record = "見開一歌平".parse().unwrap();

        let error = resolver.derive_schema("s0", record, None).unwrap_err();
        let EngineError::Derivation { source, .. } = error else {
            panic!("expected a derivation error");
        };
        let mut expected = names.clone();
        expected.push(names[0].clone());
        prop_assert_eq!(source.kind, ErrorKind::RequireCycle { chain: expected });
    }
}
