use autoderiver::domain::{DomainTable, EntryRow, RecordRow};
use autoderiver::evaluate::{
    ArticleSegment, ComparisonSummary, EvaluationOptions, EvaluationOutput, Operation, evaluate,
    export_all, export_unique, export_with_count,
};
use autoderiver::parameters::{LEGACY_KEY, PackedValues, ParameterValue};
use autoderiver::{
    EngineConfig, EngineError, ResultNode, Resolver, Schema, SchemaRegistry, ScriptSource, Tag,
    TableDomain,
};

const DOMAIN: &str = r#"{
    "groups": { "脣音": "幫滂並明母" },
    "records": [
        { "description": "幫三A眞平", "characters": [{ "character": "賓" }] },
        { "description": "見開一歌平", "characters": [{ "character": "歌" }, { "character": "甲" }] },
        { "description": "見開一歌去", "characters": [{ "character": "甲" }] },
        { "description": "匣開二庚平", "characters": [{ "character": "乙" }] }
    ]
}"#;

fn registry(schemas: &[(&str, &str)]) -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    for (name, code) in schemas {
        registry.insert(Schema::new(*name, ScriptSource::from(*code)), PackedValues::new());
    }
    registry
}

fn text(text: &str) -> Vec<ResultNode> {
    vec![ResultNode::Text(text.to_owned())]
}

/// 38 initials x 26 rhymes x 4 tones, truncated to `size` records.
fn synthetic_domain(size: usize) -> TableDomain {
    let initials = (0..38).map(|index| char::from_u32(0x5000 + index).unwrap());
    let records = initials
        .flat_map(|initial| {
            (0..26).flat_map(move |rhyme| {
                ['平', '上', '去', '入'].map(|tone| {
                    let rhyme = char::from_u32(0x6000 + rhyme).unwrap();
                    format!("{initial}一{rhyme}{tone}")
                })
            })
        })
        .take(size)
        .map(|description| RecordRow {
            description: description.parse().unwrap(),
            characters: vec![EntryRow {
                character: description.chars().next().unwrap(),
                gloss: None,
            }],
        })
        .collect();
    TableDomain::from_table(DomainTable {
        records,
        ..DomainTable::default()
    })
    .unwrap()
}

#[test]
fn constant_schema_over_full_domain() {
    let domain = synthetic_domain(3900);
    assert_eq!(domain.len(), 3900);
    let registry = registry(&[("constant", "'a'")]);
    let config = EngineConfig::default();
    let resolver = Resolver::new(&registry, &domain, &config);

    assert_eq!(export_unique(&resolver).unwrap(), vec![vec![text("a")]]);
    let counts = export_with_count(&resolver).unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].outputs, vec![text("a")]);
    assert_eq!(counts[0].count, 3900);
}

#[test]
fn export_is_deterministic() {
    let domain = synthetic_domain(400);
    let registry = registry(&[
        ("tone", "record.tone"),
        ("initial", "record.initial + record.rhyme"),
    ]);
    let config = EngineConfig::default();
    let resolver = Resolver::new(&registry, &domain, &config);

    let first = export_all(&resolver).unwrap();
    let second = export_all(&resolver).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 400);

    let counts = export_with_count(&resolver).unwrap();
    assert_eq!(counts.iter().map(|count| count.count).sum::<usize>(), 400);
    assert!(counts.windows(2).all(|pair| pair[0].count >= pair[1].count));
}

#[test]
fn count_ties_keep_first_occurrence() {
    // 100 records of each tone, met in the order 平 上 去 入
    let domain = synthetic_domain(400);
    let registry = registry(&[("tone", "record.tone")]);
    let config = EngineConfig::default();
    let resolver = Resolver::new(&registry, &domain, &config);

    let counts = export_with_count(&resolver).unwrap();
    let order = counts
        .iter()
        .map(|count| (count.outputs[0][0].plain_text(), count.count))
        .collect::<Vec<_>>();
    assert_eq!(
        order,
        [
            ("平".to_owned(), 100),
            ("上".to_owned(), 100),
            ("去".to_owned(), 100),
            ("入".to_owned(), 100),
        ]
    );
}

#[test]
fn legacy_option_normalizes_the_record() {
    let domain = TableDomain::from_json(
        r#"{
            "groups": {
                "脣音": "幫滂並明母",
                "開合中立韻": "東冬鍾江虞模尤幽韻",
                "重紐韻": "支脂祭眞仙宵侵鹽韻"
            },
            "records": [
                { "description": "幫開三A支平", "characters": [{ "character": "卑" }] },
                { "description": "見合一模平", "characters": [{ "character": "孤" }] },
                { "description": "見開一歌平", "characters": [{ "character": "歌" }] }
            ]
        }"#,
    )
    .unwrap();
    let config = EngineConfig::default();
    let mut registry = SchemaRegistry::new();
    registry.insert(
        Schema::new("plain", ScriptSource::from("record.description")),
        PackedValues::new(),
    );
    registry.insert(
        Schema::new("legacy", ScriptSource::from("record.description")),
        PackedValues::from_iter([(LEGACY_KEY.to_owned(), ParameterValue::Bool(true))]),
    );
    let resolver = Resolver::new(&registry, &domain, &config);

    let rows = export_all(&resolver).unwrap();
    let descriptions = rows
        .iter()
        .map(|row| (plain_text_of(&row.outputs[0]), plain_text_of(&row.outputs[1])))
        .collect::<Vec<_>>();
    assert_eq!(
        descriptions,
        [
            ("幫開三A支平".to_owned(), "幫三A支平".to_owned()),
            ("見合一模平".to_owned(), "見一模平".to_owned()),
            ("見開一歌平".to_owned(), "見開一歌平".to_owned()),
        ]
    );
}

fn plain_text_of(nodes: &[ResultNode]) -> String {
    nodes.iter().map(ResultNode::plain_text).collect()
}

#[test]
fn variants_widen_the_candidates() {
    let domain = TableDomain::from_json(
        r#"{
            "records": [
                { "description": "見開一歌平", "characters": [{ "character": "箇" }] },
                { "description": "見開一歌去", "characters": [{ "character": "個" }] },
                { "description": "匣開二庚平", "characters": [{ "character": "峰" }] }
            ],
            "variants": { "箇": "個", "峯": "峰" }
        }"#,
    )
    .unwrap();
    let registry = registry(&[("head", "head")]);
    let config = EngineConfig::default();
    let resolver = Resolver::new(&registry, &domain, &config);
    let article = |text: &str, convert_variants: bool| {
        let options = EvaluationOptions {
            convert_variants,
            ..EvaluationOptions::default()
        };
        match evaluate(&resolver, text, &options).unwrap() {
            EvaluationOutput::Article(article) => article,
            other => panic!("expected an article, got {other:?}"),
        }
    };

    assert_eq!(article("箇個峯", false).plain_text(), "箇(箇)個(個)峯");
    // the character's own readings come first and the first is selected
    assert_eq!(article("箇個峯", true).plain_text(), "箇(箇|個)個(個|箇)峯(峰)");

    let annotated = article("箇(見開一歌去)", true);
    let ArticleSegment::Character { groups, selected, .. } = &annotated.segments[0] else {
        panic!("expected a character");
    };
    assert_eq!(groups.len(), 2);
    assert_eq!(*selected, 1);
    assert_eq!(groups[1].candidates[0].character, '個');
}

#[test]
fn article_annotation_preselects_reading() {
    let domain = TableDomain::from_json(DOMAIN).unwrap();
    let registry = registry(&[("desc", "record.description")]);
    let config = EngineConfig::default();
    let resolver = Resolver::new(&registry, &domain, &config);

    let options = EvaluationOptions::default();
    let EvaluationOutput::Article(article) =
        evaluate(&resolver, "甲(見開一歌去)乙，", &options).unwrap()
    else {
        panic!("expected an article");
    };
    assert_eq!(article.segments.len(), 3);
    let ArticleSegment::Character { groups, selected, .. } = &article.segments[0] else {
        panic!("expected a character");
    };
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[*selected].outputs, vec![text("見開一歌去")]);
    assert_eq!(article.plain_text(), "甲(見開一歌去|見開一歌平)乙(匣開二庚平)，");
}

#[test]
fn article_annotation_outside_domain_is_added() {
    let domain = TableDomain::from_json(DOMAIN).unwrap();
    let registry = registry(&[("desc", "record.description")]);
    let config = EngineConfig::default();
    let resolver = Resolver::new(&registry, &domain, &config);

    let EvaluationOutput::Article(article) =
        evaluate(&resolver, "賓(明三A眞平)", &EvaluationOptions::default()).unwrap()
    else {
        panic!("expected an article");
    };
    let ArticleSegment::Character { groups, selected, .. } = &article.segments[0] else {
        panic!("expected a character");
    };
    assert_eq!(groups.len(), 2);
    assert_eq!(*selected, 1);
}

#[test]
fn identical_readings_are_grouped() {
    let domain = TableDomain::from_json(DOMAIN).unwrap();
    let registry = registry(&[("initial", "record.initial")]);
    let config = EngineConfig::default();
    let resolver = Resolver::new(&registry, &domain, &config);

    let EvaluationOutput::Article(article) =
        evaluate(&resolver, "甲", &EvaluationOptions::default()).unwrap()
    else {
        panic!("expected an article");
    };
    let ArticleSegment::Character { groups, .. } = &article.segments[0] else {
        panic!("expected a character");
    };
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].candidates.len(), 2);
}

#[test]
fn require_derives_another_schema() {
    let domain = TableDomain::from_json(DOMAIN).unwrap();
    let registry = registry(&[
        ("base", "record.initial"),
        (
            "wrapped",
            "Format/bold(children: Require/schema(require, name: 'base') |> Require/derive(record: record))",
        ),
        (
            "labial",
            "Record/is(record: record, expr: '脣音') |> WHEN { True => 'P', __ => '-' }",
        ),
    ]);
    let config = EngineConfig::default();
    let resolver = Resolver::new(&registry, &domain, &config);
    let rows = export_all(&resolver).unwrap();
    assert_eq!(rows[0].outputs[0], text("幫"));
    assert_eq!(
        rows[0].outputs[1],
        vec![ResultNode::Element {
            tag: Tag::Bold,
            prop: None,
            children: text("幫"),
        }]
    );
    assert_eq!(rows[0].outputs[2], text("P"));
    assert_eq!(rows[1].outputs[2], text("-"));
}

#[test]
fn derivation_error_aborts_the_pass() {
    let domain = TableDomain::from_json(DOMAIN).unwrap();
    let registry = registry(&[
        ("fine", "'ok'"),
        ("picky", "record.tone |> WHEN { '平' => 'level' }"),
    ]);
    let config = EngineConfig::default();
    let resolver = Resolver::new(&registry, &domain, &config);
    let error = export_all(&resolver).unwrap_err();
    let EngineError::Derivation { schema, context, .. } = &error else {
        panic!("expected a derivation error, got {error:?}");
    };
    assert_eq!(schema, "picky");
    assert_eq!(context.record.description(), "見開一歌去");
}

#[test]
fn null_result_is_reported() {
    let domain = TableDomain::from_json(DOMAIN).unwrap();
    let registry = registry(&[("nothing", "x: 1")]);
    let config = EngineConfig::default();
    let resolver = Resolver::new(&registry, &domain, &config);
    assert!(matches!(
        export_all(&resolver),
        Err(EngineError::NoResult { .. })
    ));
}

#[test]
fn compare_reports_differences() {
    let domain = TableDomain::from_json(DOMAIN).unwrap();
    let config = EngineConfig::default();

    let same = registry(&[("a", "record.initial"), ("b", "record.initial")]);
    let resolver = Resolver::new(&same, &domain, &config);
    let options = EvaluationOptions {
        operation: Operation::Compare,
        ..EvaluationOptions::default()
    };
    let EvaluationOutput::Compare(comparison) = evaluate(&resolver, "", &options).unwrap() else {
        panic!("expected a comparison");
    };
    assert_eq!(comparison.summary, ComparisonSummary::AllIdentical);

    let different = registry(&[("a", "record.initial"), ("b", "record.tone")]);
    let resolver = Resolver::new(&different, &domain, &config);
    let EvaluationOutput::Compare(comparison) = evaluate(&resolver, "", &options).unwrap() else {
        panic!("expected a comparison");
    };
    assert_eq!(comparison.summary, ComparisonSummary::Differing(4));
    assert_eq!(comparison.rows.len(), 4);
}
