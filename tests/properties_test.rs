use jsonschema_template::resolver::null_resolver;
use jsonschema_template::{
    evaluate, from_json, to_json, Compiler, CompilerConfig, CompilerMode, ErrorTraceOutput,
    EvaluationMode, Template,
};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn instance() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-20i64..20).prop_map(|n| json!(n)),
        (-200i64..200).prop_map(|n| json!(n as f64 / 8.0)),
        "[a-c]{0,4}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-c]", inner, 0..4)
                .prop_map(|members| Value::Object(members.into_iter().collect())),
        ]
    })
}

fn keyword() -> impl Strategy<Value = (String, Value)> {
    let types = prop::sample::select(vec![
        "null", "boolean", "integer", "number", "string", "array", "object",
    ]);

    prop_oneof![
        types.prop_map(|name| ("type".to_owned(), json!(name))),
        (-5i64..5).prop_map(|n| ("minimum".to_owned(), json!(n))),
        (-5i64..5).prop_map(|n| ("exclusiveMaximum".to_owned(), json!(n))),
        (1i64..4).prop_map(|n| ("multipleOf".to_owned(), json!(n as f64 / 2.0))),
        (0usize..3).prop_map(|n| ("maxLength".to_owned(), json!(n))),
        (0usize..3).prop_map(|n| ("minItems".to_owned(), json!(n))),
        (0usize..3).prop_map(|n| ("maxProperties".to_owned(), json!(n))),
        prop::collection::btree_set("[a-c]", 1..3)
            .prop_map(|names| ("required".to_owned(), json!(names))),
        Just(("uniqueItems".to_owned(), json!(true))),
        Just(("pattern".to_owned(), json!("^a"))),
        Just(("enum".to_owned(), json!([1, "a", null, [1]]))),
    ]
}

fn schema() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(json!(true)),
        Just(json!(false)),
        prop::collection::vec(keyword(), 1..4)
            .prop_map(|keywords| Value::Object(keywords.into_iter().collect())),
    ];
    leaf.prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            prop::collection::btree_map("[a-c]", inner.clone(), 1..3)
                .prop_map(|members| json!({"properties": members})),
            (inner.clone(), any::<bool>())
                .prop_map(|(items, closed)| json!({"items": items, "unevaluatedItems": !closed})),
            prop::collection::vec(inner.clone(), 1..3).prop_map(|branches| json!({"anyOf": branches})),
            prop::collection::vec(inner.clone(), 1..3).prop_map(|branches| json!({"oneOf": branches})),
            inner.clone().prop_map(|schema| json!({"not": schema})),
            (inner.clone(), inner.clone())
                .prop_map(|(condition, then)| json!({"if": condition, "then": then})),
            inner.clone().prop_map(|schema| json!({
                "allOf": [schema],
                "properties": {"a": {"$ref": "#"}},
                "unevaluatedProperties": false
            })),
            (inner.clone(), inner)
                .prop_map(|(contains, items)| json!({"contains": contains, "prefixItems": [items]})),
        ]
    })
}

fn compile(schema: &Value, mode: CompilerMode) -> Template {
    let mut config = CompilerConfig::new();
    config
        .mode(mode)
        .default_dialect(Some("https://json-schema.org/draft/2020-12/schema".to_owned()));
    Compiler::new_with_config(config)
        .compile(schema, &null_resolver)
        .expect("generated schemas compile")
}

fn trace(template: &Template, instance: &Value, mode: EvaluationMode) -> bool {
    let mut output = ErrorTraceOutput::new(instance);
    output.evaluate(template, mode)
}

proptest! {
    /// Every mode of compilation and evaluation agrees on the outcome.
    #[test]
    fn modes_agree(schema in schema(), instance in instance()) {
        let optimized = compile(&schema, CompilerMode::Optimized);
        let full = compile(&schema, CompilerMode::Full);

        let expected = evaluate(&full, &instance);
        prop_assert_eq!(expected, evaluate(&optimized, &instance));
        prop_assert_eq!(expected, trace(&optimized, &instance, EvaluationMode::Exhaustive));
        prop_assert_eq!(expected, trace(&full, &instance, EvaluationMode::Fast));
        prop_assert_eq!(expected, trace(&full, &instance, EvaluationMode::Exhaustive));
    }

    /// Decoded templates are the templates that were encoded.
    #[test]
    fn encoding_is_lossless(schema in schema(), instance in instance()) {
        for mode in &[CompilerMode::Optimized, CompilerMode::Full] {
            let template = compile(&schema, *mode);
            let decoded = to_json(&template).and_then(|encoded| from_json(&encoded));
            prop_assert!(decoded.is_ok(), "{:?}", decoded.err());
            let decoded = decoded.unwrap_or_default();
            prop_assert_eq!(evaluate(&template, &instance), evaluate(&decoded, &instance));
            prop_assert_eq!(template, decoded);
        }
    }

    /// The true schema accepts everything, and the false schema nothing.
    #[test]
    fn boolean_schemas(instance in instance()) {
        prop_assert!(evaluate(&compile(&json!(true), CompilerMode::Optimized), &instance));
        prop_assert!(!evaluate(&compile(&json!(false), CompilerMode::Optimized), &instance));
    }

    /// Schemas referring to themselves terminate on any instance.
    #[test]
    fn cycles_terminate(instance in instance()) {
        let schemas = vec![
            json!({"$ref": "#"}),
            json!({"$defs": {"a": {"$ref": "#/$defs/b"}, "b": {"$ref": "#/$defs/a"}}, "$ref": "#/$defs/a"}),
            json!({"items": {"$ref": "#"}, "additionalProperties": {"$ref": "#"}}),
        ];

        for schema in &schemas {
            for mode in &[CompilerMode::Optimized, CompilerMode::Full] {
                prop_assert!(evaluate(&compile(schema, *mode), &instance));
            }
        }
    }

    /// Negating a schema flips the outcome.
    #[test]
    fn negation(schema in schema(), instance in instance()) {
        // Wrapping moves the root that `#` refers to.
        prop_assume!(!schema.to_string().contains("$ref"));

        let mut negated = Map::new();
        negated.insert("not".to_owned(), schema.clone());

        let positive = evaluate(&compile(&schema, CompilerMode::Optimized), &instance);
        let negative = evaluate(&compile(&Value::Object(negated), CompilerMode::Optimized), &instance);
        prop_assert_ne!(positive, negative);
    }
}
