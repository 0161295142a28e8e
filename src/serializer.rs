//! A JSON encoding of templates.
//!
//! Every instruction becomes an object:
//!
//! ```json
//! {
//!   "category": "logical",
//!   "type": "when-type",
//!   "relativeSchemaLocation": "/properties",
//!   "relativeInstanceLocation": "",
//!   "absoluteKeywordLocation": "#/properties",
//!   "schemaResource": "",
//!   "dynamic": false,
//!   "report": true,
//!   "value": "object",
//!   "children": []
//! }
//! ```
//!
//! Only steps with children carry the `children` key. The shape of `value`
//! depends on the step, and is `null` for steps without a payload.

use crate::decimal::Decimal;
use crate::errors::SchemaError;
use crate::json::JsonType;
use crate::pointer::Pointer;
use crate::template::{ItemsEvaluation, Instruction, Pattern, Range, Step, Template};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::mem;

/// The keys of an encoded instruction, in the order they are printed.
const KEYS: &[&str] = &[
    "category",
    "type",
    "relativeSchemaLocation",
    "relativeInstanceLocation",
    "absoluteKeywordLocation",
    "schemaResource",
    "dynamic",
    "report",
    "value",
    "children",
];

#[derive(Debug, PartialEq, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct SerdeInstruction {
    category: String,

    #[serde(rename = "type")]
    typ: String,

    relative_schema_location: String,
    relative_instance_location: String,

    #[serde(rename = "absoluteKeywordLocation")]
    keyword_location: String,

    schema_resource: String,
    dynamic: bool,
    report: bool,

    #[serde(default)]
    value: Value,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    children: Option<Vec<SerdeInstruction>>,
}

/// Encodes a template as JSON.
pub fn to_json(template: &Template) -> Result<Value, SchemaError> {
    let instructions: Vec<SerdeInstruction> = template.iter().map(to_serde).collect();
    serde_json::to_value(instructions).map_err(|err| SchemaError::template(err.to_string()))
}

/// Decodes a template encoded with [`to_json`](fn.to_json.html).
pub fn from_json(value: &Value) -> Result<Template, SchemaError> {
    let instructions: Vec<SerdeInstruction> = serde_json::from_value(value.clone())
        .map_err(|err| SchemaError::template(err.to_string()))?;
    instructions.into_iter().map(from_serde).collect()
}

/// Whether the key `left` is printed before the key `right` in an encoded
/// template. Instruction keys come first, in a fixed order, and any other
/// key comes after them in alphabetical order.
pub fn compiler_template_format_compare(left: &str, right: &str) -> bool {
    key_order(left, right) == Ordering::Less
}

fn key_order(left: &str, right: &str) -> Ordering {
    let rank = |key: &str| KEYS.iter().position(|known| *known == key);
    match (rank(left), rank(right)) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => left.cmp(right),
    }
}

/// Reorders the keys of every object in `value`, recursively, the way
/// [`compiler_template_format_compare`](fn.compiler_template_format_compare.html)
/// orders them.
pub fn sort_template_keys(value: &mut Value) {
    match value {
        Value::Array(items) => items.iter_mut().for_each(sort_template_keys),
        Value::Object(members) => {
            let mut entries: Vec<(String, Value)> = mem::take(members).into_iter().collect();
            entries.sort_by(|(left, _), (right, _)| key_order(left, right));

            for (key, mut member) in entries {
                sort_template_keys(&mut member);
                members.insert(key, member);
            }
        }
        _ => {}
    }
}

fn to_serde(instruction: &Instruction) -> SerdeInstruction {
    SerdeInstruction {
        category: instruction.step.category().name().to_owned(),
        typ: instruction.step.name().to_owned(),
        relative_schema_location: instruction.relative_schema_location.to_string(),
        relative_instance_location: instruction.relative_instance_location.to_string(),
        keyword_location: instruction.keyword_location.clone(),
        schema_resource: instruction.schema_resource.clone(),
        dynamic: instruction.dynamic,
        report: instruction.report,
        value: encode_value(&instruction.step),
        children: instruction
            .step
            .children()
            .map(|children| children.iter().map(to_serde).collect()),
    }
}

fn types(types: &BTreeSet<JsonType>) -> Value {
    types.iter().map(|json_type| json!(json_type.name())).collect()
}

fn range(range: &Range) -> Value {
    json!([range.minimum, range.maximum, range.exhaustive])
}

fn encode_value(step: &Step) -> Value {
    use Step::*;

    match step {
        AssertionDefines(property) => json!(property),
        AssertionDefinesAll(properties) => json!(properties),
        AssertionType(json_type) | AssertionTypeStrict(json_type) => json!(json_type.name()),
        AssertionTypeAny(json_types) | AssertionTypeStrictAny(json_types) => types(json_types),
        AssertionTypeStringBounded(bounds)
        | AssertionTypeArrayBounded(bounds)
        | AssertionTypeObjectBounded(bounds) => range(bounds),
        AssertionRegex(pattern) => json!(pattern.source()),
        AssertionStringSizeLess(size)
        | AssertionStringSizeGreater(size)
        | AssertionArraySizeLess(size)
        | AssertionArraySizeGreater(size)
        | AssertionObjectSizeLess(size)
        | AssertionObjectSizeGreater(size) => json!(size),
        AssertionEqual(value) => value.clone(),
        AssertionEqualsAny(values) => Value::Array(values.clone()),
        AssertionGreaterEqual(number)
        | AssertionLessEqual(number)
        | AssertionGreater(number)
        | AssertionLess(number)
        | AssertionDivisible(number) => number.to_value(),
        AnnotationEmit(value) | AnnotationToParent(value) => value.clone(),
        LogicalOr { exhaustive, .. } => json!(exhaustive),
        LogicalTryMark { id, .. }
        | LogicalWhenAdjacentMarked { id, .. }
        | LogicalWhenAdjacentUnmarked { id, .. }
        | ControlLabel { id, .. }
        | ControlMark { id, .. }
        | ControlJump { id } => json!(id),
        LogicalWhenType { value, .. } => json!(value.name()),
        LogicalWhenDefines { property, .. } => json!(property),
        LogicalWhenArraySizeGreater { size, .. } | LogicalWhenArraySizeEqual { size, .. } => {
            json!(size)
        }
        LoopPropertiesMatch { index, .. } => json!(index),
        LoopPropertiesRegex { pattern, .. } => json!(pattern.source()),
        LoopPropertiesNoAdjacentAnnotation { keywords, .. }
        | LoopPropertiesNoAnnotation { keywords, .. }
        | LoopItemsUnmarked { keywords, .. } => json!(keywords),
        LoopItems { start, .. } => json!(start),
        LoopItemsUnevaluated { evaluation, .. } => json!({
            "index": evaluation.index,
            "mask": evaluation.mask,
            "filter": evaluation.filter,
        }),
        LoopContains { range: bounds, .. } => range(bounds),
        ControlDynamicAnchorJump { anchor } => json!(anchor),
        AssertionFail
        | AssertionUnique
        | AnnotationBasenameToParent
        | LogicalAnd { .. }
        | LogicalXor { .. }
        | LogicalNot { .. }
        | LoopProperties { .. }
        | LoopKeys { .. } => Value::Null,
    }
}

fn from_serde(instruction: SerdeInstruction) -> Result<Instruction, SchemaError> {
    let children = match instruction.children {
        Some(children) => children
            .into_iter()
            .map(from_serde)
            .collect::<Result<Template, SchemaError>>()?,
        None => Vec::new(),
    };

    let step = decode_step(&instruction.typ, &instruction.value, children)?;
    if step.category().name() != instruction.category {
        return Err(SchemaError::template(format!(
            "step {} is not in category {}",
            instruction.typ, instruction.category
        )));
    }

    Ok(Instruction {
        step,
        relative_schema_location: Pointer::parse(&instruction.relative_schema_location)?,
        relative_instance_location: Pointer::parse(&instruction.relative_instance_location)?,
        keyword_location: instruction.keyword_location,
        schema_resource: instruction.schema_resource,
        dynamic: instruction.dynamic,
        report: instruction.report,
    })
}

/// Reads the payload of a step, naming the step in the error.
struct Payload<'a> {
    name: &'a str,
    value: &'a Value,
}

impl<'a> Payload<'a> {
    fn invalid(&self) -> SchemaError {
        SchemaError::template(format!("invalid value for {}: {}", self.name, self.value))
    }

    fn string(&self) -> Result<String, SchemaError> {
        self.value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| self.invalid())
    }

    fn strings(&self) -> Result<Vec<String>, SchemaError> {
        self.value
            .as_array()
            .ok_or_else(|| self.invalid())?
            .iter()
            .map(|item| item.as_str().map(str::to_owned).ok_or_else(|| self.invalid()))
            .collect()
    }

    fn size(&self) -> Result<usize, SchemaError> {
        as_size(self.value).ok_or_else(|| self.invalid())
    }

    fn id(&self) -> Result<u64, SchemaError> {
        self.value.as_u64().ok_or_else(|| self.invalid())
    }

    fn boolean(&self) -> Result<bool, SchemaError> {
        self.value.as_bool().ok_or_else(|| self.invalid())
    }

    fn json_type(&self) -> Result<JsonType, SchemaError> {
        self.value
            .as_str()
            .and_then(JsonType::from_name)
            .ok_or_else(|| self.invalid())
    }

    fn json_types(&self) -> Result<BTreeSet<JsonType>, SchemaError> {
        self.strings()?
            .iter()
            .map(|name| JsonType::from_name(name).ok_or_else(|| self.invalid()))
            .collect()
    }

    fn range(&self) -> Result<Range, SchemaError> {
        match self.value.as_array().map(Vec::as_slice) {
            Some([minimum, maximum, Value::Bool(exhaustive)]) => Ok(Range {
                minimum: as_size(minimum).ok_or_else(|| self.invalid())?,
                maximum: match maximum {
                    Value::Null => None,
                    maximum => Some(as_size(maximum).ok_or_else(|| self.invalid())?),
                },
                exhaustive: *exhaustive,
            }),
            _ => Err(self.invalid()),
        }
    }

    fn pattern(&self) -> Result<Pattern, SchemaError> {
        Pattern::new(&self.string()?).map_err(|err| {
            SchemaError::template(format!("invalid pattern for {}: {}", self.name, err))
        })
    }

    fn number(&self) -> Result<Decimal, SchemaError> {
        Decimal::from_value(self.value).ok_or_else(|| self.invalid())
    }

    fn index(&self) -> Result<BTreeMap<String, usize>, SchemaError> {
        self.value
            .as_object()
            .ok_or_else(|| self.invalid())?
            .iter()
            .map(|(name, position)| {
                as_size(position)
                    .map(|position| (name.clone(), position))
                    .ok_or_else(|| self.invalid())
            })
            .collect()
    }

    fn evaluation(&self) -> Result<ItemsEvaluation, SchemaError> {
        let keywords = |key: &str| -> Result<Vec<String>, SchemaError> {
            let value = self.value.get(key).ok_or_else(|| self.invalid())?;
            Payload {
                name: self.name,
                value,
            }
            .strings()
        };

        Ok(ItemsEvaluation {
            index: keywords("index")?,
            mask: keywords("mask")?,
            filter: keywords("filter")?,
        })
    }
}

fn as_size(value: &Value) -> Option<usize> {
    value.as_u64().and_then(|size| {
        if size <= usize::max_value() as u64 {
            Some(size as usize)
        } else {
            None
        }
    })
}

fn decode_step(name: &str, value: &Value, children: Template) -> Result<Step, SchemaError> {
    use Step::*;

    let payload = Payload { name, value };
    let step = match name {
        "fail" => AssertionFail,
        "defines" => AssertionDefines(payload.string()?),
        "defines-all" => AssertionDefinesAll(payload.strings()?.into_iter().collect()),
        "type" => AssertionType(payload.json_type()?),
        "type-any" => AssertionTypeAny(payload.json_types()?),
        "type-strict" => AssertionTypeStrict(payload.json_type()?),
        "type-strict-any" => AssertionTypeStrictAny(payload.json_types()?),
        "type-string-bounded" => AssertionTypeStringBounded(payload.range()?),
        "type-array-bounded" => AssertionTypeArrayBounded(payload.range()?),
        "type-object-bounded" => AssertionTypeObjectBounded(payload.range()?),
        "regex" => AssertionRegex(payload.pattern()?),
        "string-size-less" => AssertionStringSizeLess(payload.size()?),
        "string-size-greater" => AssertionStringSizeGreater(payload.size()?),
        "array-size-less" => AssertionArraySizeLess(payload.size()?),
        "array-size-greater" => AssertionArraySizeGreater(payload.size()?),
        "object-size-less" => AssertionObjectSizeLess(payload.size()?),
        "object-size-greater" => AssertionObjectSizeGreater(payload.size()?),
        "equal" => AssertionEqual(value.clone()),
        "equals-any" => AssertionEqualsAny(value.as_array().cloned().ok_or_else(|| payload.invalid())?),
        "greater-equal" => AssertionGreaterEqual(payload.number()?),
        "less-equal" => AssertionLessEqual(payload.number()?),
        "greater" => AssertionGreater(payload.number()?),
        "less" => AssertionLess(payload.number()?),
        "unique" => AssertionUnique,
        "divisible" => AssertionDivisible(payload.number()?),
        "emit" => AnnotationEmit(value.clone()),
        "to-parent" => AnnotationToParent(value.clone()),
        "basename-to-parent" => AnnotationBasenameToParent,
        "or" => LogicalOr {
            exhaustive: payload.boolean()?,
            children,
        },
        "and" => LogicalAnd { children },
        "xor" => LogicalXor { children },
        "not" => LogicalNot { children },
        "try-mark" => LogicalTryMark {
            id: payload.id()?,
            children,
        },
        "when-type" => LogicalWhenType {
            value: payload.json_type()?,
            children,
        },
        "when-defines" => LogicalWhenDefines {
            property: payload.string()?,
            children,
        },
        "when-adjacent-marked" => LogicalWhenAdjacentMarked {
            id: payload.id()?,
            children,
        },
        "when-adjacent-unmarked" => LogicalWhenAdjacentUnmarked {
            id: payload.id()?,
            children,
        },
        "when-array-size-greater" => LogicalWhenArraySizeGreater {
            size: payload.size()?,
            children,
        },
        "when-array-size-equal" => LogicalWhenArraySizeEqual {
            size: payload.size()?,
            children,
        },
        "properties" => LoopProperties { children },
        "properties-match" => LoopPropertiesMatch {
            index: payload.index()?,
            children,
        },
        "properties-regex" => LoopPropertiesRegex {
            pattern: payload.pattern()?,
            children,
        },
        "properties-no-adjacent-annotation" => LoopPropertiesNoAdjacentAnnotation {
            keywords: payload.strings()?,
            children,
        },
        "properties-no-annotation" => LoopPropertiesNoAnnotation {
            keywords: payload.strings()?,
            children,
        },
        "keys" => LoopKeys { children },
        "items" => LoopItems {
            start: payload.size()?,
            children,
        },
        "items-unmarked" => LoopItemsUnmarked {
            keywords: payload.strings()?,
            children,
        },
        "items-unevaluated" => LoopItemsUnevaluated {
            evaluation: payload.evaluation()?,
            children,
        },
        "contains" => LoopContains {
            range: payload.range()?,
            children,
        },
        "label" => ControlLabel {
            id: payload.id()?,
            children,
        },
        "mark" => ControlMark {
            id: payload.id()?,
            children,
        },
        "jump" => ControlJump { id: payload.id()? },
        "dynamic-anchor-jump" => ControlDynamicAnchorJump {
            anchor: payload.string()?,
        },
        _ => return Err(SchemaError::template(format!("unknown step: {}", name))),
    };

    Ok(step)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compiler::{Compiler, CompilerMode, Config};
    use crate::evaluator::evaluate;
    use crate::resolver::null_resolver;
    use failure::Error;
    use pretty_assertions::assert_eq;

    fn compile(mode: CompilerMode, schema: Value) -> Result<Template, Error> {
        let mut config = Config::new();
        config
            .mode(mode)
            .default_dialect(Some("https://json-schema.org/draft/2020-12/schema".to_owned()));
        Ok(Compiler::new_with_config(config).compile(&schema, &null_resolver)?)
    }

    #[test]
    fn encodes_instructions() -> Result<(), Error> {
        let template = compile(CompilerMode::Full, json!({"type": "string"}))?;
        assert_eq!(
            json!([{
                "category": "assertion",
                "type": "type",
                "relativeSchemaLocation": "/type",
                "relativeInstanceLocation": "",
                "absoluteKeywordLocation": "#/type",
                "schemaResource": "",
                "dynamic": false,
                "report": true,
                "value": "string"
            }]),
            to_json(&template)?
        );
        Ok(())
    }

    #[test]
    fn key_order() -> Result<(), Error> {
        let template = compile(
            CompilerMode::Full,
            json!({"properties": {"foo": {"minimum": 1}}}),
        )?;
        let encoded = to_json(&template)?;
        let keys: Vec<&str> = encoded[0]
            .as_object()
            .map(|members| members.keys().map(String::as_str).collect())
            .unwrap_or_default();
        assert_eq!(KEYS.to_vec(), keys);

        assert!(compiler_template_format_compare("category", "type"));
        assert!(compiler_template_format_compare("value", "children"));
        assert!(compiler_template_format_compare("children", "alpha"));
        assert!(compiler_template_format_compare("alpha", "beta"));
        assert!(!compiler_template_format_compare("beta", "alpha"));
        assert!(!compiler_template_format_compare("type", "type"));
        Ok(())
    }

    #[test]
    fn sorts_keys() {
        let mut value = json!([{
            "zeta": 1,
            "children": [{"value": null, "type": "fail", "category": "assertion"}],
            "alpha": 2,
            "category": "logical"
        }]);
        sort_template_keys(&mut value);

        assert_eq!(
            r#"[{"category":"logical","children":[{"category":"assertion","type":"fail","value":null}],"alpha":2,"zeta":1}]"#,
            value.to_string()
        );
    }

    #[test]
    fn decodes_what_it_encodes() -> Result<(), Error> {
        let schemas = vec![
            json!({
                "type": "object",
                "properties": {"a": {"pattern": "^x"}, "b": {"multipleOf": 0.1}},
                "patternProperties": {"^c": {"enum": [1, "1", null]}},
                "unevaluatedProperties": false
            }),
            json!({
                "$defs": {"node": {"type": "array", "items": {"$ref": "#/$defs/node"}}},
                "$ref": "#/$defs/node",
                "contains": {"const": 1},
                "maxContains": 2,
                "unevaluatedItems": false
            }),
            json!({"if": {"required": ["a"]}, "then": {"minProperties": 2}, "else": false}),
        ];

        for schema in schemas {
            for mode in &[CompilerMode::Optimized, CompilerMode::Full] {
                let template = compile(*mode, schema.clone())?;
                assert_eq!(template, from_json(&to_json(&template)?)?);
            }
        }
        Ok(())
    }

    #[test]
    fn numbers_keep_every_digit() -> Result<(), Error> {
        let schema: Value =
            serde_json::from_str(r#"{"maximum": 1e99999999999, "multipleOf": 0.10000000000000000001}"#)?;
        let template = compile(CompilerMode::Optimized, schema)?;
        let encoded = to_json(&template)?;
        assert!(encoded.to_string().contains("1e99999999999"));
        assert_eq!(template, from_json(&encoded)?);
        Ok(())
    }

    #[test]
    fn decoded_templates_evaluate() -> Result<(), Error> {
        let template = compile(CompilerMode::Optimized, json!({"maxLength": 2, "type": "string"}))?;
        let decoded = from_json(&to_json(&template)?)?;
        assert!(evaluate(&decoded, &json!("ab")));
        assert!(!evaluate(&decoded, &json!("abc")));
        Ok(())
    }

    #[test]
    fn invalid_templates() {
        let entry = |typ: &str, value: Value| {
            json!([{
                "category": "assertion",
                "type": typ,
                "relativeSchemaLocation": "",
                "relativeInstanceLocation": "",
                "absoluteKeywordLocation": "#",
                "schemaResource": "",
                "dynamic": false,
                "report": true,
                "value": value
            }])
        };

        assert!(from_json(&json!({})).is_err());
        assert!(from_json(&entry("nope", Value::Null)).is_err());
        assert!(from_json(&entry("regex", json!("("))).is_err());
        assert!(from_json(&entry("string-size-less", json!(-1))).is_err());
        assert!(from_json(&entry("type", json!("nothing"))).is_err());
        assert_eq!(
            Err(SchemaError::template("step and is not in category assertion")),
            from_json(&entry("and", Value::Null))
        );
        assert!(from_json(&entry("fail", Value::Null)).is_ok());
    }
}
