//! Classifying keywords and walking subschemas.
//!
//! The walker knows, for every keyword of every supported dialect, where its
//! subschemas live and which sibling keywords it depends on. Both the frame
//! builder and the compiler rely on it, and hosts can plug in their own to
//! teach the toolkit about custom keywords.

use crate::errors::SchemaError;
use crate::json::JsonType;
use crate::pointer::Pointer;
use crate::resolver::Resolver;
use crate::vocabularies::{self as vocab, Vocabularies};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// The syntactic role of a keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeywordRole {
    /// Checks the instance without descending into subschemas.
    Assertion,
    /// Produces an annotation only.
    Annotation,
    /// A comment, with no effect on evaluation.
    Comment,
    /// Identifiers, anchors and other core plumbing.
    Other,
    /// Follows a reference (`$ref`, `$dynamicRef`, `$recursiveRef`).
    Reference,
    /// Holds subschemas that are only reachable by reference (`$defs`).
    Location,
    /// Holds a single subschema that is not applied to the instance.
    ApplicatorValue,
    /// Holds a single subschema applied to the same instance location.
    ApplicatorValueInPlace,
    /// Holds an array of subschemas applied to the same instance location.
    ApplicatorElementsInPlace,
    /// Holds an object of subschemas applied to the same instance location.
    ApplicatorMembersInPlace,
    /// Holds a single subschema applied to deeper instance locations.
    ApplicatorValueTraverse,
    /// Holds an array of subschemas applied to array items by position.
    ApplicatorElementsTraverse,
    /// Holds an object of subschemas applied to object members.
    ApplicatorMembersTraverse,
    /// Holds either a single subschema or an array of them, applied to array
    /// items (`items` before 2020-12).
    ApplicatorValueOrElementsTraverse,
    /// A keyword the active vocabularies do not define.
    Unknown,
}

impl KeywordRole {
    /// Position in the emission order, before dependencies are considered.
    pub fn priority(self) -> u8 {
        match self {
            KeywordRole::Assertion => 1,
            KeywordRole::Annotation
            | KeywordRole::Comment
            | KeywordRole::Other
            | KeywordRole::Location
            | KeywordRole::Unknown => 2,
            KeywordRole::Reference => 4,
            _ => 3,
        }
    }
}

/// What a walker knows about a keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkerResult {
    pub role: KeywordRole,
    /// Sibling keywords that must be emitted before this one when present.
    pub dependencies: &'static [&'static str],
    /// The instance types the keyword applies to. Empty means all of them.
    pub instances: &'static [JsonType],
}

impl WalkerResult {
    fn new(role: KeywordRole) -> Self {
        Self {
            role,
            dependencies: &[],
            instances: &[],
        }
    }

    fn after(mut self, dependencies: &'static [&'static str]) -> Self {
        self.dependencies = dependencies;
        self
    }

    fn on(mut self, instances: &'static [JsonType]) -> Self {
        self.instances = instances;
        self
    }

    pub fn unknown() -> Self {
        Self::new(KeywordRole::Unknown)
    }

    /// Keywords that narrow the instance type go first.
    fn priority(&self) -> u8 {
        match self.role {
            KeywordRole::Assertion if self.instances.is_empty() => 0,
            role => role.priority(),
        }
    }
}

/// Classifies keywords.
pub trait Walker {
    fn classify(&self, keyword: &str, vocabularies: &Vocabularies, base_dialect: &str)
        -> WalkerResult;
}

impl<F> Walker for F
where
    F: Fn(&str, &Vocabularies, &str) -> WalkerResult,
{
    fn classify(
        &self,
        keyword: &str,
        vocabularies: &Vocabularies,
        base_dialect: &str,
    ) -> WalkerResult {
        self(keyword, vocabularies, base_dialect)
    }
}

const NUMBERS: &[JsonType] = &[JsonType::Integer, JsonType::Real];
const STRINGS: &[JsonType] = &[JsonType::String];
const ARRAYS: &[JsonType] = &[JsonType::Array];
const OBJECTS: &[JsonType] = &[JsonType::Object];

const UNEVALUATED_PROPERTIES_2019_09: &[&str] = &[
    "$ref",
    "$recursiveRef",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
    "if",
    "then",
    "else",
    "dependentSchemas",
    "properties",
    "patternProperties",
    "additionalProperties",
];

const UNEVALUATED_ITEMS_2019_09: &[&str] = &[
    "$ref",
    "$recursiveRef",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
    "if",
    "then",
    "else",
    "items",
    "additionalItems",
    "contains",
];

const UNEVALUATED_PROPERTIES_2020_12: &[&str] = &[
    "$ref",
    "$dynamicRef",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
    "if",
    "then",
    "else",
    "dependentSchemas",
    "properties",
    "patternProperties",
    "additionalProperties",
];

const UNEVALUATED_ITEMS_2020_12: &[&str] = &[
    "$ref",
    "$dynamicRef",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
    "if",
    "then",
    "else",
    "prefixItems",
    "items",
    "contains",
];

fn validation(keyword: &str, base_dialect: &str) -> Option<WalkerResult> {
    use KeywordRole::Assertion;

    let result = match keyword {
        "type" | "enum" => WalkerResult::new(Assertion),
        "const" if base_dialect != vocab::DRAFT4 => WalkerResult::new(Assertion),
        "multipleOf" | "maximum" | "minimum" => WalkerResult::new(Assertion).on(NUMBERS),
        "exclusiveMaximum" => WalkerResult::new(Assertion)
            .on(NUMBERS)
            .after(&["maximum"]),
        "exclusiveMinimum" => WalkerResult::new(Assertion)
            .on(NUMBERS)
            .after(&["minimum"]),
        "maxLength" | "minLength" | "pattern" => WalkerResult::new(Assertion).on(STRINGS),
        "maxItems" | "minItems" | "uniqueItems" => WalkerResult::new(Assertion).on(ARRAYS),
        "maxProperties" | "minProperties" | "required" => {
            WalkerResult::new(Assertion).on(OBJECTS)
        }
        _ => return None,
    };

    Some(result)
}

fn legacy_walker(keyword: &str, base_dialect: &str) -> WalkerResult {
    use KeywordRole::*;

    let draft6 = base_dialect != vocab::DRAFT4;
    let draft7 = base_dialect == vocab::DRAFT7;

    if let Some(result) = validation(keyword, base_dialect) {
        return result;
    }

    match keyword {
        "$ref" => WalkerResult::new(Reference),
        "$schema" => WalkerResult::new(Other),
        "id" if !draft6 => WalkerResult::new(Other),
        "$id" if draft6 => WalkerResult::new(Other),
        "$comment" if draft7 => WalkerResult::new(Comment),
        "definitions" => WalkerResult::new(Location),
        "allOf" | "anyOf" | "oneOf" => WalkerResult::new(ApplicatorElementsInPlace),
        "not" => WalkerResult::new(ApplicatorValueInPlace),
        "if" if draft7 => WalkerResult::new(ApplicatorValueInPlace),
        "then" | "else" if draft7 => WalkerResult::new(ApplicatorValueInPlace).after(&["if"]),
        "items" => WalkerResult::new(ApplicatorValueOrElementsTraverse).on(ARRAYS),
        "additionalItems" => WalkerResult::new(ApplicatorValueTraverse)
            .on(ARRAYS)
            .after(&["items"]),
        "contains" if draft6 => WalkerResult::new(ApplicatorValueTraverse).on(ARRAYS),
        "properties" | "patternProperties" => {
            WalkerResult::new(ApplicatorMembersTraverse).on(OBJECTS)
        }
        "additionalProperties" => WalkerResult::new(ApplicatorValueTraverse)
            .on(OBJECTS)
            .after(&["properties", "patternProperties"]),
        "propertyNames" if draft6 => WalkerResult::new(ApplicatorValueTraverse).on(OBJECTS),
        "dependencies" => WalkerResult::new(ApplicatorMembersInPlace).on(OBJECTS),
        "title" | "description" | "default" | "format" => WalkerResult::new(Annotation),
        "examples" if draft6 => WalkerResult::new(Annotation),
        "readOnly" | "writeOnly" | "contentEncoding" | "contentMediaType" if draft7 => {
            WalkerResult::new(Annotation)
        }
        _ => WalkerResult::unknown(),
    }
}

fn modern_walker(keyword: &str, vocabularies: &Vocabularies, base_dialect: &str) -> WalkerResult {
    use KeywordRole::*;

    let has = |vocabulary: &str| vocabularies.contains_key(vocabulary);
    let draft2020 = base_dialect == vocab::DRAFT2020_12;

    let (core, applicator, unevaluated, validation_vocabulary, meta_data, format, content) =
        if draft2020 {
            (
                has(vocab::VOCABULARY_2020_12_CORE),
                has(vocab::VOCABULARY_2020_12_APPLICATOR),
                has(vocab::VOCABULARY_2020_12_UNEVALUATED),
                has(vocab::VOCABULARY_2020_12_VALIDATION),
                has(vocab::VOCABULARY_2020_12_META_DATA),
                has(vocab::VOCABULARY_2020_12_FORMAT_ANNOTATION)
                    || has(vocab::VOCABULARY_2020_12_FORMAT_ASSERTION),
                has(vocab::VOCABULARY_2020_12_CONTENT),
            )
        } else {
            (
                has(vocab::VOCABULARY_2019_09_CORE),
                has(vocab::VOCABULARY_2019_09_APPLICATOR),
                has(vocab::VOCABULARY_2019_09_APPLICATOR),
                has(vocab::VOCABULARY_2019_09_VALIDATION),
                has(vocab::VOCABULARY_2019_09_META_DATA),
                has(vocab::VOCABULARY_2019_09_FORMAT),
                has(vocab::VOCABULARY_2019_09_CONTENT),
            )
        };

    if core {
        match keyword {
            "$ref" => return WalkerResult::new(Reference),
            "$dynamicRef" if draft2020 => return WalkerResult::new(Reference),
            "$recursiveRef" if !draft2020 => return WalkerResult::new(Reference),
            "$id" | "$schema" | "$anchor" | "$vocabulary" => return WalkerResult::new(Other),
            "$dynamicAnchor" if draft2020 => return WalkerResult::new(Other),
            "$recursiveAnchor" if !draft2020 => return WalkerResult::new(Other),
            "$comment" => return WalkerResult::new(Comment),
            "$defs" => return WalkerResult::new(Location),
            _ => {}
        }
    }

    if applicator {
        let result = match keyword {
            "allOf" | "anyOf" | "oneOf" => Some(WalkerResult::new(ApplicatorElementsInPlace)),
            "not" | "if" => Some(WalkerResult::new(ApplicatorValueInPlace)),
            "then" | "else" => Some(WalkerResult::new(ApplicatorValueInPlace).after(&["if"])),
            "dependentSchemas" => Some(WalkerResult::new(ApplicatorMembersInPlace).on(OBJECTS)),
            "properties" | "patternProperties" => {
                Some(WalkerResult::new(ApplicatorMembersTraverse).on(OBJECTS))
            }
            "additionalProperties" => Some(
                WalkerResult::new(ApplicatorValueTraverse)
                    .on(OBJECTS)
                    .after(&["properties", "patternProperties"]),
            ),
            "propertyNames" => Some(WalkerResult::new(ApplicatorValueTraverse).on(OBJECTS)),
            "contains" => Some(
                WalkerResult::new(ApplicatorValueTraverse)
                    .on(ARRAYS)
                    .after(&["minContains", "maxContains"]),
            ),
            "prefixItems" if draft2020 => {
                Some(WalkerResult::new(ApplicatorElementsTraverse).on(ARRAYS))
            }
            "items" if draft2020 => Some(
                WalkerResult::new(ApplicatorValueTraverse)
                    .on(ARRAYS)
                    .after(&["prefixItems"]),
            ),
            "items" => Some(WalkerResult::new(ApplicatorValueOrElementsTraverse).on(ARRAYS)),
            "additionalItems" if !draft2020 => Some(
                WalkerResult::new(ApplicatorValueTraverse)
                    .on(ARRAYS)
                    .after(&["items"]),
            ),
            _ => None,
        };

        if let Some(result) = result {
            return result;
        }
    }

    if unevaluated {
        match keyword {
            "unevaluatedProperties" => {
                return WalkerResult::new(ApplicatorValueTraverse)
                    .on(OBJECTS)
                    .after(if draft2020 {
                        UNEVALUATED_PROPERTIES_2020_12
                    } else {
                        UNEVALUATED_PROPERTIES_2019_09
                    })
            }
            "unevaluatedItems" => {
                return WalkerResult::new(ApplicatorValueTraverse)
                    .on(ARRAYS)
                    .after(if draft2020 {
                        UNEVALUATED_ITEMS_2020_12
                    } else {
                        UNEVALUATED_ITEMS_2019_09
                    })
            }
            _ => {}
        }
    }

    if validation_vocabulary {
        if let Some(result) = validation(keyword, base_dialect) {
            return result;
        }

        match keyword {
            "maxContains" | "minContains" => {
                return WalkerResult::new(KeywordRole::Assertion).on(ARRAYS)
            }
            "dependentRequired" => return WalkerResult::new(KeywordRole::Assertion).on(OBJECTS),
            _ => {}
        }
    }

    if meta_data {
        match keyword {
            "title" | "description" | "default" | "deprecated" | "readOnly" | "writeOnly"
            | "examples" => return WalkerResult::new(Annotation),
            _ => {}
        }
    }

    if format && keyword == "format" {
        return WalkerResult::new(Annotation);
    }

    if content {
        match keyword {
            "contentEncoding" | "contentMediaType" => return WalkerResult::new(Annotation),
            "contentSchema" => {
                return WalkerResult::new(ApplicatorValue).after(&["contentMediaType"])
            }
            _ => {}
        }
    }

    WalkerResult::unknown()
}

/// The walker for every official dialect.
pub fn default_schema_walker(
    keyword: &str,
    vocabularies: &Vocabularies,
    base_dialect: &str,
) -> WalkerResult {
    if vocab::is_legacy(base_dialect) {
        legacy_walker(keyword, base_dialect)
    } else {
        modern_walker(keyword, vocabularies, base_dialect)
    }
}

/// The keywords of a schema object in emission order.
///
/// Keywords are sorted by role priority first (type narrowing, assertions,
/// annotations, applicators, references) and then moved after any sibling
/// they depend on. Document order breaks ties.
pub fn ordered_keywords<'a>(
    schema: &'a serde_json::Map<String, Value>,
    walker: &dyn Walker,
    vocabularies: &Vocabularies,
    base_dialect: &str,
) -> Vec<(&'a str, WalkerResult)> {
    let mut pending: Vec<(&'a str, WalkerResult)> = schema
        .keys()
        .map(|keyword| {
            let result = walker.classify(keyword, vocabularies, base_dialect);
            (keyword.as_str(), result)
        })
        .collect();
    pending.sort_by_key(|(_, result)| result.priority());

    let mut ordered = Vec::with_capacity(pending.len());
    let mut emitted: HashSet<&'a str> = HashSet::new();
    while !pending.is_empty() {
        let before = pending.len();
        let mut deferred = Vec::new();
        for (keyword, result) in pending.drain(..) {
            let ready = result
                .dependencies
                .iter()
                .all(|dependency| emitted.contains(dependency) || !schema.contains_key(*dependency));

            if ready {
                emitted.insert(keyword);
                ordered.push((keyword, result));
            } else {
                deferred.push((keyword, result));
            }
        }

        if deferred.len() == before {
            ordered.extend(deferred);
            break;
        }

        pending = deferred;
    }

    ordered
}

/// A subschema found while walking a document.
#[derive(Debug, Clone, PartialEq)]
pub struct SubschemaEntry {
    /// The absolute location of the subschema in its document.
    pub pointer: Pointer,
    pub dialect: String,
    pub base_dialect: String,
    pub vocabularies: Vocabularies,
    /// Whether the subschema is only reachable by reference, such as the
    /// members of `$defs`.
    pub orphan: bool,
}

/// Caches dialect lookups, which may hit the resolver.
#[derive(Default)]
pub(crate) struct DialectCache {
    entries: HashMap<String, (String, Vocabularies)>,
}

impl DialectCache {
    pub(crate) fn lookup(
        &mut self,
        dialect: &str,
        resolver: &dyn Resolver,
    ) -> Result<(String, Vocabularies), SchemaError> {
        if let Some(entry) = self.entries.get(dialect) {
            return Ok(entry.clone());
        }

        let base = vocab::base_dialect(dialect, resolver)?;
        let vocabularies = vocab::vocabularies(dialect, resolver)?;
        self.entries
            .insert(dialect.to_owned(), (base.clone(), vocabularies.clone()));
        Ok((base, vocabularies))
    }
}

/// Every subschema of a document, in pre-order.
///
/// Nested `$schema` declarations switch the dialect for their subtree.
pub fn subschemas(
    schema: &Value,
    walker: &dyn Walker,
    resolver: &dyn Resolver,
    default_dialect: Option<&str>,
) -> Result<Vec<SubschemaEntry>, SchemaError> {
    let dialect = vocab::dialect(schema, default_dialect).ok_or(SchemaError::Dialect)?;
    let mut cache = DialectCache::default();
    let mut entries = Vec::new();
    walk(
        schema,
        Pointer::new(),
        &dialect,
        false,
        walker,
        resolver,
        &mut cache,
        &mut entries,
    )?;
    Ok(entries)
}

#[allow(clippy::too_many_arguments)]
fn walk(
    schema: &Value,
    pointer: Pointer,
    dialect: &str,
    orphan: bool,
    walker: &dyn Walker,
    resolver: &dyn Resolver,
    cache: &mut DialectCache,
    entries: &mut Vec<SubschemaEntry>,
) -> Result<(), SchemaError> {
    let dialect = vocab::dialect(schema, Some(dialect)).ok_or(SchemaError::Dialect)?;
    let (base_dialect, vocabularies) = cache.lookup(&dialect, resolver)?;

    entries.push(SubschemaEntry {
        pointer: pointer.clone(),
        dialect: dialect.clone(),
        base_dialect: base_dialect.clone(),
        vocabularies: vocabularies.clone(),
        orphan,
    });

    let object = match schema.as_object() {
        Some(object) => object,
        None => return Ok(()),
    };

    for (keyword, value) in object {
        let role = walker.classify(keyword, &vocabularies, &base_dialect).role;
        let location = pointer.join(keyword.as_str());
        let mut visit = |value: &Value, pointer: Pointer, orphan: bool| {
            if value.is_object() || value.is_boolean() {
                walk(
                    value, pointer, &dialect, orphan, walker, resolver, cache, entries,
                )
            } else {
                Ok(())
            }
        };

        match role {
            KeywordRole::ApplicatorValue
            | KeywordRole::ApplicatorValueInPlace
            | KeywordRole::ApplicatorValueTraverse => {
                visit(value, location, orphan || role == KeywordRole::ApplicatorValue)?;
            }
            KeywordRole::ApplicatorElementsInPlace | KeywordRole::ApplicatorElementsTraverse => {
                if let Some(items) = value.as_array() {
                    for (index, item) in items.iter().enumerate() {
                        visit(item, location.join(index), orphan)?;
                    }
                }
            }
            KeywordRole::ApplicatorValueOrElementsTraverse => match value {
                Value::Array(items) => {
                    for (index, item) in items.iter().enumerate() {
                        visit(item, location.join(index), orphan)?;
                    }
                }
                _ => visit(value, location, orphan)?,
            },
            KeywordRole::ApplicatorMembersInPlace
            | KeywordRole::ApplicatorMembersTraverse
            | KeywordRole::Location => {
                if let Some(members) = value.as_object() {
                    for (name, member) in members {
                        visit(
                            member,
                            location.join(name.as_str()),
                            orphan || role == KeywordRole::Location,
                        )?;
                    }
                }
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resolver::null_resolver;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn vocabularies(dialect: &str) -> Vocabularies {
        vocab::vocabularies(dialect, &null_resolver).expect("official dialect")
    }

    #[test]
    fn roles_depend_on_dialect() {
        let modern = vocabularies(vocab::DRAFT2020_12);
        let legacy = vocabularies(vocab::DRAFT7);

        assert_eq!(
            KeywordRole::ApplicatorValueTraverse,
            default_schema_walker("items", &modern, vocab::DRAFT2020_12).role
        );
        assert_eq!(
            KeywordRole::ApplicatorValueOrElementsTraverse,
            default_schema_walker("items", &legacy, vocab::DRAFT7).role
        );
        assert_eq!(
            KeywordRole::Unknown,
            default_schema_walker("prefixItems", &legacy, vocab::DRAFT7).role
        );
        assert_eq!(
            KeywordRole::Unknown,
            default_schema_walker("if", &vocabularies(vocab::DRAFT6), vocab::DRAFT6).role
        );
        assert_eq!(
            KeywordRole::Reference,
            default_schema_walker("$dynamicRef", &modern, vocab::DRAFT2020_12).role
        );
    }

    #[test]
    fn emission_order() {
        let schema = json!({
            "unevaluatedProperties": false,
            "$ref": "#/$defs/a",
            "properties": {},
            "title": "x",
            "minProperties": 1,
            "type": "object"
        });

        let order: Vec<&str> = ordered_keywords(
            schema.as_object().unwrap(),
            &default_schema_walker,
            &vocabularies(vocab::DRAFT2020_12),
            vocab::DRAFT2020_12,
        )
        .into_iter()
        .map(|(keyword, _)| keyword)
        .collect();

        assert_eq!(
            vec![
                "type",
                "minProperties",
                "title",
                "properties",
                "$ref",
                "unevaluatedProperties"
            ],
            order
        );
    }

    #[test]
    fn walks_subschemas() -> Result<(), SchemaError> {
        let schema = json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "properties": {"foo": {"items": true}},
            "$defs": {
                "bar": {"$schema": "http://json-schema.org/draft-07/schema#", "items": [{}]}
            },
            "enum": [{"not": {}}]
        });

        let entries = subschemas(&schema, &default_schema_walker, &null_resolver, None)?;
        let pointers: Vec<String> = entries.iter().map(|e| e.pointer.to_string()).collect();
        assert_eq!(
            vec![
                "",
                "/properties/foo",
                "/properties/foo/items",
                "/$defs/bar",
                "/$defs/bar/items/0"
            ],
            pointers
        );

        assert_eq!(vocab::DRAFT7, entries[4].base_dialect);
        assert!(entries[3].orphan);
        assert!(!entries[1].orphan);
        Ok(())
    }

    #[test]
    fn missing_dialect() {
        assert_eq!(
            Err(SchemaError::Dialect),
            subschemas(&json!({}), &default_schema_walker, &null_resolver, None)
        );
    }
}
