use super::{
    compile_subschema, make, make_child, CompilerMode, Context, DynamicContext, SchemaContext,
};
use crate::decimal::Decimal;
use crate::errors::SchemaError;
use crate::frame::{EntryKind, ReferenceKind};
use crate::json::JsonType;
use crate::pointer::Pointer;
use crate::template::{self, Instruction, ItemsEvaluation, Pattern, Range, Step, Template};
use crate::vocabularies as vocab;
use crate::walker::KeywordRole;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// The keyword compiler for every official dialect.
pub fn default_schema_compiler(
    context: &Context,
    schema_context: &SchemaContext,
    dynamic_context: &DynamicContext,
) -> Result<Template, SchemaError> {
    let value = match schema_context.value(dynamic_context) {
        Some(value) => value,
        None => return Ok(Vec::new()),
    };

    let role = context
        .walker()
        .classify(
            &dynamic_context.keyword,
            &schema_context.vocabularies,
            &schema_context.base_dialect,
        )
        .role;

    if role == KeywordRole::Unknown {
        return Ok(annotation(context, schema_context, dynamic_context, value)
            .filter(|_| !vocab::is_legacy(&schema_context.base_dialect))
            .into_iter()
            .collect());
    }

    let compiler = Keyword {
        context,
        schema: schema_context,
        keyword: dynamic_context,
        value,
    };

    match dynamic_context.keyword.as_str() {
        "$ref" => compiler.reference(ReferenceKind::Static),
        "$dynamicRef" => compiler.reference(ReferenceKind::Dynamic),
        "$recursiveRef" => compiler.reference(ReferenceKind::Recursive),
        "type" => compiler.types(),
        "enum" => compiler.enumeration(),
        "const" => Ok(vec![compiler.make(Step::AssertionEqual(value.clone()))]),
        "multipleOf" => compiler.multiple_of(),
        "maximum" | "minimum" => compiler.inclusive_bound(),
        "exclusiveMaximum" | "exclusiveMinimum" => compiler.exclusive_bound(),
        "maxLength" => compiler.size(Step::AssertionStringSizeLess, Step::AssertionStringSizeGreater),
        "minLength" => compiler.size(Step::AssertionStringSizeLess, Step::AssertionStringSizeGreater),
        "maxItems" => compiler.size(Step::AssertionArraySizeLess, Step::AssertionArraySizeGreater),
        "minItems" => compiler.size(Step::AssertionArraySizeLess, Step::AssertionArraySizeGreater),
        "maxProperties" => {
            compiler.size(Step::AssertionObjectSizeLess, Step::AssertionObjectSizeGreater)
        }
        "minProperties" => {
            compiler.size(Step::AssertionObjectSizeLess, Step::AssertionObjectSizeGreater)
        }
        "pattern" => compiler.pattern(),
        "uniqueItems" => compiler.unique_items(),
        "required" => compiler.required(),
        "dependentRequired" => compiler.dependencies(true, false),
        "dependentSchemas" => compiler.dependencies(false, true),
        "dependencies" => compiler.dependencies(true, true),
        "allOf" => compiler.all_of(),
        "anyOf" => compiler.any_of(),
        "oneOf" => compiler.one_of(),
        "not" => compiler.not(),
        "if" => compiler.condition(),
        "then" => compiler.consequence(true),
        "else" => compiler.consequence(false),
        "properties" => compiler.properties(),
        "patternProperties" => compiler.pattern_properties(),
        "additionalProperties" => compiler.additional_properties(),
        "propertyNames" => compiler.property_names(),
        "unevaluatedProperties" => compiler.unevaluated_properties(),
        "contains" => compiler.contains(),
        "items" => compiler.items(),
        "prefixItems" => compiler.prefix_items(),
        "additionalItems" => compiler.additional_items(),
        "unevaluatedItems" => compiler.unevaluated_items(),
        "title" | "description" | "default" | "deprecated" | "readOnly" | "writeOnly"
        | "examples" | "format" | "contentEncoding" | "contentMediaType" | "contentSchema" => {
            Ok(annotation(context, schema_context, dynamic_context, value)
                .into_iter()
                .collect())
        }
        _ => Ok(Vec::new()),
    }
}

/// Keywords without an effect on the outcome only show up in full templates.
fn annotation(
    context: &Context,
    schema_context: &SchemaContext,
    dynamic_context: &DynamicContext,
    value: &Value,
) -> Option<Instruction> {
    if context.mode() == CompilerMode::Full {
        Some(make(
            schema_context,
            dynamic_context,
            Step::AnnotationEmit(value.clone()),
        ))
    } else {
        None
    }
}

fn internal(mut instruction: Instruction) -> Instruction {
    instruction.report = false;
    instruction
}

/// The keyword being compiled, with everything needed to compile it.
struct Keyword<'c, 's, 'a> {
    context: &'c Context<'a>,
    schema: &'c SchemaContext<'s>,
    keyword: &'c DynamicContext,
    value: &'s Value,
}

impl<'c, 's, 'a> Keyword<'c, 's, 'a> {
    fn make(&self, step: Step) -> Instruction {
        make(self.schema, self.keyword, step)
    }

    fn child(&self, step: Step) -> Instruction {
        let here = Pointer::new();
        make_child(self.schema, self.keyword, step, &here, &here)
    }

    fn invalid(&self, reason: &str) -> SchemaError {
        self.schema.invalid(self.keyword, reason)
    }

    fn subschema(&self, schema_suffix: &Pointer, instance_suffix: &Pointer) -> Result<Template, SchemaError> {
        compile_subschema(
            self.context,
            self.schema,
            self.keyword,
            schema_suffix,
            instance_suffix,
            None,
        )
    }

    fn in_place(&self) -> Result<Template, SchemaError> {
        self.subschema(&Pointer::new(), &Pointer::new())
    }

    fn sibling(&self, keyword: &str) -> Option<&'s Value> {
        self.schema.schema.get(keyword)
    }

    fn optimized(&self) -> bool {
        self.context.mode() == CompilerMode::Optimized
    }

    /// Whether the keyword must emit annotations: always in full templates,
    /// and otherwise only when some other keyword reads them.
    fn annotates(&self, readers: &[&str]) -> bool {
        !self.optimized()
            || self.context.uses_unevaluated()
            || readers.iter().any(|reader| self.schema.has(reader))
    }

    fn number(&self) -> Result<Decimal, SchemaError> {
        Decimal::from_value(self.value).ok_or_else(|| self.invalid("expected a number"))
    }

    fn count(&self, value: &Value) -> Result<usize, SchemaError> {
        Decimal::from_value(value)
            .and_then(|number| number.to_usize())
            .ok_or_else(|| self.invalid("expected a non-negative integer"))
    }

    fn schemas(&self) -> Result<&'s Vec<Value>, SchemaError> {
        match self.value.as_array() {
            Some(schemas) if !schemas.is_empty() => Ok(schemas),
            _ => Err(self.invalid("expected a non-empty array of schemas")),
        }
    }

    fn members(&self) -> Result<&'s serde_json::Map<String, Value>, SchemaError> {
        self.value
            .as_object()
            .ok_or_else(|| self.invalid("expected an object"))
    }

    fn strings(&self, value: &'s Value) -> Result<BTreeSet<String>, SchemaError> {
        let items = value
            .as_array()
            .ok_or_else(|| self.invalid("expected an array of strings"))?;
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(ToOwned::to_owned)
                    .ok_or_else(|| self.invalid("expected an array of strings"))
            })
            .collect()
    }

    fn reference(&self, kind: ReferenceKind) -> Result<Template, SchemaError> {
        let frame = self.context.frame();
        let location = self.schema.pointer.concat(&self.keyword.base_schema_location);
        let reference = frame
            .reference(self.schema.document, &location, kind)
            .ok_or_else(|| self.invalid("expected a URI reference"))?;
        let entry = frame
            .get(&reference.destination)
            .ok_or_else(|| SchemaError::Reference {
                uri: reference.destination.clone(),
            })?;

        let anchor = match kind {
            ReferenceKind::Static => None,
            ReferenceKind::Dynamic => reference
                .fragment
                .as_ref()
                .filter(|fragment| !fragment.starts_with('/'))
                .filter(|fragment| {
                    entry.kind == EntryKind::DynamicAnchor
                        && frame.has_dynamic_anchor(&entry.base, fragment)
                })
                .cloned(),
            ReferenceKind::Recursive => Some(String::new()).filter(|anchor| {
                entry.relative_pointer.is_empty() && frame.has_dynamic_anchor(&entry.base, anchor)
            }),
        };

        if let Some(anchor) = anchor {
            let mut jump = self.make(Step::ControlDynamicAnchorJump { anchor });
            jump.schema_resource = entry.base.clone();
            jump.dynamic = true;
            return Ok(vec![jump]);
        }

        if self.context.is_compiling(entry) {
            let id = self.context.request_label(entry);
            debug!(destination = %reference.destination, "breaking reference cycle");
            return Ok(vec![self.make(Step::ControlJump { id })]);
        }

        let destination = reference.destination.clone();
        let children = compile_subschema(
            self.context,
            self.schema,
            self.keyword,
            &Pointer::new(),
            &Pointer::new(),
            Some(&destination),
        )?;

        Ok(vec![self.make(Step::LogicalAnd { children })])
    }

    fn types(&self) -> Result<Template, SchemaError> {
        let names: Vec<&str> = match self.value {
            Value::String(name) => vec![name.as_str()],
            Value::Array(names) if !names.is_empty() => names
                .iter()
                .map(|name| name.as_str().ok_or_else(|| self.invalid("expected a type name")))
                .collect::<Result<_, _>>()?,
            _ => return Err(self.invalid("expected a type name or a non-empty array of them")),
        };

        let mut types = BTreeSet::new();
        for name in names {
            match name {
                "number" => {
                    types.insert(JsonType::Integer);
                    types.insert(JsonType::Real);
                }
                name => {
                    let json_type = JsonType::from_name(name)
                        .filter(|json_type| *json_type != JsonType::Real)
                        .ok_or_else(|| self.invalid("unknown type name"))?;
                    types.insert(json_type);
                }
            }
        }

        // Draft 4 does not consider 1.0 an integer.
        let strict = self.schema.base_dialect == vocab::DRAFT4;
        let step = match (types.len(), types.iter().next()) {
            (1, Some(json_type)) if strict => Step::AssertionTypeStrict(*json_type),
            (1, Some(json_type)) => Step::AssertionType(*json_type),
            _ if strict => Step::AssertionTypeStrictAny(types),
            _ => Step::AssertionTypeAny(types),
        };

        Ok(vec![self.make(step)])
    }

    fn enumeration(&self) -> Result<Template, SchemaError> {
        let values = self
            .value
            .as_array()
            .ok_or_else(|| self.invalid("expected an array"))?;

        let step = match values.as_slice() {
            [value] => Step::AssertionEqual(value.clone()),
            values => Step::AssertionEqualsAny(values.to_vec()),
        };

        Ok(vec![self.make(step)])
    }

    fn multiple_of(&self) -> Result<Template, SchemaError> {
        let divisor = self.number()?;
        if divisor.is_zero() || divisor.is_negative() {
            return Err(self.invalid("expected a number greater than zero"));
        }

        Ok(vec![self.make(Step::AssertionDivisible(divisor))])
    }

    fn inclusive_bound(&self) -> Result<Template, SchemaError> {
        let bound = self.number()?;
        let maximum = self.keyword.keyword == "maximum";

        // Draft 4 turns these exclusive through a boolean sibling.
        let exclusive = self.schema.base_dialect == vocab::DRAFT4
            && self.sibling(if maximum {
                "exclusiveMaximum"
            } else {
                "exclusiveMinimum"
            }) == Some(&Value::Bool(true));

        let step = match (maximum, exclusive) {
            (true, true) => Step::AssertionLess(bound),
            (true, false) => Step::AssertionLessEqual(bound),
            (false, true) => Step::AssertionGreater(bound),
            (false, false) => Step::AssertionGreaterEqual(bound),
        };

        Ok(vec![self.make(step)])
    }

    fn exclusive_bound(&self) -> Result<Template, SchemaError> {
        if self.schema.base_dialect == vocab::DRAFT4 {
            return match self.value {
                Value::Bool(_) => Ok(Vec::new()),
                _ => Err(self.invalid("expected a boolean")),
            };
        }

        let bound = self.number()?;
        let maximum = self.keyword.keyword == "exclusiveMaximum";
        let integers = self.sibling("type") == Some(&json!("integer"));

        let one = Decimal::from_integer(1);
        let inclusive = if self.optimized() && integers {
            if maximum {
                bound.ceil().checked_sub(&one).map(Step::AssertionLessEqual)
            } else {
                bound.floor().checked_add(&one).map(Step::AssertionGreaterEqual)
            }
        } else {
            None
        };

        let step = match inclusive {
            Some(step) => step,
            None if maximum => Step::AssertionLess(bound),
            None => Step::AssertionGreater(bound),
        };

        Ok(vec![self.make(step)])
    }

    /// Lowers `maxLength` and friends to a strict comparison.
    fn size(&self, less: fn(usize) -> Step, greater: fn(usize) -> Step) -> Result<Template, SchemaError> {
        let size = self.count(self.value)?;
        if self.keyword.keyword.starts_with("max") {
            return Ok(vec![self.make(less(size.saturating_add(1)))]);
        }

        match size {
            0 => Ok(Vec::new()),
            size => Ok(vec![self.make(greater(size - 1))]),
        }
    }

    fn pattern(&self) -> Result<Template, SchemaError> {
        let source = self
            .value
            .as_str()
            .ok_or_else(|| self.invalid("expected a string"))?;
        let pattern = Pattern::new(source).map_err(|error| self.invalid(&error.to_string()))?;
        Ok(vec![self.make(Step::AssertionRegex(pattern))])
    }

    fn unique_items(&self) -> Result<Template, SchemaError> {
        match self.value {
            Value::Bool(true) => Ok(vec![self.make(Step::AssertionUnique)]),
            Value::Bool(false) => Ok(Vec::new()),
            _ => Err(self.invalid("expected a boolean")),
        }
    }

    fn defines(properties: BTreeSet<String>) -> Option<Step> {
        match properties.len() {
            0 => None,
            1 => properties.into_iter().next().map(Step::AssertionDefines),
            _ => Some(Step::AssertionDefinesAll(properties)),
        }
    }

    fn required(&self) -> Result<Template, SchemaError> {
        let properties = self.strings(self.value)?;
        Ok(Self::defines(properties)
            .map(|step| self.make(step))
            .into_iter()
            .collect())
    }

    /// `dependentRequired`, `dependentSchemas` and the legacy `dependencies`,
    /// which may mix both forms.
    fn dependencies(&self, required: bool, schemas: bool) -> Result<Template, SchemaError> {
        let mut template = Vec::new();
        for (property, dependency) in self.members()? {
            let suffix = Pointer::new().join(property.as_str());
            let children = match dependency {
                Value::Array(_) if required => {
                    let step = match Self::defines(self.strings(dependency)?) {
                        Some(step) => step,
                        None => continue,
                    };
                    vec![make_child(self.schema, self.keyword, step, &suffix, &Pointer::new())]
                }
                Value::Object(_) | Value::Bool(_) if schemas => {
                    self.subschema(&suffix, &Pointer::new())?
                }
                _ if schemas => return Err(self.invalid("expected an object of schemas")),
                _ => return Err(self.invalid("expected an array of strings")),
            };

            if children.is_empty() && self.optimized() {
                continue;
            }

            template.push(self.make(Step::LogicalWhenDefines {
                property: property.clone(),
                children,
            }));
        }

        Ok(template)
    }

    fn all_of(&self) -> Result<Template, SchemaError> {
        let mut children = Vec::new();
        for index in 0..self.schemas()?.len() {
            children.extend(self.subschema(&Pointer::new().join(index), &Pointer::new())?);
        }

        if children.is_empty() && self.optimized() {
            return Ok(Vec::new());
        }

        Ok(vec![self.make(Step::LogicalAnd { children })])
    }

    /// One conjunction per alternative, so that each branch passes or fails
    /// as a whole.
    fn branches(&self) -> Result<Template, SchemaError> {
        let mut branches = Vec::new();
        for index in 0..self.schemas()?.len() {
            let children = self.subschema(&Pointer::new().join(index), &Pointer::new())?;
            branches.push(internal(self.child(Step::LogicalAnd { children })));
        }

        Ok(branches)
    }

    fn any_of(&self) -> Result<Template, SchemaError> {
        Ok(vec![self.make(Step::LogicalOr {
            exhaustive: self.context.uses_unevaluated(),
            children: self.branches()?,
        })])
    }

    fn one_of(&self) -> Result<Template, SchemaError> {
        Ok(vec![self.make(Step::LogicalXor {
            children: self.branches()?,
        })])
    }

    fn not(&self) -> Result<Template, SchemaError> {
        Ok(vec![self.make(Step::LogicalNot {
            children: self.in_place()?,
        })])
    }

    /// The mark shared by `if` and its `then` and `else` siblings.
    fn condition_id(&self) -> u64 {
        template::location_label(self.schema.document, &self.schema.pointer.join("if"))
    }

    fn condition(&self) -> Result<Template, SchemaError> {
        let consumed = self.schema.has("then") || self.schema.has("else");
        if !consumed && self.optimized() && !self.context.uses_unevaluated() {
            return Ok(Vec::new());
        }

        Ok(vec![self.make(Step::LogicalTryMark {
            id: self.condition_id(),
            children: self.in_place()?,
        })])
    }

    fn consequence(&self, then: bool) -> Result<Template, SchemaError> {
        if !self.schema.has("if") {
            return Ok(Vec::new());
        }

        let children = self.in_place()?;
        if children.is_empty() && self.optimized() {
            return Ok(Vec::new());
        }

        let id = self.condition_id();
        let step = if then {
            Step::LogicalWhenAdjacentMarked { id, children }
        } else {
            Step::LogicalWhenAdjacentUnmarked { id, children }
        };

        Ok(vec![self.make(step)])
    }

    fn properties(&self) -> Result<Template, SchemaError> {
        let members = self.members()?;
        let annotate = self.annotates(&["additionalProperties"]);

        if self.optimized() && members.len() >= 4 {
            let mut index = BTreeMap::new();
            let mut children = Vec::with_capacity(members.len());
            for (position, property) in members.keys().enumerate() {
                let mut branch = self.subschema(&Pointer::new().join(property.as_str()), &Pointer::new())?;
                if annotate {
                    branch.push(self.child(Step::AnnotationBasenameToParent));
                }

                index.insert(property.clone(), position);
                children.push(internal(self.child(Step::LogicalAnd { children: branch })));
            }

            return Ok(vec![self.make(Step::LoopPropertiesMatch { index, children })]);
        }

        let mut children = Vec::with_capacity(members.len());
        for property in members.keys() {
            let location = Pointer::new().join(property.as_str());
            let mut branch = self.subschema(&location, &location)?;
            if annotate {
                branch.push(self.child(Step::AnnotationEmit(Value::String(property.clone()))));
            }

            if branch.is_empty() && self.optimized() {
                continue;
            }

            children.push(internal(self.child(Step::LogicalWhenDefines {
                property: property.clone(),
                children: branch,
            })));
        }

        if children.is_empty() && self.optimized() {
            return Ok(Vec::new());
        }

        Ok(vec![self.make(Step::LogicalWhenType {
            value: JsonType::Object,
            children,
        })])
    }

    fn pattern_properties(&self) -> Result<Template, SchemaError> {
        let annotate = self.annotates(&["additionalProperties"]);
        let mut template = Vec::new();
        for source in self.members()?.keys() {
            let pattern = Pattern::new(source).map_err(|error| self.invalid(&error.to_string()))?;
            let mut children = self.subschema(&Pointer::new().join(source.as_str()), &Pointer::new())?;
            if annotate {
                children.push(self.child(Step::AnnotationBasenameToParent));
            }

            template.push(self.make(Step::LoopPropertiesRegex { pattern, children }));
        }

        Ok(template)
    }

    fn additional_properties(&self) -> Result<Template, SchemaError> {
        let mut children = self.in_place()?;
        if self.annotates(&[]) {
            children.push(self.child(Step::AnnotationBasenameToParent));
        }

        let keywords: Vec<String> = ["properties", "patternProperties"]
            .iter()
            .filter(|keyword| self.schema.has(keyword))
            .map(|keyword| (*keyword).to_owned())
            .collect();

        let step = if keywords.is_empty() {
            Step::LoopProperties { children }
        } else {
            Step::LoopPropertiesNoAdjacentAnnotation { keywords, children }
        };

        Ok(vec![self.make(step)])
    }

    fn property_names(&self) -> Result<Template, SchemaError> {
        let children = self.in_place()?;
        if children.is_empty() && self.optimized() {
            return Ok(Vec::new());
        }

        Ok(vec![self.make(Step::LoopKeys { children })])
    }

    fn unevaluated_properties(&self) -> Result<Template, SchemaError> {
        let mut children = self.in_place()?;
        children.push(self.child(Step::AnnotationBasenameToParent));

        let keywords = vec![
            "properties".to_owned(),
            "patternProperties".to_owned(),
            "additionalProperties".to_owned(),
            "unevaluatedProperties".to_owned(),
        ];

        Ok(vec![self.make(Step::LoopPropertiesNoAnnotation { keywords, children })])
    }

    fn contains(&self) -> Result<Template, SchemaError> {
        let legacy = vocab::is_legacy(&self.schema.base_dialect);
        let bound = |keyword: &str| -> Result<Option<usize>, SchemaError> {
            match self.sibling(keyword) {
                Some(value) if !legacy => self.count(value).map(Some),
                _ => Ok(None),
            }
        };

        let range = Range {
            minimum: bound("minContains")?.unwrap_or(1),
            maximum: bound("maxContains")?,
            exhaustive: !self.optimized() || self.context.uses_unevaluated(),
        };

        let mut children = self.in_place()?;
        if self.schema.base_dialect == vocab::DRAFT2020_12 && self.annotates(&[]) {
            children.push(self.child(Step::AnnotationBasenameToParent));
        }

        Ok(vec![self.make(Step::LoopContains { range, children })])
    }

    /// Applies a subschema to the items from `start` onwards, marking the
    /// array as fully evaluated when any item was.
    fn remaining_items(&self, start: usize) -> Result<Template, SchemaError> {
        let mut children = self.in_place()?;
        if self.annotates(&[]) {
            children.push(self.child(Step::AnnotationToParent(Value::Bool(true))));
        }

        if children.is_empty() && self.optimized() {
            return Ok(Vec::new());
        }

        Ok(vec![self.make(Step::LoopItems { start, children })])
    }

    /// Applies subschemas to items by position, annotating the array with
    /// each index that was evaluated.
    fn positional_items(&self, schemas: usize) -> Result<Template, SchemaError> {
        let annotate = self.annotates(&[]);
        let mut children = Vec::with_capacity(schemas);
        for index in 0..schemas {
            let location = Pointer::new().join(index);
            let mut branch = self.subschema(&location, &location)?;
            if annotate {
                branch.push(self.child(Step::AnnotationEmit(json!(index))));
            }

            if branch.is_empty() && self.optimized() {
                continue;
            }

            children.push(internal(self.child(Step::LogicalWhenArraySizeGreater {
                size: index,
                children: branch,
            })));
        }

        if children.is_empty() && self.optimized() {
            return Ok(Vec::new());
        }

        Ok(vec![self.make(Step::LogicalWhenType {
            value: JsonType::Array,
            children,
        })])
    }

    fn items(&self) -> Result<Template, SchemaError> {
        match self.value {
            Value::Array(schemas) if self.schema.base_dialect != vocab::DRAFT2020_12 => {
                self.positional_items(schemas.len())
            }
            _ => {
                let start = match self.sibling("prefixItems") {
                    Some(Value::Array(prefix)) if self.schema.base_dialect == vocab::DRAFT2020_12 => {
                        prefix.len()
                    }
                    _ => 0,
                };

                self.remaining_items(start)
            }
        }
    }

    fn prefix_items(&self) -> Result<Template, SchemaError> {
        self.positional_items(self.schemas()?.len())
    }

    fn additional_items(&self) -> Result<Template, SchemaError> {
        match self.sibling("items") {
            Some(Value::Array(items)) => self.remaining_items(items.len()),
            _ => Ok(Vec::new()),
        }
    }

    fn unevaluated_items(&self) -> Result<Template, SchemaError> {
        let mut children = self.in_place()?;
        children.push(self.child(Step::AnnotationToParent(Value::Bool(true))));

        let owned = |keywords: &[&str]| -> Vec<String> {
            keywords.iter().map(|keyword| (*keyword).to_owned()).collect()
        };

        let frame = self.context.frame();
        let step = if self.schema.base_dialect == vocab::DRAFT2020_12 {
            if frame.uses_keyword("prefixItems") || frame.uses_keyword("contains") {
                Step::LoopItemsUnevaluated {
                    evaluation: ItemsEvaluation {
                        index: owned(&["prefixItems"]),
                        mask: owned(&["items", "unevaluatedItems"]),
                        filter: owned(&["contains"]),
                    },
                    children,
                }
            } else {
                Step::LoopItemsUnmarked {
                    keywords: owned(&["items", "unevaluatedItems"]),
                    children,
                }
            }
        } else {
            Step::LoopItemsUnevaluated {
                evaluation: ItemsEvaluation {
                    index: owned(&["items"]),
                    mask: owned(&["additionalItems", "unevaluatedItems"]),
                    filter: Vec::new(),
                },
                children,
            }
        };

        Ok(vec![self.make(step)])
    }
}

#[cfg(test)]
mod test {
    use super::super::{compile, Compiler, Config};
    use super::*;
    use crate::resolver::null_resolver;
    use crate::walker::default_schema_walker;
    use failure::Error;
    use pretty_assertions::assert_eq;

    fn steps(mode: CompilerMode, schema: Value) -> Result<Vec<Step>, SchemaError> {
        let template = compile(
            &schema,
            &default_schema_walker,
            &null_resolver,
            &default_schema_compiler,
            mode,
            Some(vocab::DRAFT2020_12),
        )?;
        Ok(template.into_iter().map(|instruction| instruction.step).collect())
    }

    fn decimal(literal: &str) -> Decimal {
        Decimal::parse(literal).expect("a number literal")
    }

    #[test]
    fn integer_bounds() -> Result<(), Error> {
        let huge: Value = serde_json::from_str(r#"{"type": "integer", "exclusiveMaximum": 1.0e400}"#)?;
        let steps_huge = steps(CompilerMode::Optimized, huge)?;
        assert_eq!(
            vec![
                Step::AssertionType(JsonType::Integer),
                Step::AssertionLessEqual(
                    decimal("1.0e400")
                        .checked_sub(&Decimal::from_integer(1))
                        .expect("difference")
                ),
            ],
            steps_huge
        );

        match &steps_huge[1] {
            Step::AssertionLessEqual(bound) => assert_eq!(
                decimal("10.00000000000000e+399"),
                bound.round_significant(16)
            ),
            step => panic!("unexpected step {:?}", step),
        }

        assert_eq!(
            vec![
                Step::AssertionType(JsonType::Integer),
                Step::AssertionGreaterEqual(Decimal::from_integer(3)),
            ],
            steps(
                CompilerMode::Optimized,
                json!({"type": "integer", "exclusiveMinimum": 2.5})
            )?
        );

        assert_eq!(
            vec![
                Step::AssertionType(JsonType::Integer),
                Step::AssertionGreater(decimal("2.5")),
            ],
            steps(CompilerMode::Full, json!({"type": "integer", "exclusiveMinimum": 2.5}))?
        );
        Ok(())
    }

    #[test]
    fn draft4_semantics() -> Result<(), Error> {
        let template = Compiler::new().compile(
            &json!({
                "$schema": "http://json-schema.org/draft-04/schema#",
                "type": "integer",
                "maximum": 5,
                "exclusiveMaximum": true
            }),
            &null_resolver,
        )?;

        assert_eq!(
            vec![
                Step::AssertionTypeStrict(JsonType::Integer),
                Step::AssertionLess(Decimal::from_integer(5)),
            ],
            template.into_iter().map(|i| i.step).collect::<Vec<_>>()
        );
        Ok(())
    }

    #[test]
    fn sizes() -> Result<(), Error> {
        assert_eq!(
            vec![
                Step::AssertionStringSizeLess(4),
                Step::AssertionStringSizeGreater(0),
            ],
            steps(CompilerMode::Full, json!({"maxLength": 3, "minLength": 1}))?
        );
        assert_eq!(
            Vec::<Step>::new(),
            steps(CompilerMode::Full, json!({"minItems": 0}))?
        );
        Ok(())
    }

    #[test]
    fn invalid_keywords() {
        assert_eq!(
            Err(SchemaError::Compilation {
                keyword: "pattern".to_owned(),
                location: "#/properties/foo/pattern".to_owned(),
                reason: "expected a string".to_owned(),
            }),
            steps(
                CompilerMode::Optimized,
                json!({"properties": {"foo": {"pattern": 1}}})
            )
        );

        assert!(matches!(
            steps(CompilerMode::Optimized, json!({"pattern": "("})),
            Err(SchemaError::Compilation { .. })
        ));
        assert!(matches!(
            steps(CompilerMode::Optimized, json!({"type": "float"})),
            Err(SchemaError::Compilation { .. })
        ));

        assert_eq!(
            Err(SchemaError::Compilation {
                keyword: "dependentSchemas".to_owned(),
                location: "#/dependentSchemas".to_owned(),
                reason: "expected an object of schemas".to_owned(),
            }),
            steps(
                CompilerMode::Optimized,
                json!({"dependentSchemas": {"foo": ["bar"]}})
            )
        );
        assert_eq!(
            Err(SchemaError::Compilation {
                keyword: "dependentRequired".to_owned(),
                location: "#/dependentRequired".to_owned(),
                reason: "expected an array of strings".to_owned(),
            }),
            steps(
                CompilerMode::Optimized,
                json!({"dependentRequired": {"foo": {"type": "string"}}})
            )
        );
    }

    #[test]
    fn annotations_only_in_full_mode() -> Result<(), Error> {
        let schema = json!({"title": "Example", "x-custom": 1, "properties": {"a": true}});
        assert_eq!(Vec::<Step>::new(), steps(CompilerMode::Optimized, schema.clone())?);

        let full = steps(CompilerMode::Full, schema)?;
        assert_eq!(
            vec![
                Step::AnnotationEmit(json!("Example")),
                Step::AnnotationEmit(json!(1)),
            ],
            full[..2].to_vec()
        );
        Ok(())
    }

    #[test]
    fn conditionals_share_a_mark() -> Result<(), Error> {
        let steps = steps(
            CompilerMode::Full,
            json!({"if": {"type": "string"}, "then": {"minLength": 1}, "else": {"type": "null"}}),
        )?;

        let id = template::location_label(0, &Pointer::new().join("if"));
        match (&steps[0], &steps[1], &steps[2]) {
            (
                Step::LogicalTryMark { id: a, .. },
                Step::LogicalWhenAdjacentMarked { id: b, .. },
                Step::LogicalWhenAdjacentUnmarked { id: c, .. },
            ) => {
                assert_eq!(id, *a);
                assert_eq!(id, *b);
                assert_eq!(id, *c);
            }
            steps => panic!("unexpected steps {:?}", steps),
        }
        Ok(())
    }

    #[test]
    fn dynamic_references() -> Result<(), Error> {
        let template = compile(
            &json!({
                "$id": "https://example.com/tree",
                "$dynamicAnchor": "node",
                "properties": {"children": {"items": {"$dynamicRef": "#node"}}}
            }),
            &default_schema_walker,
            &null_resolver,
            &default_schema_compiler,
            CompilerMode::Full,
            Some(vocab::DRAFT2020_12),
        )?;

        let mark = &template[0];
        assert_eq!(
            template::anchor_label("https://example.com/tree", "node"),
            match mark.step {
                Step::ControlMark { id, .. } => id,
                _ => 0,
            }
        );

        fn find(template: &[Instruction]) -> Option<&Instruction> {
            template.iter().find_map(|instruction| match instruction.step {
                Step::ControlDynamicAnchorJump { .. } => Some(instruction),
                _ => find(instruction.children()),
            })
        }

        let jump = find(&template[1..]).expect("dynamic jump");
        assert_eq!(
            Step::ControlDynamicAnchorJump {
                anchor: "node".to_owned()
            },
            jump.step
        );
        assert!(jump.dynamic);
        assert_eq!("https://example.com/tree", jump.schema_resource);
        assert!(template[1..].iter().all(|instruction| instruction.dynamic));
        Ok(())
    }

    #[test]
    fn façade_config() -> Result<(), Error> {
        let mut config = Config::new();
        config
            .mode(CompilerMode::Full)
            .default_dialect(Some(vocab::DRAFT7.to_owned()));

        let template = Compiler::new_with_config(config)
            .compile(&json!({"items": [{"type": "string"}]}), &null_resolver)?;
        match &template[0].step {
            Step::LogicalWhenType { value, children } => {
                assert_eq!(JsonType::Array, *value);
                assert_eq!(1, children.len());
            }
            step => panic!("unexpected step {:?}", step),
        }
        Ok(())
    }
}
