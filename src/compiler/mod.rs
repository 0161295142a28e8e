//! Compile schemas into templates.
//!
//! Compilation walks a schema one subschema at a time. For every keyword of a
//! subschema, in the order the [`Walker`](../walker/trait.Walker.html) asks
//! for, a [`KeywordCompiler`](trait.KeywordCompiler.html) turns the keyword
//! into instructions, compiling nested subschemas through
//! [`compile_subschema`](fn.compile_subschema.html) as it goes.
//!
//! See the docs for [`Compiler`](struct.Compiler.html) for the common case.

mod default_compiler;
mod optimizer;

pub use self::default_compiler::default_schema_compiler;

use crate::errors::SchemaError;
use crate::frame::{EntryKind, FrameEntry, Frame};
use crate::pointer::Pointer;
use crate::resolver::Resolver;
use crate::template::{self, Instruction, Step, Template};
use crate::uri;
use crate::vocabularies::{self as vocab, Vocabularies};
use crate::walker::{default_schema_walker, ordered_keywords, KeywordRole, Walker};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashSet;
use tracing::{debug, warn};

/// How much effort compilation puts into the shape of the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompilerMode {
    /// Rewrite the template into a smaller equivalent one, and only emit the
    /// annotations evaluation actually depends on.
    Optimized,
    /// Keep one instruction per keyword and emit every annotation.
    Full,
}

impl Default for CompilerMode {
    fn default() -> Self {
        CompilerMode::Optimized
    }
}

/// Turns one keyword of a subschema into instructions.
///
/// The keyword is `dynamic_context.keyword`, and its value lives in
/// `schema_context.schema`. Implementations may return no instructions at
/// all, for keywords that have no effect on evaluation.
pub trait KeywordCompiler {
    fn compile(
        &self,
        context: &Context,
        schema_context: &SchemaContext,
        dynamic_context: &DynamicContext,
    ) -> Result<Template, SchemaError>;
}

impl<F> KeywordCompiler for F
where
    F: Fn(&Context<'_>, &SchemaContext<'_>, &DynamicContext) -> Result<Template, SchemaError>,
{
    fn compile(
        &self,
        context: &Context,
        schema_context: &SchemaContext,
        dynamic_context: &DynamicContext,
    ) -> Result<Template, SchemaError> {
        self(context, schema_context, dynamic_context)
    }
}

#[derive(Debug, Default)]
struct State {
    /// The locations being compiled, innermost last.
    stack: Vec<(usize, Pointer)>,
    /// Label ids some jump needs, for locations still on the stack.
    labels: HashSet<u64>,
}

/// What stays the same during the whole compilation of a schema.
pub struct Context<'a> {
    frame: Frame,
    walker: &'a dyn Walker,
    resolver: &'a dyn Resolver,
    compiler: &'a dyn KeywordCompiler,
    mode: CompilerMode,
    uses_dynamic_scopes: bool,
    uses_unevaluated: bool,
    state: RefCell<State>,
}

impl<'a> Context<'a> {
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn walker(&self) -> &dyn Walker {
        self.walker
    }

    pub fn resolver(&self) -> &dyn Resolver {
        self.resolver
    }

    pub fn mode(&self) -> CompilerMode {
        self.mode
    }

    /// Whether the schema relies on dynamic scopes anywhere, through dynamic
    /// or recursive anchors and references.
    pub fn uses_dynamic_scopes(&self) -> bool {
        self.uses_dynamic_scopes
    }

    /// Whether `unevaluatedProperties` or `unevaluatedItems` appear anywhere,
    /// so that every annotation they consult must be emitted.
    pub fn uses_unevaluated(&self) -> bool {
        self.uses_unevaluated
    }

    /// Whether the location is being compiled further up the stack.
    pub fn is_compiling(&self, entry: &FrameEntry) -> bool {
        self.state
            .borrow()
            .stack
            .iter()
            .any(|(document, pointer)| *document == entry.document && *pointer == entry.pointer)
    }

    /// Asks for the location to be compiled behind a label, and returns the
    /// label id to jump to.
    pub fn request_label(&self, entry: &FrameEntry) -> u64 {
        let id = template::location_label(entry.document, &entry.pointer);
        self.state.borrow_mut().labels.insert(id);
        id
    }
}

/// Where in the schema compilation currently is.
#[derive(Debug, Clone)]
pub struct SchemaContext<'s> {
    /// The subschema whose keywords are being compiled.
    pub schema: &'s Map<String, Value>,
    pub document: usize,
    /// The absolute location of the subschema in its document.
    pub pointer: Pointer,
    /// The base URI of the enclosing schema resource.
    pub base: String,
    /// The location of the subschema relative to its schema resource.
    pub relative_pointer: Pointer,
    pub dialect: String,
    pub base_dialect: String,
    pub vocabularies: Vocabularies,
}

impl<'s> SchemaContext<'s> {
    /// The absolute URI of a location below the current keyword.
    pub fn keyword_location(&self, dynamic_context: &DynamicContext, suffix: &Pointer) -> String {
        let fragment = self
            .relative_pointer
            .concat(&dynamic_context.base_schema_location)
            .concat(suffix);
        uri::with_fragment(&self.base, &fragment.to_string())
    }

    /// The value of the current keyword.
    pub fn value(&self, dynamic_context: &DynamicContext) -> Option<&'s Value> {
        self.schema.get(&dynamic_context.keyword)
    }

    /// Whether the subschema has the sibling keyword.
    pub fn has(&self, keyword: &str) -> bool {
        self.schema.contains_key(keyword)
    }

    /// A compilation error for the current keyword.
    pub fn invalid(&self, dynamic_context: &DynamicContext, reason: &str) -> SchemaError {
        SchemaError::compilation(
            &dynamic_context.keyword,
            &self.keyword_location(dynamic_context, &Pointer::new()),
            reason,
        )
    }
}

/// The keyword being compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicContext {
    pub keyword: String,
    /// Where the keyword's instructions sit relative to their subschema.
    pub base_schema_location: Pointer,
    pub base_instance_location: Pointer,
}

/// An instruction for the current keyword, located at the keyword.
pub fn make(
    schema_context: &SchemaContext,
    dynamic_context: &DynamicContext,
    step: Step,
) -> Instruction {
    Instruction {
        step,
        relative_schema_location: dynamic_context.base_schema_location.clone(),
        relative_instance_location: dynamic_context.base_instance_location.clone(),
        keyword_location: schema_context.keyword_location(dynamic_context, &Pointer::new()),
        schema_resource: schema_context.base.clone(),
        dynamic: false,
        report: true,
    }
}

/// An instruction nested inside another instruction of the current keyword.
///
/// The suffixes are relative to the enclosing instruction, and the schema
/// suffix also extends the keyword location.
pub fn make_child(
    schema_context: &SchemaContext,
    dynamic_context: &DynamicContext,
    step: Step,
    schema_suffix: &Pointer,
    instance_suffix: &Pointer,
) -> Instruction {
    Instruction {
        step,
        relative_schema_location: schema_suffix.clone(),
        relative_instance_location: instance_suffix.clone(),
        keyword_location: schema_context.keyword_location(dynamic_context, schema_suffix),
        schema_resource: schema_context.base.clone(),
        dynamic: false,
        report: true,
    }
}

/// Compiles a whole schema.
///
/// Builds the reference frame, fetching external documents through the
/// resolver, then compiles the root schema with `compiler`.
pub fn compile(
    schema: &Value,
    walker: &dyn Walker,
    resolver: &dyn Resolver,
    compiler: &dyn KeywordCompiler,
    mode: CompilerMode,
    default_dialect: Option<&str>,
) -> Result<Template, SchemaError> {
    let frame = Frame::build(schema, walker, resolver, default_dialect)?;
    let uses_dynamic_scopes = frame.uses_dynamic_scopes();
    let uses_unevaluated =
        frame.uses_keyword("unevaluatedProperties") || frame.uses_keyword("unevaluatedItems");

    let context = Context {
        frame,
        walker,
        resolver,
        compiler,
        mode,
        uses_dynamic_scopes,
        uses_unevaluated,
        state: RefCell::new(State::default()),
    };

    let root = context
        .frame
        .get(context.frame.root())
        .cloned()
        .ok_or_else(|| SchemaError::Reference {
            uri: context.frame.root().to_owned(),
        })?;

    let mut template = Vec::new();
    if context.frame.uses_keyword("$dynamicRef") || context.frame.uses_keyword("$recursiveRef") {
        template.extend(dynamic_anchor_marks(&context)?);
    }

    template.extend(compile_entry(&context, &root)?);

    if mode == CompilerMode::Optimized {
        optimizer::optimize(&mut template);
    }

    Ok(template)
}

/// Compiles a subschema on behalf of a keyword.
///
/// Without a `uri`, the subschema is the one at `schema_suffix` below the
/// current keyword. With one, it is whatever the frame has at that URI. The
/// instructions come back relative to the keyword's own instructions, offset
/// by `schema_suffix` and `instance_suffix`.
pub fn compile_subschema(
    context: &Context,
    schema_context: &SchemaContext,
    dynamic_context: &DynamicContext,
    schema_suffix: &Pointer,
    instance_suffix: &Pointer,
    uri: Option<&str>,
) -> Result<Template, SchemaError> {
    let entry = match uri {
        Some(uri) => context
            .frame
            .get(uri)
            .cloned()
            .ok_or_else(|| SchemaError::Reference {
                uri: uri.to_owned(),
            })?,
        None => {
            let relative = dynamic_context.base_schema_location.concat(schema_suffix);
            let pointer = schema_context.pointer.concat(&relative);
            match context.frame.location(schema_context.document, &pointer) {
                Some(entry) => entry.clone(),
                None => FrameEntry {
                    kind: EntryKind::Pointer,
                    document: schema_context.document,
                    pointer,
                    base: schema_context.base.clone(),
                    relative_pointer: schema_context.relative_pointer.concat(&relative),
                    dialect: schema_context.dialect.clone(),
                    base_dialect: schema_context.base_dialect.clone(),
                },
            }
        }
    };

    let mut template = compile_entry(context, &entry)?;
    for instruction in &mut template {
        instruction.relative_schema_location =
            schema_suffix.concat(&instruction.relative_schema_location);
        instruction.relative_instance_location =
            instance_suffix.concat(&instruction.relative_instance_location);
    }

    Ok(template)
}

/// Compiles the subschema at a frame location, without any offset.
fn compile_entry(context: &Context, entry: &FrameEntry) -> Result<Template, SchemaError> {
    let keyword_location = uri::with_fragment(&entry.base, &entry.relative_pointer.to_string());
    let schema = context
        .frame
        .traverse(entry)
        .ok_or_else(|| SchemaError::Reference {
            uri: keyword_location.clone(),
        })?;

    let object = match schema {
        Value::Bool(true) => return Ok(Vec::new()),
        Value::Bool(false) => {
            return Ok(vec![Instruction {
                step: Step::AssertionFail,
                relative_schema_location: Pointer::new(),
                relative_instance_location: Pointer::new(),
                keyword_location,
                schema_resource: entry.base.clone(),
                dynamic: context.uses_dynamic_scopes,
                report: true,
            }])
        }
        Value::Object(object) => object,
        _ => {
            return Err(SchemaError::compilation(
                "",
                &keyword_location,
                "a schema must be an object or a boolean",
            ))
        }
    };

    let schema_context = SchemaContext {
        schema: object,
        document: entry.document,
        pointer: entry.pointer.clone(),
        base: entry.base.clone(),
        relative_pointer: entry.relative_pointer.clone(),
        dialect: entry.dialect.clone(),
        base_dialect: entry.base_dialect.clone(),
        vocabularies: context
            .frame
            .vocabularies(&entry.dialect)
            .cloned()
            .unwrap_or_default(),
    };

    context
        .state
        .borrow_mut()
        .stack
        .push((entry.document, entry.pointer.clone()));
    let result = compile_keywords(context, &schema_context);
    context.state.borrow_mut().stack.pop();
    let mut template = result?;

    if context.uses_dynamic_scopes {
        for instruction in &mut template {
            instruction.dynamic = true;
        }
    }

    let id = template::location_label(entry.document, &entry.pointer);
    if context.state.borrow_mut().labels.remove(&id) {
        template = vec![Instruction {
            step: Step::ControlLabel {
                id,
                children: template,
            },
            relative_schema_location: Pointer::new(),
            relative_instance_location: Pointer::new(),
            keyword_location,
            schema_resource: entry.base.clone(),
            dynamic: false,
            report: false,
        }];
    }

    Ok(template)
}

fn compile_keywords(
    context: &Context,
    schema_context: &SchemaContext,
) -> Result<Template, SchemaError> {
    // Up to draft 7, $ref overrides its siblings.
    let only_reference =
        vocab::is_legacy(&schema_context.base_dialect) && schema_context.has("$ref");

    let mut template = Vec::new();
    for (keyword, result) in ordered_keywords(
        schema_context.schema,
        context.walker,
        &schema_context.vocabularies,
        &schema_context.base_dialect,
    ) {
        if only_reference && keyword != "$ref" {
            continue;
        }

        if result.role == KeywordRole::Unknown
            && !vocab::is_legacy(&schema_context.base_dialect)
            && !keyword.starts_with("x-")
        {
            warn!(
                keyword,
                location = %schema_context.pointer,
                dialect = %schema_context.dialect,
                "unknown keyword"
            );
        }

        let dynamic_context = DynamicContext {
            keyword: keyword.to_owned(),
            base_schema_location: Pointer::new().join(keyword),
            base_instance_location: Pointer::new(),
        };

        template.extend(
            context
                .compiler
                .compile(context, schema_context, &dynamic_context)?,
        );
    }

    Ok(template)
}

/// Registers every subschema a dynamic anchor jump may land on, under the id
/// of its resource and anchor.
fn dynamic_anchor_marks(context: &Context) -> Result<Template, SchemaError> {
    let mut targets: Vec<(String, String, FrameEntry)> = context
        .frame
        .entries()
        .filter(|(_, entry)| entry.kind == EntryKind::DynamicAnchor)
        .filter_map(|(uri, entry)| {
            uri::split_fragment(uri)
                .1
                .map(|anchor| (uri.clone(), anchor.to_owned(), entry.clone()))
        })
        .collect();

    for base in context.frame.recursive_anchors() {
        if let Some(entry) = context.frame.get(base) {
            targets.push((base.clone(), String::new(), entry.clone()));
        }
    }

    let mut marks = Vec::with_capacity(targets.len());
    for (uri, anchor, entry) in targets {
        debug!(%uri, "registering dynamic anchor");
        marks.push(Instruction {
            step: Step::ControlMark {
                id: template::anchor_label(&entry.base, &anchor),
                children: compile_entry(context, &entry)?,
            },
            relative_schema_location: Pointer::new(),
            relative_instance_location: Pointer::new(),
            keyword_location: uri,
            schema_resource: entry.base.clone(),
            dynamic: false,
            report: false,
        });
    }

    Ok(marks)
}

/// Compiles schemas with the default walker and keyword compiler.
#[derive(Debug, Default, Eq, PartialEq, Clone, Hash)]
pub struct Compiler {
    config: Config,
}

impl Compiler {
    /// Constructs a new compiler using the default configuration.
    pub fn new() -> Self {
        Self::new_with_config(Config::default())
    }

    /// Constructs a new compiler using a configuration.
    pub fn new_with_config(config: Config) -> Self {
        Self { config }
    }

    /// Compile a schema, resolving external references with `resolver`.
    pub fn compile(&self, schema: &Value, resolver: &dyn Resolver) -> Result<Template, SchemaError> {
        compile(
            schema,
            &default_schema_walker,
            resolver,
            &default_schema_compiler,
            self.config.mode,
            self.config.default_dialect.as_deref(),
        )
    }
}

/// Configuration for how compilation should proceed.
#[derive(Debug, Default, Eq, PartialEq, Clone, Hash)]
pub struct Config {
    mode: CompilerMode,
    default_dialect: Option<String>,
}

impl Config {
    /// Create a new, default `Config`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the compilation mode. The default is
    /// [`CompilerMode::Optimized`](enum.CompilerMode.html).
    pub fn mode(&mut self, mode: CompilerMode) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Sets the dialect to assume for schemas that do not declare one with
    /// `$schema`. There is no default dialect by default, and such schemas
    /// fail to compile with
    /// [`SchemaError::Dialect`](../errors/enum.SchemaError.html).
    pub fn default_dialect(&mut self, default_dialect: Option<String>) -> &mut Self {
        self.default_dialect = default_dialect;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::json::JsonType;
    use crate::resolver::null_resolver;
    use failure::Error;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn full(schema: Value) -> Result<Template, SchemaError> {
        let mut config = Config::new();
        config.mode(CompilerMode::Full);
        Compiler::new_with_config(config).compile(&schema, &null_resolver)
    }

    #[test]
    fn type_assertion() -> Result<(), Error> {
        let template = full(json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "type": "string"
        }))?;

        assert_eq!(
            vec![Instruction {
                step: Step::AssertionType(JsonType::String),
                relative_schema_location: Pointer::parse("/type")?,
                relative_instance_location: Pointer::new(),
                keyword_location: "#/type".to_owned(),
                schema_resource: "".to_owned(),
                dynamic: false,
                report: true,
            }],
            template
        );
        Ok(())
    }

    #[test]
    fn default_dialect() -> Result<(), Error> {
        let mut config = Config::new();
        config.default_dialect(Some("http://json-schema.org/draft-07/schema#".to_owned()));

        let template = Compiler::new_with_config(config).compile(&json!({"type": "integer"}), &null_resolver)?;
        assert_eq!(1, template.len());
        assert_eq!(Step::AssertionType(JsonType::Integer), template[0].step);

        assert_eq!(
            Err(SchemaError::Dialect),
            Compiler::new().compile(&json!({"type": "integer"}), &null_resolver)
        );
        Ok(())
    }

    #[test]
    fn nested_locations() -> Result<(), Error> {
        let template = full(json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "$id": "https://example.com/root.json",
            "allOf": [{"$id": "nested.json", "minimum": 3}]
        }))?;

        let all_of = &template[0];
        assert_eq!(Pointer::parse("/allOf")?, all_of.relative_schema_location);
        assert_eq!("https://example.com/root.json#/allOf", all_of.keyword_location);

        let minimum = &all_of.children()[0];
        assert_eq!(Pointer::parse("/0/minimum")?, minimum.relative_schema_location);
        assert_eq!("https://example.com/nested.json#/minimum", minimum.keyword_location);
        assert_eq!("https://example.com/nested.json", minimum.schema_resource);
        Ok(())
    }

    #[test]
    fn cycles_become_jumps() -> Result<(), Error> {
        let template = full(json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "$ref": "#/$defs/a",
            "$defs": {
                "a": {"$ref": "#/$defs/b"},
                "b": {"$ref": "#/$defs/a"}
            }
        }))?;

        let id = template::location_label(0, &Pointer::parse("/$defs/a")?);
        let reference = &template[0];
        let label = &reference.children()[0];
        assert_eq!(Step::ControlLabel { id, children: label.children().to_vec() }, label.step);

        let inner = &label.children()[0].children()[0];
        assert_eq!(Step::ControlJump { id }, inner.step);
        assert_eq!(Pointer::parse("/$ref")?, inner.relative_schema_location);
        Ok(())
    }

    #[test]
    fn unresolvable_reference() {
        assert_eq!(
            Err(SchemaError::Reference {
                uri: "https://example.com/missing.json".to_owned()
            }),
            full(json!({
                "$schema": "https://json-schema.org/draft/2020-12/schema",
                "$ref": "https://example.com/missing.json"
            }))
        );
    }

    #[test]
    fn legacy_reference_siblings_are_ignored() -> Result<(), Error> {
        let template = full(json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "$ref": "#/definitions/a",
            "type": "string",
            "definitions": {"a": {"minimum": 1}}
        }))?;

        assert_eq!(1, template.len());
        assert_eq!(Pointer::parse("/$ref")?, template[0].relative_schema_location);
        Ok(())
    }

    #[test]
    fn custom_keyword_compiler() -> Result<(), Error> {
        let compiler = |context: &Context<'_>,
                        schema_context: &SchemaContext<'_>,
                        dynamic_context: &DynamicContext|
         -> Result<Template, SchemaError> {
            if dynamic_context.keyword == "x-never" {
                return Ok(vec![make(schema_context, dynamic_context, Step::AssertionFail)]);
            }

            default_schema_compiler(context, schema_context, dynamic_context)
        };

        let template = compile(
            &json!({"x-never": true, "type": "null"}),
            &default_schema_walker,
            &null_resolver,
            &compiler,
            CompilerMode::Optimized,
            Some("https://json-schema.org/draft/2020-12/schema"),
        )?;

        assert_eq!(
            vec![Step::AssertionType(JsonType::Null), Step::AssertionFail],
            template.into_iter().map(|i| i.step).collect::<Vec<_>>()
        );
        Ok(())
    }
}
