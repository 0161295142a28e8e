//! The compiled form of a schema.
//!
//! A [`Template`](type.Template.html) is an ordered list of
//! [`Instruction`](struct.Instruction.html)s. Every instruction carries the
//! same bookkeeping (where it came from in the schema, which part of the
//! instance it looks at) plus a [`Step`](enum.Step.html) describing what it
//! does. Steps fall in five families:
//!
//! * **Assertions** check the instance and produce a boolean.
//! * **Annotations** always succeed and record a value for later siblings,
//!   such as `unevaluatedProperties`, to consult.
//! * **Logical** steps combine the outcomes of their children.
//! * **Loops** run their children over the members or items of the instance.
//! * **Control** steps implement references: labels, jumps, and dynamic
//!   anchor resolution.
//!
//! Templates are plain trees. Cycles in the source schema become jumps to a
//! label by numeric id, so templates can be cloned, compared, serialized and
//! shared across threads freely.

use crate::decimal::Decimal;
use crate::json::JsonType;
use crate::pointer::Pointer;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A compiled schema, or a compiled part of one.
pub type Template = Vec<Instruction>;

/// One compiled unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub step: Step,
    /// From the enclosing instruction to the keyword this instruction
    /// implements.
    pub relative_schema_location: Pointer,
    /// From the enclosing instruction to the instance value this instruction
    /// examines.
    pub relative_instance_location: Pointer,
    /// The absolute URI of the keyword, after following references.
    pub keyword_location: String,
    /// The base URI of the schema resource the keyword belongs to.
    pub schema_resource: String,
    /// Whether evaluating this instruction enters `schema_resource` in the
    /// dynamic scope.
    pub dynamic: bool,
    /// Whether evaluation callbacks hear about this instruction.
    pub report: bool,
}

impl Instruction {
    /// The children of applicator steps. Empty for everything else.
    pub fn children(&self) -> &[Instruction] {
        self.step.children().map_or(&[], |children| children.as_slice())
    }
}

/// A compiled regular expression that remembers its source.
#[derive(Clone)]
pub struct Pattern {
    regex: Regex,
    source: String,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(source)?,
            source: source.to_owned(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the pattern matches anywhere in the input. JSON Schema
    /// patterns are not implicitly anchored.
    pub fn is_match(&self, input: &str) -> bool {
        self.regex.is_match(input)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

/// An inclusive lower bound, an optional inclusive upper bound, and whether
/// every candidate must be counted even once the outcome is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Range {
    pub minimum: usize,
    pub maximum: Option<usize>,
    pub exhaustive: bool,
}

impl Range {
    pub fn contains(&self, count: usize) -> bool {
        count >= self.minimum && self.maximum.map_or(true, |maximum| count <= maximum)
    }
}

/// The annotations that tell which array items were already evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemsEvaluation {
    /// Keywords whose annotation is the largest evaluated index, or `true`.
    pub index: Vec<String>,
    /// Keywords whose `true` annotation means every item was evaluated.
    pub mask: Vec<String>,
    /// Keywords whose annotations list individual evaluated indexes.
    pub filter: Vec<String>,
}

/// The family a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Assertion,
    Annotation,
    Logical,
    Loop,
    Control,
}

impl Category {
    pub fn name(self) -> &'static str {
        match self {
            Category::Assertion => "assertion",
            Category::Annotation => "annotation",
            Category::Logical => "logical",
            Category::Loop => "loop",
            Category::Control => "control",
        }
    }
}

/// What an instruction does.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Always fails. The compiled form of the `false` schema.
    AssertionFail,
    /// Objects must define the property. Other values pass.
    AssertionDefines(String),
    /// Objects must define every property. Other values pass.
    AssertionDefinesAll(BTreeSet<String>),
    /// The value must be of the type. Integral reals count as integers.
    AssertionType(JsonType),
    AssertionTypeAny(BTreeSet<JsonType>),
    /// The value must be of the type, going by its literal.
    AssertionTypeStrict(JsonType),
    AssertionTypeStrictAny(BTreeSet<JsonType>),
    /// A string whose length in code points falls in the range.
    AssertionTypeStringBounded(Range),
    /// An array whose length falls in the range.
    AssertionTypeArrayBounded(Range),
    /// An object whose member count falls in the range.
    AssertionTypeObjectBounded(Range),
    /// Strings must match the pattern. Other values pass.
    AssertionRegex(Pattern),
    AssertionStringSizeLess(usize),
    AssertionStringSizeGreater(usize),
    AssertionArraySizeLess(usize),
    AssertionArraySizeGreater(usize),
    AssertionObjectSizeLess(usize),
    AssertionObjectSizeGreater(usize),
    AssertionEqual(serde_json::Value),
    AssertionEqualsAny(Vec<serde_json::Value>),
    AssertionGreaterEqual(Decimal),
    AssertionLessEqual(Decimal),
    AssertionGreater(Decimal),
    AssertionLess(Decimal),
    /// Arrays must not repeat items.
    AssertionUnique,
    /// Numbers must be a multiple of the divisor.
    AssertionDivisible(Decimal),

    /// Records a value at the current instance location.
    AnnotationEmit(serde_json::Value),
    /// Records a value at the parent of the current instance location.
    AnnotationToParent(serde_json::Value),
    /// Records the last token of the current instance location at its parent.
    AnnotationBasenameToParent,

    LogicalOr {
        /// Keep evaluating after the first success, to collect annotations.
        exhaustive: bool,
        children: Template,
    },
    LogicalAnd {
        children: Template,
    },
    LogicalXor {
        children: Template,
    },
    LogicalNot {
        children: Template,
    },
    /// Evaluates the children, records the outcome under `id`, and succeeds.
    LogicalTryMark {
        id: u64,
        children: Template,
    },
    LogicalWhenType {
        value: JsonType,
        children: Template,
    },
    LogicalWhenDefines {
        property: String,
        children: Template,
    },
    LogicalWhenAdjacentMarked {
        id: u64,
        children: Template,
    },
    LogicalWhenAdjacentUnmarked {
        id: u64,
        children: Template,
    },
    LogicalWhenArraySizeGreater {
        size: usize,
        children: Template,
    },
    LogicalWhenArraySizeEqual {
        size: usize,
        children: Template,
    },

    LoopProperties {
        children: Template,
    },
    /// Evaluates `children[index[name]]` against each member listed in
    /// `index`.
    LoopPropertiesMatch {
        index: BTreeMap<String, usize>,
        children: Template,
    },
    LoopPropertiesRegex {
        pattern: Pattern,
        children: Template,
    },
    /// Members not annotated by the given sibling keywords.
    LoopPropertiesNoAdjacentAnnotation {
        keywords: Vec<String>,
        children: Template,
    },
    /// Members not annotated by the given keywords anywhere at or below the
    /// parent schema.
    LoopPropertiesNoAnnotation {
        keywords: Vec<String>,
        children: Template,
    },
    /// Evaluates the children against each property name, as a string.
    LoopKeys {
        children: Template,
    },
    LoopItems {
        start: usize,
        children: Template,
    },
    /// Every item, unless one of the keywords annotated the array with
    /// `true`.
    LoopItemsUnmarked {
        keywords: Vec<String>,
        children: Template,
    },
    LoopItemsUnevaluated {
        evaluation: ItemsEvaluation,
        children: Template,
    },
    LoopContains {
        range: Range,
        children: Template,
    },

    /// Registers the children under `id`, then evaluates them.
    ControlLabel {
        id: u64,
        children: Template,
    },
    /// Registers the children under `id` without evaluating them.
    ControlMark {
        id: u64,
        children: Template,
    },
    /// Evaluates the children registered under `id`.
    ControlJump {
        id: u64,
    },
    /// Evaluates the children registered for the outermost schema resource in
    /// the dynamic scope that declares the anchor.
    ControlDynamicAnchorJump {
        anchor: String,
    },
}

impl Step {
    pub fn category(&self) -> Category {
        use Step::*;

        match self {
            AssertionFail
            | AssertionDefines(_)
            | AssertionDefinesAll(_)
            | AssertionType(_)
            | AssertionTypeAny(_)
            | AssertionTypeStrict(_)
            | AssertionTypeStrictAny(_)
            | AssertionTypeStringBounded(_)
            | AssertionTypeArrayBounded(_)
            | AssertionTypeObjectBounded(_)
            | AssertionRegex(_)
            | AssertionStringSizeLess(_)
            | AssertionStringSizeGreater(_)
            | AssertionArraySizeLess(_)
            | AssertionArraySizeGreater(_)
            | AssertionObjectSizeLess(_)
            | AssertionObjectSizeGreater(_)
            | AssertionEqual(_)
            | AssertionEqualsAny(_)
            | AssertionGreaterEqual(_)
            | AssertionLessEqual(_)
            | AssertionGreater(_)
            | AssertionLess(_)
            | AssertionUnique
            | AssertionDivisible(_) => Category::Assertion,
            AnnotationEmit(_) | AnnotationToParent(_) | AnnotationBasenameToParent => {
                Category::Annotation
            }
            LogicalOr { .. }
            | LogicalAnd { .. }
            | LogicalXor { .. }
            | LogicalNot { .. }
            | LogicalTryMark { .. }
            | LogicalWhenType { .. }
            | LogicalWhenDefines { .. }
            | LogicalWhenAdjacentMarked { .. }
            | LogicalWhenAdjacentUnmarked { .. }
            | LogicalWhenArraySizeGreater { .. }
            | LogicalWhenArraySizeEqual { .. } => Category::Logical,
            LoopProperties { .. }
            | LoopPropertiesMatch { .. }
            | LoopPropertiesRegex { .. }
            | LoopPropertiesNoAdjacentAnnotation { .. }
            | LoopPropertiesNoAnnotation { .. }
            | LoopKeys { .. }
            | LoopItems { .. }
            | LoopItemsUnmarked { .. }
            | LoopItemsUnevaluated { .. }
            | LoopContains { .. } => Category::Loop,
            ControlLabel { .. }
            | ControlMark { .. }
            | ControlJump { .. }
            | ControlDynamicAnchorJump { .. } => Category::Control,
        }
    }

    /// The name of the step within its category.
    pub fn name(&self) -> &'static str {
        use Step::*;

        match self {
            AssertionFail => "fail",
            AssertionDefines(_) => "defines",
            AssertionDefinesAll(_) => "defines-all",
            AssertionType(_) => "type",
            AssertionTypeAny(_) => "type-any",
            AssertionTypeStrict(_) => "type-strict",
            AssertionTypeStrictAny(_) => "type-strict-any",
            AssertionTypeStringBounded(_) => "type-string-bounded",
            AssertionTypeArrayBounded(_) => "type-array-bounded",
            AssertionTypeObjectBounded(_) => "type-object-bounded",
            AssertionRegex(_) => "regex",
            AssertionStringSizeLess(_) => "string-size-less",
            AssertionStringSizeGreater(_) => "string-size-greater",
            AssertionArraySizeLess(_) => "array-size-less",
            AssertionArraySizeGreater(_) => "array-size-greater",
            AssertionObjectSizeLess(_) => "object-size-less",
            AssertionObjectSizeGreater(_) => "object-size-greater",
            AssertionEqual(_) => "equal",
            AssertionEqualsAny(_) => "equals-any",
            AssertionGreaterEqual(_) => "greater-equal",
            AssertionLessEqual(_) => "less-equal",
            AssertionGreater(_) => "greater",
            AssertionLess(_) => "less",
            AssertionUnique => "unique",
            AssertionDivisible(_) => "divisible",
            AnnotationEmit(_) => "emit",
            AnnotationToParent(_) => "to-parent",
            AnnotationBasenameToParent => "basename-to-parent",
            LogicalOr { .. } => "or",
            LogicalAnd { .. } => "and",
            LogicalXor { .. } => "xor",
            LogicalNot { .. } => "not",
            LogicalTryMark { .. } => "try-mark",
            LogicalWhenType { .. } => "when-type",
            LogicalWhenDefines { .. } => "when-defines",
            LogicalWhenAdjacentMarked { .. } => "when-adjacent-marked",
            LogicalWhenAdjacentUnmarked { .. } => "when-adjacent-unmarked",
            LogicalWhenArraySizeGreater { .. } => "when-array-size-greater",
            LogicalWhenArraySizeEqual { .. } => "when-array-size-equal",
            LoopProperties { .. } => "properties",
            LoopPropertiesMatch { .. } => "properties-match",
            LoopPropertiesRegex { .. } => "properties-regex",
            LoopPropertiesNoAdjacentAnnotation { .. } => "properties-no-adjacent-annotation",
            LoopPropertiesNoAnnotation { .. } => "properties-no-annotation",
            LoopKeys { .. } => "keys",
            LoopItems { .. } => "items",
            LoopItemsUnmarked { .. } => "items-unmarked",
            LoopItemsUnevaluated { .. } => "items-unevaluated",
            LoopContains { .. } => "contains",
            ControlLabel { .. } => "label",
            ControlMark { .. } => "mark",
            ControlJump { .. } => "jump",
            ControlDynamicAnchorJump { .. } => "dynamic-anchor-jump",
        }
    }

    pub fn children(&self) -> Option<&Template> {
        use Step::*;

        match self {
            LogicalOr { children, .. }
            | LogicalAnd { children }
            | LogicalXor { children }
            | LogicalNot { children }
            | LogicalTryMark { children, .. }
            | LogicalWhenType { children, .. }
            | LogicalWhenDefines { children, .. }
            | LogicalWhenAdjacentMarked { children, .. }
            | LogicalWhenAdjacentUnmarked { children, .. }
            | LogicalWhenArraySizeGreater { children, .. }
            | LogicalWhenArraySizeEqual { children, .. }
            | LoopProperties { children }
            | LoopPropertiesMatch { children, .. }
            | LoopPropertiesRegex { children, .. }
            | LoopPropertiesNoAdjacentAnnotation { children, .. }
            | LoopPropertiesNoAnnotation { children, .. }
            | LoopKeys { children }
            | LoopItems { children, .. }
            | LoopItemsUnmarked { children, .. }
            | LoopItemsUnevaluated { children, .. }
            | LoopContains { children, .. }
            | ControlLabel { children, .. }
            | ControlMark { children, .. } => Some(children),
            _ => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Template> {
        use Step::*;

        match self {
            LogicalOr { children, .. }
            | LogicalAnd { children }
            | LogicalXor { children }
            | LogicalNot { children }
            | LogicalTryMark { children, .. }
            | LogicalWhenType { children, .. }
            | LogicalWhenDefines { children, .. }
            | LogicalWhenAdjacentMarked { children, .. }
            | LogicalWhenAdjacentUnmarked { children, .. }
            | LogicalWhenArraySizeGreater { children, .. }
            | LogicalWhenArraySizeEqual { children, .. }
            | LoopProperties { children }
            | LoopPropertiesMatch { children, .. }
            | LoopPropertiesRegex { children, .. }
            | LoopPropertiesNoAdjacentAnnotation { children, .. }
            | LoopPropertiesNoAnnotation { children, .. }
            | LoopKeys { children }
            | LoopItems { children, .. }
            | LoopItemsUnmarked { children, .. }
            | LoopItemsUnevaluated { children, .. }
            | LoopContains { children, .. }
            | ControlLabel { children, .. }
            | ControlMark { children, .. } => Some(children),
            _ => None,
        }
    }

    /// Whether children run as a plain conjunction at the same instance
    /// location, so that siblings may be merged or unwrapped.
    pub(crate) fn is_conjunction(&self) -> bool {
        match self {
            Step::LogicalOr { .. } | Step::LogicalXor { .. } | Step::LoopPropertiesMatch { .. } => {
                false
            }
            step => step.children().is_some(),
        }
    }
}

/// FNV-1a, which unlike the standard hasher is stable across builds, so
/// serialized templates keep resolving dynamic anchors.
fn fnv1a(parts: &[&[u8]]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for part in parts {
        for byte in part.iter().chain(&[0xff]) {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }
    hash
}

/// The label id of a schema location.
pub fn location_label(document: usize, pointer: &Pointer) -> u64 {
    fnv1a(&[
        b"location",
        document.to_string().as_bytes(),
        pointer.to_string().as_bytes(),
    ])
}

/// The label id of a dynamic anchor of a schema resource. The empty anchor
/// stands for `$recursiveAnchor`.
pub fn anchor_label(resource: &str, anchor: &str) -> u64 {
    fnv1a(&[b"anchor", resource.as_bytes(), anchor.as_bytes()])
}
