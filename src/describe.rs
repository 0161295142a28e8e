//! Human-readable explanations of instruction outcomes.

use crate::json::{self, JsonType};
use crate::pointer::Pointer;
use crate::template::{Instruction, Range, Step};
use serde_json::Value;
use std::fmt::Display;

/// Explains, in one sentence, what an instruction expects from the value at
/// `instance_location` of `instance`.
///
/// `instance` is the whole document being evaluated. `annotation` is the
/// value an annotation instruction emitted, and is ignored otherwise.
pub fn describe(
    valid: bool,
    instruction: &Instruction,
    evaluate_path: &Pointer,
    instance_location: &Pointer,
    instance: &Value,
    annotation: &Value,
) -> String {
    let subject = subject(instance_location);
    let target = instance_location.get(instance);
    let actual = target.map(json::type_of);

    match &instruction.step {
        Step::AssertionFail => format!("{} is not allowed", subject),
        Step::AssertionDefines(property) => {
            format!("{} must define the property \"{}\"", subject, property)
        }
        Step::AssertionDefinesAll(properties) => {
            let missing: Vec<&String> = properties
                .iter()
                .filter(|property| {
                    target
                        .and_then(Value::as_object)
                        .map_or(true, |members| !members.contains_key(*property))
                })
                .collect();
            let listed = if valid || missing.is_empty() {
                quoted(properties)
            } else {
                quoted(missing)
            };
            format!("{} must define the properties {}", subject, listed)
        }
        Step::AssertionType(expected) | Step::AssertionTypeStrict(expected) => {
            with_actual(format!("{} must be of type {}", subject, expected), valid, actual)
        }
        Step::AssertionTypeAny(types) | Step::AssertionTypeStrictAny(types) => with_actual(
            format!("{} must be of type {}", subject, either(types)),
            valid,
            actual,
        ),
        Step::AssertionTypeStringBounded(range) => {
            format!("{} must be a string {}", subject, bounds(range, "characters"))
        }
        Step::AssertionTypeArrayBounded(range) => {
            format!("{} must be an array {}", subject, bounds(range, "items"))
        }
        Step::AssertionTypeObjectBounded(range) => {
            format!("{} must be an object {}", subject, bounds(range, "properties"))
        }
        Step::AssertionRegex(pattern) => format!(
            "{} must match the regular expression \"{}\"",
            subject,
            pattern.source()
        ),
        Step::AssertionStringSizeLess(size) => {
            format!("{} must be at most {} characters long", subject, size.saturating_sub(1))
        }
        Step::AssertionStringSizeGreater(size) => {
            format!("{} must be at least {} characters long", subject, size + 1)
        }
        Step::AssertionArraySizeLess(size) => {
            format!("{} must contain at most {} items", subject, size.saturating_sub(1))
        }
        Step::AssertionArraySizeGreater(size) => {
            format!("{} must contain at least {} items", subject, size + 1)
        }
        Step::AssertionObjectSizeLess(size) => format!(
            "{} must define at most {} properties",
            subject,
            size.saturating_sub(1)
        ),
        Step::AssertionObjectSizeGreater(size) => {
            format!("{} must define at least {} properties", subject, size + 1)
        }
        Step::AssertionEqual(value) => format!("{} must be equal to {}", subject, value),
        Step::AssertionEqualsAny(values) => format!(
            "{} must be equal to one of {}",
            subject,
            values
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Step::AssertionGreaterEqual(bound) => {
            format!("{} must be greater than or equal to {}", subject, bound)
        }
        Step::AssertionLessEqual(bound) => {
            format!("{} must be less than or equal to {}", subject, bound)
        }
        Step::AssertionGreater(bound) => format!("{} must be greater than {}", subject, bound),
        Step::AssertionLess(bound) => format!("{} must be less than {}", subject, bound),
        Step::AssertionUnique => format!("{} must not contain duplicate items", subject),
        Step::AssertionDivisible(divisor) => {
            format!("{} must be a multiple of {}", subject, divisor)
        }

        Step::AnnotationEmit(_) => format!(
            "The keyword at {} annotated {} with {}",
            location(evaluate_path),
            lowercase(&subject),
            annotation
        ),
        Step::AnnotationToParent(_) | Step::AnnotationBasenameToParent => format!(
            "The keyword at {} annotated the parent of {} with {}",
            location(evaluate_path),
            lowercase(&subject),
            annotation
        ),

        Step::LogicalOr { .. } => format!(
            "{} must match at least one of the given subschemas",
            subject
        ),
        Step::LogicalAnd { .. } => format!("{} must match every given subschema", subject),
        Step::LogicalXor { .. } => format!(
            "{} must match exactly one of the given subschemas",
            subject
        ),
        Step::LogicalNot { .. } => format!("{} must not match the negated subschema", subject),
        Step::LogicalTryMark { .. } => format!(
            "{} was checked against the condition of a conditional subschema",
            subject
        ),
        Step::LogicalWhenType { value, .. } => format!(
            "{} must match the given subschemas when it is of type {}",
            subject, value
        ),
        Step::LogicalWhenDefines { property, .. } => format!(
            "{} must match the given subschemas when it defines the property \"{}\"",
            subject, property
        ),
        Step::LogicalWhenAdjacentMarked { .. } => format!(
            "{} must match the subschema that applies when the condition holds",
            subject
        ),
        Step::LogicalWhenAdjacentUnmarked { .. } => format!(
            "{} must match the subschema that applies when the condition does not hold",
            subject
        ),
        Step::LogicalWhenArraySizeGreater { size, .. } => format!(
            "{} must match the given subschemas when it has more than {} items",
            subject, size
        ),
        Step::LogicalWhenArraySizeEqual { size, .. } => format!(
            "{} must match the given subschemas when it has exactly {} items",
            subject, size
        ),

        Step::LoopProperties { .. } => {
            format!("Every property of {} must match the subschema", lowercase(&subject))
        }
        Step::LoopPropertiesMatch { index, .. } => format!(
            "The properties {} of {} must match their subschemas",
            quoted(index.keys()),
            lowercase(&subject)
        ),
        Step::LoopPropertiesRegex { pattern, .. } => format!(
            "Every property of {} whose name matches \"{}\" must match the subschema",
            lowercase(&subject),
            pattern.source()
        ),
        Step::LoopPropertiesNoAdjacentAnnotation { keywords, .. } => format!(
            "Every property of {} not covered by {} must match the subschema",
            lowercase(&subject),
            quoted(keywords)
        ),
        Step::LoopPropertiesNoAnnotation { .. } => format!(
            "Every property of {} not evaluated elsewhere must match the subschema",
            lowercase(&subject)
        ),
        Step::LoopKeys { .. } => format!(
            "Every property name of {} must match the subschema",
            lowercase(&subject)
        ),
        Step::LoopItems { start: 0, .. } => {
            format!("Every item of {} must match the subschema", lowercase(&subject))
        }
        Step::LoopItems { start, .. } => format!(
            "Every item of {} from position {} onwards must match the subschema",
            lowercase(&subject),
            start
        ),
        Step::LoopItemsUnmarked { .. } | Step::LoopItemsUnevaluated { .. } => format!(
            "Every item of {} not evaluated elsewhere must match the subschema",
            lowercase(&subject)
        ),
        Step::LoopContains { range, .. } => format!(
            "{} must contain {} matching the subschema",
            subject,
            count(range, "item", "items")
        ),

        Step::ControlLabel { .. } | Step::ControlMark { .. } | Step::ControlJump { .. } => {
            format!("{} must match the referenced schema", subject)
        }
        Step::ControlDynamicAnchorJump { anchor } if anchor.is_empty() => {
            format!("{} must match the recursively referenced schema", subject)
        }
        Step::ControlDynamicAnchorJump { anchor } => format!(
            "{} must match the schema behind the dynamic anchor \"{}\"",
            subject, anchor
        ),
    }
}

fn subject(instance_location: &Pointer) -> String {
    if instance_location.is_empty() {
        "The instance".to_owned()
    } else {
        format!("The value at {}", instance_location)
    }
}

fn location(pointer: &Pointer) -> String {
    if pointer.is_empty() {
        "the root".to_owned()
    } else {
        pointer.to_string()
    }
}

fn lowercase(subject: &str) -> String {
    let mut chars = subject.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn with_actual(message: String, valid: bool, actual: Option<JsonType>) -> String {
    match actual {
        Some(actual) if !valid => format!("{} but it was of type {}", message, actual),
        _ => message,
    }
}

fn quoted<I>(items: I) -> String
where
    I: IntoIterator,
    I::Item: Display,
{
    items
        .into_iter()
        .map(|item| format!("\"{}\"", item))
        .collect::<Vec<_>>()
        .join(", ")
}

fn either<'a>(types: impl IntoIterator<Item = &'a JsonType>) -> String {
    let names: Vec<&str> = types.into_iter().map(|json_type| json_type.name()).collect();
    match names.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} or {}", rest.join(", "), last),
        Some((last, _)) => (*last).to_owned(),
        None => String::new(),
    }
}

fn count(range: &Range, one: &str, many: &str) -> String {
    let unit = |n: usize| if n == 1 { one } else { many };
    match range.maximum {
        None => format!("at least {} {}", range.minimum, unit(range.minimum)),
        Some(maximum) if maximum == range.minimum => format!("exactly {} {}", maximum, unit(maximum)),
        Some(maximum) if range.minimum == 0 => format!("at most {} {}", maximum, unit(maximum)),
        Some(maximum) => format!("between {} and {} {}", range.minimum, maximum, many),
    }
}

fn bounds(range: &Range, unit: &str) -> String {
    match (range.minimum, range.maximum) {
        (0, None) => "of any size".to_owned(),
        (minimum, None) => format!("of at least {} {}", minimum, unit),
        (0, Some(maximum)) => format!("of at most {} {}", maximum, unit),
        (minimum, Some(maximum)) => format!("of {} to {} {}", minimum, maximum, unit),
    }
}
