//! Peephole rewrites of compiled templates.
//!
//! Every rewrite keeps the validation outcome of the template. They may change
//! which instructions evaluation callbacks hear about, which is why full
//! templates skip them.

use crate::json::JsonType;
use crate::template::{Instruction, Range, Step, Template};
use std::collections::BTreeSet;
use std::mem;
use tracing::debug;

#[derive(Debug, Default)]
struct Statistics {
    merged: usize,
    inlined: usize,
    unguarded: usize,
}

pub(crate) fn optimize(template: &mut Template) {
    let mut statistics = Statistics::default();
    optimize_sequence(template, true, &mut statistics);
    debug!(
        merged = statistics.merged,
        inlined = statistics.inlined,
        unguarded = statistics.unguarded,
        "optimized template"
    );
}

/// Rewrites a sequence of siblings, children first. `conjunction` tells
/// whether the siblings all have to pass, as opposed to being alternatives
/// or positional branches.
fn optimize_sequence(template: &mut Template, conjunction: bool, statistics: &mut Statistics) {
    for instruction in template.iter_mut() {
        let nested = instruction.step.is_conjunction();
        if let Some(children) = instruction.step.children_mut() {
            optimize_sequence(children, nested, statistics);
        }
    }

    if conjunction {
        unguard(template, statistics);
    }

    inline(template, conjunction, statistics);

    if conjunction {
        merge(template, statistics);
    }
}

/// The type an instruction asserts, when passing implies that a type guard
/// for it would pass too.
fn asserted_type(step: &Step) -> Option<JsonType> {
    match step {
        Step::AssertionType(json_type) => Some(*json_type),
        Step::AssertionTypeStrict(json_type)
            if *json_type != JsonType::Integer && *json_type != JsonType::Real =>
        {
            Some(*json_type)
        }
        Step::AssertionTypeStringBounded(_) => Some(JsonType::String),
        Step::AssertionTypeArrayBounded(_) => Some(JsonType::Array),
        Step::AssertionTypeObjectBounded(_) => Some(JsonType::Object),
        _ => None,
    }
}

/// Drops type guards that an earlier sibling already asserts.
fn unguard(template: &mut Template, statistics: &mut Statistics) {
    for index in 0..template.len() {
        let guarded = match &template[index].step {
            Step::LogicalWhenType { value, .. } => *value,
            _ => continue,
        };

        let location = &template[index].relative_instance_location;
        let asserted = template[..index].iter().any(|sibling| {
            sibling.relative_instance_location == *location
                && asserted_type(&sibling.step) == Some(guarded)
        });

        if !asserted {
            continue;
        }

        let instruction = &mut template[index];
        if let Step::LogicalWhenType { children, .. } = &mut instruction.step {
            let children = mem::take(children);
            instruction.step = Step::LogicalAnd { children };
            statistics.unguarded += 1;
        }
    }
}

/// Replaces conjunctions of a single instruction with that instruction, and
/// drops empty ones where they cannot change the outcome.
fn inline(template: &mut Template, conjunction: bool, statistics: &mut Statistics) {
    let mut result = Vec::with_capacity(template.len());
    for mut instruction in template.drain(..) {
        let children = match &mut instruction.step {
            Step::LogicalAnd { children } if !instruction.dynamic => children,
            _ => {
                result.push(instruction);
                continue;
            }
        };

        match children.len() {
            0 if conjunction => statistics.inlined += 1,
            1 => {
                let mut child = children.remove(0);
                child.relative_schema_location = instruction
                    .relative_schema_location
                    .concat(&child.relative_schema_location);
                child.relative_instance_location = instruction
                    .relative_instance_location
                    .concat(&child.relative_instance_location);
                statistics.inlined += 1;
                result.push(child);
            }
            _ => result.push(instruction),
        }
    }

    *template = result;
}

fn bounded(json_type: JsonType, range: Range) -> Option<Step> {
    match json_type {
        JsonType::String => Some(Step::AssertionTypeStringBounded(range)),
        JsonType::Array => Some(Step::AssertionTypeArrayBounded(range)),
        JsonType::Object => Some(Step::AssertionTypeObjectBounded(range)),
        _ => None,
    }
}

/// The size limit a step places on values of a type, as `(minimum, maximum)`.
fn size_limit(json_type: JsonType, step: &Step) -> Option<(Option<usize>, Option<usize>)> {
    let (less, greater) = match (json_type, step) {
        (JsonType::String, Step::AssertionStringSizeLess(size))
        | (JsonType::Array, Step::AssertionArraySizeLess(size))
        | (JsonType::Object, Step::AssertionObjectSizeLess(size)) => (Some(*size), None),
        (JsonType::String, Step::AssertionStringSizeGreater(size))
        | (JsonType::Array, Step::AssertionArraySizeGreater(size))
        | (JsonType::Object, Step::AssertionObjectSizeGreater(size)) => (None, Some(*size)),
        _ => return None,
    };

    match (less, greater) {
        (Some(0), _) => None,
        (Some(less), _) => Some((None, Some(less - 1))),
        (_, Some(greater)) => Some((greater.checked_add(1), None)),
        _ => None,
    }
}

/// Folds size assertions into an earlier type assertion on the same value,
/// and gathers required properties into a single assertion.
fn merge(template: &mut Template, statistics: &mut Statistics) {
    let mut result: Template = Vec::with_capacity(template.len());
    for instruction in template.drain(..) {
        if merge_into(&mut result, &instruction) {
            statistics.merged += 1;
        } else {
            result.push(instruction);
        }
    }

    *template = result;
}

fn merge_into(previous: &mut [Instruction], instruction: &Instruction) -> bool {
    let location = &instruction.relative_instance_location;
    for target in previous.iter_mut() {
        if target.relative_instance_location != *location || target.dynamic != instruction.dynamic {
            continue;
        }

        if let Some(step) = merged(&target.step, &instruction.step) {
            target.step = step;
            return true;
        }
    }

    false
}

fn merged(target: &Step, step: &Step) -> Option<Step> {
    match (target, step) {
        (Step::AssertionDefines(left), Step::AssertionDefines(right)) => {
            let properties: BTreeSet<String> = vec![left.clone(), right.clone()].into_iter().collect();
            Some(Step::AssertionDefinesAll(properties))
        }
        (Step::AssertionDefines(one), Step::AssertionDefinesAll(many))
        | (Step::AssertionDefinesAll(many), Step::AssertionDefines(one)) => {
            let mut properties = many.clone();
            properties.insert(one.clone());
            Some(Step::AssertionDefinesAll(properties))
        }
        (Step::AssertionDefinesAll(left), Step::AssertionDefinesAll(right)) => {
            Some(Step::AssertionDefinesAll(left.union(right).cloned().collect()))
        }
        (target, step) => {
            let (json_type, range) = match target {
                Step::AssertionType(json_type) | Step::AssertionTypeStrict(json_type) => {
                    (*json_type, Range::default())
                }
                Step::AssertionTypeStringBounded(range) => (JsonType::String, *range),
                Step::AssertionTypeArrayBounded(range) => (JsonType::Array, *range),
                Step::AssertionTypeObjectBounded(range) => (JsonType::Object, *range),
                _ => return None,
            };

            let (minimum, maximum) = size_limit(json_type, step)?;
            let range = Range {
                minimum: minimum.map_or(range.minimum, |minimum| minimum.max(range.minimum)),
                maximum: match (maximum, range.maximum) {
                    (Some(left), Some(right)) => Some(left.min(right)),
                    (left, right) => left.or(right),
                },
                exhaustive: false,
            };

            bounded(json_type, range)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pointer::Pointer;
    use pretty_assertions::assert_eq;

    fn at(step: Step, schema: &str, instance: &str) -> Instruction {
        Instruction {
            step,
            relative_schema_location: Pointer::parse(schema).expect("pointer"),
            relative_instance_location: Pointer::parse(instance).expect("pointer"),
            keyword_location: format!("#{}", schema),
            schema_resource: String::new(),
            dynamic: false,
            report: true,
        }
    }

    fn steps(template: &[Instruction]) -> Vec<Step> {
        template.iter().map(|instruction| instruction.step.clone()).collect()
    }

    #[test]
    fn type_and_sizes() {
        let mut template = vec![
            at(Step::AssertionType(JsonType::String), "/type", ""),
            at(Step::AssertionStringSizeLess(6), "/maxLength", ""),
            at(Step::AssertionStringSizeGreater(1), "/minLength", ""),
            at(Step::AssertionArraySizeLess(3), "/maxItems", ""),
        ];
        optimize(&mut template);

        assert_eq!(
            vec![
                Step::AssertionTypeStringBounded(Range {
                    minimum: 2,
                    maximum: Some(5),
                    exhaustive: false,
                }),
                Step::AssertionArraySizeLess(3),
            ],
            steps(&template)
        );
    }

    #[test]
    fn sizes_elsewhere_stay() {
        let mut template = vec![
            at(Step::AssertionType(JsonType::Object), "/type", ""),
            at(Step::AssertionObjectSizeLess(2), "/maxProperties", "/foo"),
        ];
        optimize(&mut template);
        assert_eq!(2, template.len());
    }

    #[test]
    fn required_properties() {
        let mut template = vec![
            at(Step::AssertionDefines("a".to_owned()), "/required", ""),
            at(Step::AssertionDefines("b".to_owned()), "/dependentRequired/a", ""),
        ];
        optimize(&mut template);

        assert_eq!(
            vec![Step::AssertionDefinesAll(
                vec!["a".to_owned(), "b".to_owned()].into_iter().collect()
            )],
            steps(&template)
        );
    }

    #[test]
    fn single_conjunctions() {
        let mut template = vec![
            at(
                Step::LogicalAnd {
                    children: vec![at(Step::AssertionType(JsonType::Null), "/type", "")],
                },
                "/$ref",
                "",
            ),
            at(Step::LogicalAnd { children: Vec::new() }, "/allOf", ""),
        ];
        optimize(&mut template);

        assert_eq!(vec![Step::AssertionType(JsonType::Null)], steps(&template));
        assert_eq!("/$ref/type", template[0].relative_schema_location.to_string());
    }

    #[test]
    fn alternatives_keep_their_branches() {
        let branch = |children| at(Step::LogicalAnd { children }, "", "");
        let mut template = vec![at(
            Step::LogicalOr {
                exhaustive: false,
                children: vec![
                    branch(Vec::new()),
                    branch(vec![at(Step::AssertionType(JsonType::Null), "/1/type", "")]),
                ],
            },
            "/anyOf",
            "",
        )];
        optimize(&mut template);

        let children = template[0].children();
        assert_eq!(2, children.len());
        assert_eq!(Step::LogicalAnd { children: Vec::new() }, children[0].step);
        assert_eq!(Step::AssertionType(JsonType::Null), children[1].step);
    }

    #[test]
    fn redundant_type_guards() {
        let guard = Step::LogicalWhenType {
            value: JsonType::Object,
            children: vec![
                at(Step::AssertionFail, "/a", "/a"),
                at(Step::AssertionFail, "/b", "/b"),
            ],
        };

        let mut template = vec![
            at(Step::AssertionType(JsonType::Object), "/type", ""),
            at(guard.clone(), "/properties", ""),
        ];
        optimize(&mut template);
        match &template[1].step {
            Step::LogicalAnd { children } => assert_eq!(2, children.len()),
            step => panic!("unexpected step {:?}", step),
        }

        let mut template = vec![
            at(Step::AssertionType(JsonType::Array), "/type", ""),
            at(guard, "/properties", ""),
        ];
        optimize(&mut template);
        assert_eq!("when-type", template[1].step.name());
    }
}
