use crate::decimal::Decimal;
use crate::evaluator::{EvaluationMode, EvaluationPhase};
use crate::json::{self, JsonType};
use crate::pointer::{Pointer, Token};
use crate::template::{self, Instruction, ItemsEvaluation, Range, Step, Template};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::convert::TryFrom;

pub(crate) type Callback<'f> =
    dyn FnMut(EvaluationPhase, bool, &Instruction, &Pointer, &Pointer, &Value) + 'f;

/// A value some instruction emitted while evaluating.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Annotation {
    pub instance_location: Pointer,
    pub evaluate_path: Pointer,
    pub keyword_location: String,
    pub value: Value,
}

pub(crate) fn evaluate(
    template: &Template,
    instance: &Value,
    mode: EvaluationMode,
    callback: Option<&mut Callback>,
) -> (bool, Vec<Annotation>) {
    let mut vm = Vm {
        mode,
        callback,
        evaluate_path: Pointer::new(),
        instance_location: Pointer::new(),
        resources: Vec::new(),
        labels: HashMap::new(),
        active: HashSet::new(),
        marks: HashMap::new(),
        annotations: Vec::new(),
    };

    let valid = vm.evaluate_all(template, instance);
    (valid, vm.annotations)
}

static NULL: Value = Value::Null;

struct Vm<'t, 'c, 'f> {
    mode: EvaluationMode,
    callback: Option<&'c mut Callback<'f>>,
    evaluate_path: Pointer,
    instance_location: Pointer,
    /// Schema resources in the dynamic scope, outermost first.
    resources: Vec<&'t str>,
    labels: HashMap<u64, &'t Template>,
    /// Labels being evaluated, with the instance location they were entered at.
    active: HashSet<(u64, Pointer)>,
    marks: HashMap<(u64, Pointer), bool>,
    annotations: Vec<Annotation>,
}

/// The keyword an absolute keyword location ends with.
fn keyword_of(keyword_location: &str) -> &str {
    keyword_location
        .rsplit('/')
        .next()
        .unwrap_or(keyword_location)
}

fn size_of(json_type: JsonType, value: &Value) -> Option<usize> {
    match (json_type, value) {
        (JsonType::String, Value::String(string)) => Some(json::string_length(string)),
        (JsonType::Array, Value::Array(items)) => Some(items.len()),
        (JsonType::Object, Value::Object(members)) => Some(members.len()),
        _ => None,
    }
}

/// Compares a number against a bound, passing everything that is not a number.
fn compare_number(value: &Value, test: impl Fn(&Decimal) -> bool) -> bool {
    Decimal::from_value(value).map_or(true, |number| test(&number))
}

impl<'t, 'c, 'f> Vm<'t, 'c, 'f> {
    fn fast(&self) -> bool {
        self.mode == EvaluationMode::Fast
    }

    fn report(
        &mut self,
        phase: EvaluationPhase,
        valid: bool,
        instruction: &Instruction,
        annotation: &Value,
    ) {
        if !instruction.report {
            return;
        }

        if let Some(callback) = self.callback.as_mut() {
            callback(
                phase,
                valid,
                instruction,
                &self.evaluate_path,
                &self.instance_location,
                annotation,
            );
        }
    }

    /// Evaluates instructions as a conjunction against the value at the
    /// current instance location.
    fn evaluate_all(&mut self, template: &'t [Instruction], instance: &Value) -> bool {
        let mark = self.annotations.len();
        let mut valid = true;
        for instruction in template {
            if !self.evaluate_instruction(instruction, instance) {
                valid = false;
                if self.fast() {
                    break;
                }
            }
        }

        if !valid {
            self.annotations.truncate(mark);
        }

        valid
    }

    fn evaluate_instruction(&mut self, instruction: &'t Instruction, instance: &Value) -> bool {
        let target = match instruction.relative_instance_location.get(instance) {
            Some(target) => target,
            None => return true,
        };

        let schema_depth = self.evaluate_path.len();
        let instance_depth = self.instance_location.len();
        self.evaluate_path.extend(&instruction.relative_schema_location);
        self.instance_location
            .extend(&instruction.relative_instance_location);
        if instruction.dynamic {
            self.resources.push(&instruction.schema_resource);
        }

        self.report(EvaluationPhase::Pre, true, instruction, &NULL);

        let mark = self.annotations.len();
        let valid = self.dispatch(instruction, target);
        if !valid {
            self.annotations.truncate(mark);
        }

        if instruction.report {
            let annotation = match (&instruction.step, self.annotations.get(mark)) {
                (Step::AnnotationEmit(_), Some(annotation))
                | (Step::AnnotationToParent(_), Some(annotation))
                | (Step::AnnotationBasenameToParent, Some(annotation)) => annotation.value.clone(),
                _ => Value::Null,
            };
            self.report(EvaluationPhase::Post, valid, instruction, &annotation);
        }

        if instruction.dynamic {
            self.resources.pop();
        }
        self.evaluate_path.truncate(schema_depth);
        self.instance_location.truncate(instance_depth);
        valid
    }

    fn dispatch(&mut self, instruction: &'t Instruction, target: &Value) -> bool {
        match &instruction.step {
            Step::AssertionFail => false,
            Step::AssertionDefines(property) => target
                .as_object()
                .map_or(true, |members| members.contains_key(property)),
            Step::AssertionDefinesAll(properties) => target.as_object().map_or(true, |members| {
                properties.iter().all(|property| members.contains_key(property))
            }),
            Step::AssertionType(json_type) => json_type.matches(target),
            Step::AssertionTypeStrict(json_type) => json::type_of(target) == *json_type,
            Step::AssertionTypeAny(types) => types.iter().any(|json_type| json_type.matches(target)),
            Step::AssertionTypeStrictAny(types) => types.contains(&json::type_of(target)),
            Step::AssertionTypeStringBounded(range) => bounded(JsonType::String, range, target),
            Step::AssertionTypeArrayBounded(range) => bounded(JsonType::Array, range, target),
            Step::AssertionTypeObjectBounded(range) => bounded(JsonType::Object, range, target),
            Step::AssertionRegex(pattern) => target.as_str().map_or(true, |string| pattern.is_match(string)),
            Step::AssertionStringSizeLess(size) => {
                size_of(JsonType::String, target).map_or(true, |length| length < *size)
            }
            Step::AssertionStringSizeGreater(size) => {
                size_of(JsonType::String, target).map_or(true, |length| length > *size)
            }
            Step::AssertionArraySizeLess(size) => {
                size_of(JsonType::Array, target).map_or(true, |length| length < *size)
            }
            Step::AssertionArraySizeGreater(size) => {
                size_of(JsonType::Array, target).map_or(true, |length| length > *size)
            }
            Step::AssertionObjectSizeLess(size) => {
                size_of(JsonType::Object, target).map_or(true, |length| length < *size)
            }
            Step::AssertionObjectSizeGreater(size) => {
                size_of(JsonType::Object, target).map_or(true, |length| length > *size)
            }
            Step::AssertionEqual(value) => json::equals(value, target),
            Step::AssertionEqualsAny(values) => values.iter().any(|value| json::equals(value, target)),
            Step::AssertionGreaterEqual(bound) => compare_number(target, |number| number >= bound),
            Step::AssertionLessEqual(bound) => compare_number(target, |number| number <= bound),
            Step::AssertionGreater(bound) => compare_number(target, |number| number > bound),
            Step::AssertionLess(bound) => compare_number(target, |number| number < bound),
            Step::AssertionUnique => target.as_array().map_or(true, |items| json::is_unique(items)),
            Step::AssertionDivisible(divisor) => {
                compare_number(target, |number| number.is_multiple_of(divisor))
            }

            Step::AnnotationEmit(value) => {
                self.annotate(self.instance_location.clone(), instruction, value.clone());
                true
            }
            Step::AnnotationToParent(value) => {
                self.annotate(self.instance_location.initial(), instruction, value.clone());
                true
            }
            Step::AnnotationBasenameToParent => {
                if let Some(basename) = self.instance_location.last().map(Token::to_value) {
                    self.annotate(self.instance_location.initial(), instruction, basename);
                }
                true
            }

            Step::LogicalOr {
                exhaustive,
                children,
            } => {
                let everything = *exhaustive || !self.fast();
                let mut valid = false;
                for child in children {
                    if self.evaluate_instruction(child, target) {
                        valid = true;
                        if !everything {
                            break;
                        }
                    }
                }
                valid
            }
            Step::LogicalAnd { children } => self.evaluate_all(children, target),
            Step::LogicalXor { children } => {
                let mut matches = 0;
                for child in children {
                    if self.evaluate_instruction(child, target) {
                        matches += 1;
                    }
                }
                matches == 1
            }
            Step::LogicalNot { children } => {
                let mark = self.annotations.len();
                let valid = !self.evaluate_all(children, target);
                self.annotations.truncate(mark);
                valid
            }
            Step::LogicalTryMark { id, children } => {
                let outcome = self.evaluate_all(children, target);
                self.marks
                    .insert((*id, self.instance_location.clone()), outcome);
                true
            }
            Step::LogicalWhenType { value, children } => {
                !value.matches(target) || self.evaluate_all(children, target)
            }
            Step::LogicalWhenDefines { property, children } => {
                let defined = target
                    .as_object()
                    .map_or(false, |members| members.contains_key(property));
                !defined || self.evaluate_all(children, target)
            }
            Step::LogicalWhenAdjacentMarked { id, children } => {
                self.mark(*id) != Some(true) || self.evaluate_all(children, target)
            }
            Step::LogicalWhenAdjacentUnmarked { id, children } => {
                self.mark(*id) != Some(false) || self.evaluate_all(children, target)
            }
            Step::LogicalWhenArraySizeGreater { size, children } => {
                let applies = target.as_array().map_or(false, |items| items.len() > *size);
                !applies || self.evaluate_all(children, target)
            }
            Step::LogicalWhenArraySizeEqual { size, children } => {
                let applies = target.as_array().map_or(false, |items| items.len() == *size);
                !applies || self.evaluate_all(children, target)
            }

            Step::LoopProperties { children } => self.loop_properties(target, |_| Some(children.as_slice())),
            Step::LoopPropertiesMatch { index, children } => self.loop_properties(target, |key| {
                index.get(key).and_then(|position| children.get(*position)).map(std::slice::from_ref)
            }),
            Step::LoopPropertiesRegex { pattern, children } => {
                self.loop_properties(target, |key| {
                    Some(children.as_slice()).filter(|_| pattern.is_match(key))
                })
            }
            Step::LoopPropertiesNoAdjacentAnnotation { keywords, children } => {
                let base = self.evaluate_path.initial();
                let covered: Vec<Pointer> = keywords
                    .iter()
                    .map(|keyword| base.join(keyword.as_str()))
                    .collect();
                let annotated = self.annotated_values(|annotation| {
                    covered
                        .iter()
                        .any(|path| annotation.evaluate_path.starts_with(path))
                });
                self.loop_properties(target, |key| {
                    Some(children.as_slice())
                        .filter(|_| !annotated.contains(&Value::String(key.to_owned())))
                })
            }
            Step::LoopPropertiesNoAnnotation { keywords, children } => {
                let annotated = self.annotated_by(keywords);
                self.loop_properties(target, |key| {
                    Some(children.as_slice())
                        .filter(|_| !annotated.contains(&Value::String(key.to_owned())))
                })
            }
            Step::LoopKeys { children } => {
                let members = match target.as_object() {
                    Some(members) => members,
                    None => return true,
                };

                let mut valid = true;
                for key in members.keys() {
                    let name = Value::String(key.clone());
                    self.instance_location.push(key.as_str());
                    let passed = self.evaluate_all(children, &name);
                    self.instance_location.pop();
                    if !passed {
                        valid = false;
                        if self.fast() {
                            break;
                        }
                    }
                }
                valid
            }
            Step::LoopItems { start, children } => self.loop_items(target, *start, &BTreeSet::new(), children),
            Step::LoopItemsUnmarked { keywords, children } => {
                if self.annotated_by(keywords).is_empty() {
                    self.loop_items(target, 0, &BTreeSet::new(), children)
                } else {
                    true
                }
            }
            Step::LoopItemsUnevaluated {
                evaluation,
                children,
            } => self.loop_unevaluated_items(target, evaluation, children),
            Step::LoopContains { range, children } => self.loop_contains(target, range, children),

            Step::ControlLabel { id, children } => {
                self.labels.entry(*id).or_insert(children);
                self.enter(*id, children, target)
            }
            Step::ControlMark { id, children } => {
                self.labels.entry(*id).or_insert(children);
                true
            }
            Step::ControlJump { id } => match self.labels.get(id) {
                Some(children) => {
                    let children = *children;
                    self.enter(*id, children, target)
                }
                None => false,
            },
            Step::ControlDynamicAnchorJump { anchor } => {
                let destination = self.resources.iter().find_map(|resource| {
                    let id = template::anchor_label(resource, anchor);
                    self.labels.get(&id).map(|children| (id, *children))
                });

                match destination {
                    Some((id, children)) => self.enter(id, children, target),
                    None => false,
                }
            }
        }
    }

    fn annotate(&mut self, instance_location: Pointer, instruction: &Instruction, value: Value) {
        self.annotations.push(Annotation {
            instance_location,
            evaluate_path: self.evaluate_path.clone(),
            keyword_location: instruction.keyword_location.clone(),
            value,
        });
    }

    fn mark(&self, id: u64) -> Option<bool> {
        self.marks
            .get(&(id, self.instance_location.clone()))
            .copied()
    }

    /// Values annotated on the current instance location by instructions
    /// matching `filter`.
    fn annotated_values(&self, filter: impl Fn(&Annotation) -> bool) -> Vec<Value> {
        self.annotations
            .iter()
            .filter(|annotation| annotation.instance_location == self.instance_location)
            .filter(|annotation| filter(annotation))
            .map(|annotation| annotation.value.clone())
            .collect()
    }

    /// Values annotated on the current instance location by the given
    /// keywords, anywhere below the schema of the current instruction.
    fn annotated_by(&self, keywords: &[String]) -> Vec<Value> {
        let base = self.evaluate_path.initial();
        self.annotated_values(|annotation| {
            annotation.evaluate_path.starts_with(&base)
                && keywords
                    .iter()
                    .any(|keyword| keyword == keyword_of(&annotation.keyword_location))
        })
    }

    /// Runs a label body, succeeding at once when the same label is already
    /// running at the same instance location.
    fn enter(&mut self, id: u64, children: &'t Template, target: &Value) -> bool {
        let key = (id, self.instance_location.clone());
        if self.active.contains(&key) {
            return true;
        }

        self.active.insert(key.clone());
        let valid = self.evaluate_all(children, target);
        self.active.remove(&key);
        valid
    }

    /// Evaluates the children `select` picks for each member of an object.
    fn loop_properties(
        &mut self,
        target: &Value,
        select: impl Fn(&str) -> Option<&'t [Instruction]>,
    ) -> bool {
        let members = match target.as_object() {
            Some(members) => members,
            None => return true,
        };

        let mut valid = true;
        for (key, value) in members {
            let children = match select(key) {
                Some(children) => children,
                None => continue,
            };

            self.instance_location.push(key.as_str());
            let passed = self.evaluate_all(children, value);
            self.instance_location.pop();
            if !passed {
                valid = false;
                if self.fast() {
                    break;
                }
            }
        }
        valid
    }

    fn loop_items(
        &mut self,
        target: &Value,
        start: usize,
        skip: &BTreeSet<usize>,
        children: &'t [Instruction],
    ) -> bool {
        let items = match target.as_array() {
            Some(items) => items,
            None => return true,
        };

        let mut valid = true;
        for (index, item) in items.iter().enumerate().skip(start) {
            if skip.contains(&index) {
                continue;
            }

            self.instance_location.push(index);
            let passed = self.evaluate_all(children, item);
            self.instance_location.pop();
            if !passed {
                valid = false;
                if self.fast() {
                    break;
                }
            }
        }
        valid
    }

    fn loop_unevaluated_items(
        &mut self,
        target: &Value,
        evaluation: &ItemsEvaluation,
        children: &'t Template,
    ) -> bool {
        if !target.is_array() {
            return true;
        }

        if self
            .annotated_by(&evaluation.mask)
            .iter()
            .any(|value| *value == Value::Bool(true))
        {
            return true;
        }

        let mut start = 0;
        for value in self.annotated_by(&evaluation.index) {
            match value {
                Value::Bool(true) => return true,
                value => {
                    if let Some(index) = value.as_u64() {
                        let next = usize::try_from(index)
                            .ok()
                            .and_then(|index| index.checked_add(1))
                            .unwrap_or(usize::MAX);
                        start = start.max(next);
                    }
                }
            }
        }

        let skip: BTreeSet<usize> = self
            .annotated_by(&evaluation.filter)
            .iter()
            .filter_map(Value::as_u64)
            .filter_map(|index| usize::try_from(index).ok())
            .collect();

        self.loop_items(target, start, &skip, children)
    }

    fn loop_contains(&mut self, target: &Value, range: &Range, children: &'t Template) -> bool {
        let items = match target.as_array() {
            Some(items) => items,
            None => return true,
        };

        let stop_early = !range.exhaustive && self.fast();
        let mut matches = 0;
        for (index, item) in items.iter().enumerate() {
            self.instance_location.push(index);
            if self.evaluate_all(children, item) {
                matches += 1;
            }
            self.instance_location.pop();

            if stop_early {
                match range.maximum {
                    None if matches >= range.minimum => break,
                    Some(maximum) if matches > maximum => break,
                    _ => {}
                }
            }
        }

        range.contains(matches)
    }
}

fn bounded(json_type: JsonType, range: &Range, target: &Value) -> bool {
    size_of(json_type, target).map_or(false, |size| range.contains(size))
}
