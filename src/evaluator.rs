//! Evaluate instances against compiled templates.
//!
//! Evaluation is total: every instance, whatever its shape, yields a boolean.
//! There is no error type here.
//!
//! See the docs for [`Evaluator`](struct.Evaluator.html) for more.

use crate::pointer::Pointer;
use crate::template::{Instruction, Template};
use crate::vm;
use serde_json::{Map, Value};

/// How much work evaluation does once the outcome is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvaluationMode {
    /// Stop at the first failure of a conjunction and at the first success of
    /// a disjunction.
    Fast,
    /// Evaluate everything, so that callbacks hear about every instruction.
    Exhaustive,
}

impl Default for EvaluationMode {
    fn default() -> Self {
        EvaluationMode::Fast
    }
}

/// When an evaluation callback is called for an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvaluationPhase {
    Pre,
    Post,
}

/// Evaluates an instance in fast mode.
pub fn evaluate(template: &Template, instance: &Value) -> bool {
    vm::evaluate(template, instance, EvaluationMode::Fast, None).0
}

/// Evaluates an instance, calling `callback` before and after every reported
/// instruction.
///
/// The callback receives the phase, the outcome so far (always `true` in the
/// `Pre` phase), the instruction, its evaluation path, its instance location
/// and the annotation it emitted, which is `null` for anything that is not an
/// annotation.
pub fn evaluate_with_callback(
    template: &Template,
    instance: &Value,
    mode: EvaluationMode,
    callback: &mut dyn FnMut(EvaluationPhase, bool, &Instruction, &Pointer, &Pointer, &Value),
) -> bool {
    vm::evaluate(template, instance, mode, Some(callback)).0
}

/// Evaluates instances against templates.
#[derive(Debug, Default, Eq, PartialEq, Clone, Hash)]
pub struct Evaluator {
    config: Config,
}

impl Evaluator {
    /// Constructs a new evaluator using the default configuration.
    pub fn new() -> Self {
        Self::new_with_config(Config::default())
    }

    /// Constructs a new evaluator using a configuration.
    pub fn new_with_config(config: Config) -> Self {
        Self { config }
    }

    /// Evaluate an instance against a template.
    pub fn evaluate(&self, template: &Template, instance: &Value) -> Evaluation {
        let mode = if self.config.collect_annotations {
            EvaluationMode::Exhaustive
        } else {
            self.config.mode
        };

        let (valid, annotations) = vm::evaluate(template, instance, mode, None);
        let annotations = if valid && self.config.collect_annotations {
            let mut output = Map::new();
            for annotation in annotations {
                let by_path = output
                    .entry(annotation.instance_location.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));

                if let Value::Object(by_path) = by_path {
                    let values = by_path
                        .entry(annotation.evaluate_path.to_string())
                        .or_insert_with(|| Value::Array(Vec::new()));

                    if let Value::Array(values) = values {
                        values.push(annotation.value);
                    }
                }
            }
            Some(Value::Object(output))
        } else {
            None
        };

        Evaluation { valid, annotations }
    }
}

/// Configuration for how evaluation should proceed.
#[derive(Debug, Default, Eq, PartialEq, Clone, Hash)]
pub struct Config {
    mode: EvaluationMode,
    collect_annotations: bool,
}

impl Config {
    /// Create a new, default `Config`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the evaluation mode. The default is
    /// [`EvaluationMode::Fast`](enum.EvaluationMode.html).
    pub fn mode(&mut self, mode: EvaluationMode) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Sets whether to return the annotations of valid instances. Collecting
    /// annotations evaluates exhaustively whatever the mode.
    pub fn collect_annotations(&mut self, collect_annotations: bool) -> &mut Self {
        self.collect_annotations = collect_annotations;
        self
    }
}

/// The outcome of evaluating an instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    valid: bool,
    annotations: Option<Value>,
}

impl Evaluation {
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The annotations, keyed by instance location and then by evaluation
    /// path. Only present for valid instances when collection is enabled.
    pub fn annotations(&self) -> Option<&Value> {
        self.annotations.as_ref()
    }
}
