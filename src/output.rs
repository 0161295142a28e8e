//! Collect readable failure reports while evaluating.

use crate::describe::describe;
use crate::evaluator::{evaluate_with_callback, EvaluationMode, EvaluationPhase};
use crate::pointer::Pointer;
use crate::template::{Category, Instruction, Template};
use serde::Serialize;
use serde_json::Value;

/// A single reason an instance failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorTraceEntry {
    pub message: String,
    pub instance_location: Pointer,
    pub evaluate_path: Pointer,
    pub keyword_location: String,
}

/// An evaluation callback that keeps the most specific failures.
///
/// A failure is dropped when a failure below it, in both the evaluation path
/// and the instance, was already recorded. Every failure below an instruction
/// that ends up passing (a branch of `anyOf`, the subschema of `not`, and so on) is
/// forgotten.
///
/// ```
/// use jsonschema_template::{Compiler, CompilerConfig, ErrorTraceOutput, EvaluationMode};
/// use jsonschema_template::resolver::null_resolver;
/// use serde_json::json;
/// use failure::Error;
///
/// fn main() -> Result<(), Error> {
///     let mut config = CompilerConfig::new();
///     config.default_dialect(Some("https://json-schema.org/draft/2020-12/schema".to_owned()));
///     let template = Compiler::new_with_config(config)
///         .compile(&json!({"properties": {"foo": {"type": "string"}}}), &null_resolver)?;
///
///     let instance = json!({"foo": 1});
///     let mut output = ErrorTraceOutput::new(&instance);
///     assert!(!output.evaluate(&template, EvaluationMode::Fast));
///
///     let entries = output.entries();
///     assert_eq!(1, entries.len());
///     assert_eq!("/foo", entries[0].instance_location.to_string());
///     assert_eq!(
///         "The value at /foo must be of type string but it was of type integer",
///         entries[0].message
///     );
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ErrorTraceOutput<'i> {
    instance: &'i Value,
    entries: Vec<ErrorTraceEntry>,
}

impl<'i> ErrorTraceOutput<'i> {
    pub fn new(instance: &'i Value) -> Self {
        Self {
            instance,
            entries: Vec::new(),
        }
    }

    /// Evaluates the instance this output was made for.
    pub fn evaluate(&mut self, template: &Template, mode: EvaluationMode) -> bool {
        let instance = self.instance;
        evaluate_with_callback(
            template,
            instance,
            mode,
            &mut |phase, valid, instruction, evaluate_path, instance_location, annotation| {
                self.callback(
                    phase,
                    valid,
                    instruction,
                    evaluate_path,
                    instance_location,
                    annotation,
                )
            },
        )
    }

    /// Feeds one evaluation event into the output.
    pub fn callback(
        &mut self,
        phase: EvaluationPhase,
        valid: bool,
        instruction: &Instruction,
        evaluate_path: &Pointer,
        instance_location: &Pointer,
        annotation: &Value,
    ) {
        if phase == EvaluationPhase::Pre || instruction.step.category() == Category::Annotation {
            return;
        }

        let below = |entry: &ErrorTraceEntry| {
            entry.evaluate_path.starts_with(evaluate_path)
                && entry.instance_location.starts_with(instance_location)
        };

        if valid {
            self.entries.retain(|entry| !below(entry));
            return;
        }

        if self.entries.iter().any(below) {
            return;
        }

        self.entries.push(ErrorTraceEntry {
            message: describe(
                valid,
                instruction,
                evaluate_path,
                instance_location,
                self.instance,
                annotation,
            ),
            instance_location: instance_location.clone(),
            evaluate_path: evaluate_path.clone(),
            keyword_location: instruction.keyword_location.clone(),
        });
    }

    pub fn entries(&self) -> &[ErrorTraceEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ErrorTraceEntry> {
        self.entries
    }
}
