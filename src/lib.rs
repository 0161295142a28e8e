//! `jsonschema-template` compiles [JSON Schema][json-schema] documents into
//! templates: flat, self-contained lists of instructions that can be
//! evaluated against any number of JSON instances.
//!
//! Drafts 4, 6, 7, 2019-09 and 2020-12 are supported, including `$ref` cycles,
//! `$dynamicRef`, `$recursiveRef`, `unevaluatedProperties` and
//! `unevaluatedItems`.
//!
//! # Validating data
//!
//! Compile once, evaluate many times:
//!
//! ```
//! use serde_json::json;
//! use jsonschema_template::{evaluate, Compiler, CompilerConfig, ErrorTraceOutput, EvaluationMode};
//! use jsonschema_template::resolver::null_resolver;
//! use failure::Error;
//!
//! fn main() -> Result<(), Error> {
//!     let schema = json!({
//!         "$schema": "https://json-schema.org/draft/2020-12/schema",
//!         "properties": {
//!             "name": { "type": "string" },
//!             "age": { "type": "integer", "minimum": 0 },
//!             "phones": {
//!                 "items": { "type": "string" }
//!             }
//!         },
//!         "required": ["name"]
//!     });
//!
//!     // Schemas that reference other documents get them through a resolver.
//!     // This one does not, so the null resolver is enough.
//!     let template = Compiler::new().compile(&schema, &null_resolver)?;
//!
//!     let input_ok = json!({
//!         "name": "John Doe",
//!         "age": 43,
//!         "phones": ["+44 1234567", "+44 2345678"]
//!     });
//!     assert!(evaluate(&template, &input_ok));
//!
//!     let input_bad = json!({
//!         "age": "43",
//!         "phones": ["+44 1234567", 442345678]
//!     });
//!     assert!(!evaluate(&template, &input_bad));
//!
//!     // To find out why an instance is invalid, compile every keyword into
//!     // its own instruction and collect an error trace.
//!     let mut config = CompilerConfig::new();
//!     config.mode(jsonschema_template::CompilerMode::Full);
//!     let template = Compiler::new_with_config(config).compile(&schema, &null_resolver)?;
//!
//!     let mut output = ErrorTraceOutput::new(&input_bad);
//!     assert!(!output.evaluate(&template, EvaluationMode::Exhaustive));
//!
//!     let mut entries: Vec<(String, String)> = output
//!         .entries()
//!         .iter()
//!         .map(|entry| (entry.instance_location.to_string(), entry.evaluate_path.to_string()))
//!         .collect();
//!     entries.sort();
//!
//!     assert_eq!(
//!         entries,
//!         vec![
//!             ("".to_owned(), "/required".to_owned()),
//!             ("/age".to_owned(), "/properties/age/type".to_owned()),
//!             ("/phones/1".to_owned(), "/properties/phones/items/type".to_owned()),
//!         ]
//!     );
//!
//!     Ok(())
//! }
//! ```
//!
//! The paths in an [`ErrorTraceEntry`](output/struct.ErrorTraceEntry.html)
//! are [`Pointer`s](pointer/struct.Pointer.html). The instance location points
//! into the instance, and the evaluate path is the route evaluation took
//! through the schema, references included.
//!
//! # Storing templates
//!
//! Templates do not borrow from the schema they came from. They can be kept
//! around, shared between threads, and turned into JSON with
//! [`to_json`](serializer/fn.to_json.html) and back with
//! [`from_json`](serializer/fn.from_json.html).
//!
//! [json-schema]: https://json-schema.org

mod vm;

pub mod compiler;
pub mod decimal;
pub mod describe;
pub mod errors;
pub mod evaluator;
pub mod frame;
pub mod json;
pub mod output;
pub mod pointer;
pub mod resolver;
pub mod serializer;
pub mod template;
pub mod uri;
pub mod vocabularies;
pub mod walker;

pub use crate::compiler::{compile, Compiler, CompilerMode, Config as CompilerConfig};
pub use crate::describe::describe;
pub use crate::errors::SchemaError;
pub use crate::evaluator::{
    evaluate, evaluate_with_callback, Config as EvaluatorConfig, Evaluation, EvaluationMode,
    EvaluationPhase, Evaluator,
};
pub use crate::output::{ErrorTraceEntry, ErrorTraceOutput};
pub use crate::pointer::Pointer;
pub use crate::resolver::{MapResolver, Resolver};
pub use crate::serializer::{compiler_template_format_compare, from_json, to_json};
pub use crate::template::{Instruction, Step, Template};
pub use crate::walker::{default_schema_walker, Walker};
