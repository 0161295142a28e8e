use failure::Error;
use jsonschema_template::{
    evaluate_with_callback, from_json, to_json, Compiler, CompilerConfig, CompilerMode,
    ErrorTraceOutput, EvaluationMode, MapResolver,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

#[derive(Deserialize)]
struct TestSuite {
    description: String,
    #[serde(default)]
    registry: Map<String, Value>,
    schema: Value,
    tests: Vec<TestCase>,
}

#[derive(Deserialize)]
struct TestCase {
    description: String,
    data: Value,
    valid: bool,
}

const DIALECTS: &[(&str, &str)] = &[
    ("draft4", "http://json-schema.org/draft-04/schema#"),
    ("draft6", "http://json-schema.org/draft-06/schema#"),
    ("draft7", "http://json-schema.org/draft-07/schema#"),
    ("draft2019-09", "https://json-schema.org/draft/2019-09/schema"),
    ("draft2020-12", "https://json-schema.org/draft/2020-12/schema"),
];

const MODES: &[(CompilerMode, EvaluationMode)] = &[
    (CompilerMode::Optimized, EvaluationMode::Fast),
    (CompilerMode::Optimized, EvaluationMode::Exhaustive),
    (CompilerMode::Full, EvaluationMode::Fast),
    (CompilerMode::Full, EvaluationMode::Exhaustive),
];

fn run_file(path: &Path, dialect: &str) -> Result<(), Error> {
    let file = fs::read(path)?;
    let suites: Vec<TestSuite> = serde_json::from_slice(&file)?;

    for suite in suites {
        println!("{:?}: {}", path, suite.description);

        let mut resolver = MapResolver::new();
        for (uri, schema) in suite.registry {
            resolver.insert(&uri, schema);
        }

        for (compiler_mode, evaluation_mode) in MODES {
            let mut config = CompilerConfig::new();
            config
                .mode(*compiler_mode)
                .default_dialect(Some(dialect.to_owned()));
            let template = Compiler::new_with_config(config).compile(&suite.schema, &resolver)?;
            let decoded = from_json(&to_json(&template)?)?;
            assert_eq!(template, decoded);

            for test_case in &suite.tests {
                println!(
                    "{} ({:?}, {:?})",
                    test_case.description, compiler_mode, evaluation_mode
                );

                let mut output = ErrorTraceOutput::new(&test_case.data);
                assert_eq!(
                    test_case.valid,
                    output.evaluate(&template, *evaluation_mode),
                    "{}: {}",
                    suite.description,
                    test_case.description
                );

                if test_case.valid {
                    assert!(output.entries().is_empty());
                } else {
                    assert!(!output.entries().is_empty());
                }

                let mut events = 0;
                let valid = evaluate_with_callback(
                    &decoded,
                    &test_case.data,
                    *evaluation_mode,
                    &mut |_, _, _, _, _, _| events += 1,
                );
                assert_eq!(test_case.valid, valid);
                assert_eq!(0, events % 2);
            }
        }
    }

    Ok(())
}

#[test]
fn suite() -> Result<(), Error> {
    for (directory, dialect) in DIALECTS {
        let test_files = fs::read_dir(Path::new("tests/suite").join(directory))?;
        for entry in test_files {
            run_file(&entry?.path(), dialect)?;
        }
    }

    Ok(())
}
