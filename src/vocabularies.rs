//! Dialects and vocabularies.
//!
//! A dialect is identified by the URI of its metaschema. Official dialects
//! have fixed vocabulary sets. Custom metaschemas are fetched through the
//! resolver and followed, through their own `$schema`, until an official
//! dialect (the *base dialect*) is found.

use crate::errors::SchemaError;
use crate::resolver::Resolver;
use crate::uri;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

/// A set of vocabularies, each marked as required (`true`) or optional.
pub type Vocabularies = BTreeMap<String, bool>;

pub const DRAFT4: &str = "http://json-schema.org/draft-04/schema";
pub const DRAFT4_HYPERSCHEMA: &str = "http://json-schema.org/draft-04/hyper-schema";
pub const DRAFT6: &str = "http://json-schema.org/draft-06/schema";
pub const DRAFT6_HYPERSCHEMA: &str = "http://json-schema.org/draft-06/hyper-schema";
pub const DRAFT7: &str = "http://json-schema.org/draft-07/schema";
pub const DRAFT7_HYPERSCHEMA: &str = "http://json-schema.org/draft-07/hyper-schema";
pub const DRAFT2019_09: &str = "https://json-schema.org/draft/2019-09/schema";
pub const DRAFT2019_09_HYPERSCHEMA: &str = "https://json-schema.org/draft/2019-09/hyper-schema";
pub const DRAFT2020_12: &str = "https://json-schema.org/draft/2020-12/schema";
pub const DRAFT2020_12_HYPERSCHEMA: &str = "https://json-schema.org/draft/2020-12/hyper-schema";

pub const VOCABULARY_2019_09_CORE: &str = "https://json-schema.org/draft/2019-09/vocab/core";
pub const VOCABULARY_2019_09_APPLICATOR: &str =
    "https://json-schema.org/draft/2019-09/vocab/applicator";
pub const VOCABULARY_2019_09_VALIDATION: &str =
    "https://json-schema.org/draft/2019-09/vocab/validation";
pub const VOCABULARY_2019_09_META_DATA: &str =
    "https://json-schema.org/draft/2019-09/vocab/meta-data";
pub const VOCABULARY_2019_09_FORMAT: &str = "https://json-schema.org/draft/2019-09/vocab/format";
pub const VOCABULARY_2019_09_CONTENT: &str = "https://json-schema.org/draft/2019-09/vocab/content";
pub const VOCABULARY_2019_09_HYPERSCHEMA: &str =
    "https://json-schema.org/draft/2019-09/vocab/hyper-schema";

pub const VOCABULARY_2020_12_CORE: &str = "https://json-schema.org/draft/2020-12/vocab/core";
pub const VOCABULARY_2020_12_APPLICATOR: &str =
    "https://json-schema.org/draft/2020-12/vocab/applicator";
pub const VOCABULARY_2020_12_UNEVALUATED: &str =
    "https://json-schema.org/draft/2020-12/vocab/unevaluated";
pub const VOCABULARY_2020_12_VALIDATION: &str =
    "https://json-schema.org/draft/2020-12/vocab/validation";
pub const VOCABULARY_2020_12_META_DATA: &str =
    "https://json-schema.org/draft/2020-12/vocab/meta-data";
pub const VOCABULARY_2020_12_FORMAT_ANNOTATION: &str =
    "https://json-schema.org/draft/2020-12/vocab/format-annotation";
pub const VOCABULARY_2020_12_FORMAT_ASSERTION: &str =
    "https://json-schema.org/draft/2020-12/vocab/format-assertion";
pub const VOCABULARY_2020_12_CONTENT: &str = "https://json-schema.org/draft/2020-12/vocab/content";
pub const VOCABULARY_2020_12_HYPERSCHEMA: &str =
    "https://json-schema.org/draft/2020-12/vocab/hyper-schema";

const KNOWN_VOCABULARIES: &[&str] = &[
    VOCABULARY_2019_09_CORE,
    VOCABULARY_2019_09_APPLICATOR,
    VOCABULARY_2019_09_VALIDATION,
    VOCABULARY_2019_09_META_DATA,
    VOCABULARY_2019_09_FORMAT,
    VOCABULARY_2019_09_CONTENT,
    VOCABULARY_2019_09_HYPERSCHEMA,
    VOCABULARY_2020_12_CORE,
    VOCABULARY_2020_12_APPLICATOR,
    VOCABULARY_2020_12_UNEVALUATED,
    VOCABULARY_2020_12_VALIDATION,
    VOCABULARY_2020_12_META_DATA,
    VOCABULARY_2020_12_FORMAT_ANNOTATION,
    VOCABULARY_2020_12_FORMAT_ASSERTION,
    VOCABULARY_2020_12_CONTENT,
    VOCABULARY_2020_12_HYPERSCHEMA,
];

/// The official base dialect an official dialect URI belongs to.
fn official_base_dialect(dialect: &str) -> Option<&'static str> {
    match dialect {
        DRAFT4 | DRAFT4_HYPERSCHEMA => Some(DRAFT4),
        DRAFT6 | DRAFT6_HYPERSCHEMA => Some(DRAFT6),
        DRAFT7 | DRAFT7_HYPERSCHEMA => Some(DRAFT7),
        DRAFT2019_09 | DRAFT2019_09_HYPERSCHEMA => Some(DRAFT2019_09),
        DRAFT2020_12 | DRAFT2020_12_HYPERSCHEMA => Some(DRAFT2020_12),
        _ => None,
    }
}

fn official_vocabularies(dialect: &str) -> Option<Vocabularies> {
    let (required, optional): (&[&str], &[&str]) = match dialect {
        DRAFT4 | DRAFT4_HYPERSCHEMA => (&[DRAFT4], &[]),
        DRAFT6 | DRAFT6_HYPERSCHEMA => (&[DRAFT6], &[]),
        DRAFT7 | DRAFT7_HYPERSCHEMA => (&[DRAFT7], &[]),
        DRAFT2019_09 => (
            &[
                VOCABULARY_2019_09_CORE,
                VOCABULARY_2019_09_APPLICATOR,
                VOCABULARY_2019_09_VALIDATION,
                VOCABULARY_2019_09_META_DATA,
                VOCABULARY_2019_09_CONTENT,
            ],
            &[VOCABULARY_2019_09_FORMAT],
        ),
        DRAFT2019_09_HYPERSCHEMA => (
            &[
                VOCABULARY_2019_09_CORE,
                VOCABULARY_2019_09_APPLICATOR,
                VOCABULARY_2019_09_VALIDATION,
                VOCABULARY_2019_09_META_DATA,
                VOCABULARY_2019_09_CONTENT,
                VOCABULARY_2019_09_HYPERSCHEMA,
            ],
            &[VOCABULARY_2019_09_FORMAT],
        ),
        DRAFT2020_12 => (
            &[
                VOCABULARY_2020_12_CORE,
                VOCABULARY_2020_12_APPLICATOR,
                VOCABULARY_2020_12_UNEVALUATED,
                VOCABULARY_2020_12_VALIDATION,
                VOCABULARY_2020_12_META_DATA,
                VOCABULARY_2020_12_FORMAT_ANNOTATION,
                VOCABULARY_2020_12_CONTENT,
            ],
            &[],
        ),
        DRAFT2020_12_HYPERSCHEMA => (
            &[
                VOCABULARY_2020_12_CORE,
                VOCABULARY_2020_12_APPLICATOR,
                VOCABULARY_2020_12_UNEVALUATED,
                VOCABULARY_2020_12_VALIDATION,
                VOCABULARY_2020_12_META_DATA,
                VOCABULARY_2020_12_FORMAT_ANNOTATION,
                VOCABULARY_2020_12_CONTENT,
                VOCABULARY_2020_12_HYPERSCHEMA,
            ],
            &[],
        ),
        _ => return None,
    };

    let mut vocabularies = Vocabularies::new();
    for vocabulary in required {
        vocabularies.insert((*vocabulary).to_owned(), true);
    }

    for vocabulary in optional {
        vocabularies.insert((*vocabulary).to_owned(), false);
    }

    Some(vocabularies)
}

/// Whether a base dialect predates vocabularies (drafts 4, 6 and 7).
pub fn is_legacy(base_dialect: &str) -> bool {
    base_dialect == DRAFT4 || base_dialect == DRAFT6 || base_dialect == DRAFT7
}

/// The dialect a schema declares through `$schema`, falling back to a
/// default. The result is canonical.
pub fn dialect(schema: &Value, default: Option<&str>) -> Option<String> {
    schema
        .get("$schema")
        .and_then(Value::as_str)
        .or(default)
        .map(uri::canonicalize)
}

/// The keyword a base dialect uses for identifiers.
pub fn id_keyword(base_dialect: &str) -> &'static str {
    if base_dialect == DRAFT4 {
        "id"
    } else {
        "$id"
    }
}

/// The identifier a schema declares, if any.
///
/// Up to draft 7, an identifier next to `$ref` is ignored, as all other
/// siblings of `$ref` are.
pub fn identify<'a>(schema: &'a Value, base_dialect: &str) -> Option<&'a str> {
    if is_legacy(base_dialect) && schema.get("$ref").is_some() {
        return None;
    }

    schema.get(id_keyword(base_dialect)).and_then(Value::as_str)
}

fn fetch_metaschema(dialect: &str, resolver: &dyn Resolver) -> Result<Value, SchemaError> {
    resolver.resolve(dialect).ok_or_else(|| SchemaError::Reference {
        uri: dialect.to_owned(),
    })
}

/// The official dialect at the end of a chain of metaschemas.
pub fn base_dialect(dialect: &str, resolver: &dyn Resolver) -> Result<String, SchemaError> {
    let mut current = uri::canonicalize(dialect);
    let mut seen = HashSet::new();

    loop {
        if let Some(base) = official_base_dialect(&current) {
            return Ok(base.to_owned());
        }

        if !seen.insert(current.clone()) {
            return Err(SchemaError::BaseDialect { dialect: current });
        }

        let metaschema = fetch_metaschema(&current, resolver)?;
        current = match metaschema.get("$schema").and_then(Value::as_str) {
            Some(next) => uri::canonicalize(next),
            None => return Err(SchemaError::BaseDialect { dialect: current }),
        };
    }
}

/// The vocabularies a dialect makes available.
///
/// Custom metaschemas of 2019-09 and later declare them through
/// `$vocabulary`. When they do not, the vocabularies of their own metaschema
/// apply. Older dialects have a single vocabulary named after the dialect.
pub fn vocabularies(dialect: &str, resolver: &dyn Resolver) -> Result<Vocabularies, SchemaError> {
    let dialect = uri::canonicalize(dialect);
    let base = base_dialect(&dialect, resolver)?;
    let mut current = dialect;

    loop {
        if let Some(vocabularies) = official_vocabularies(&current) {
            return Ok(vocabularies);
        }

        if is_legacy(&base) {
            let mut vocabularies = Vocabularies::new();
            vocabularies.insert(base, true);
            return Ok(vocabularies);
        }

        let metaschema = fetch_metaschema(&current, resolver)?;
        if let Some(declared) = metaschema.get("$vocabulary").and_then(Value::as_object) {
            let mut vocabularies = Vocabularies::new();
            for (vocabulary, required) in declared {
                let required = required.as_bool().unwrap_or(false);
                if required && !KNOWN_VOCABULARIES.contains(&vocabulary.as_str()) {
                    warn!(%vocabulary, dialect = %current, "unsupported required vocabulary");
                }

                vocabularies.insert(uri::canonicalize(vocabulary), required);
            }

            return Ok(vocabularies);
        }

        // base_dialect already walked this chain, so it terminates.
        current = match metaschema.get("$schema").and_then(Value::as_str) {
            Some(next) => uri::canonicalize(next),
            None => return Err(SchemaError::BaseDialect { dialect: current }),
        };
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resolver::{null_resolver, MapResolver};
    use serde_json::json;

    #[test]
    fn official_dialects() -> Result<(), SchemaError> {
        assert_eq!(
            DRAFT7,
            base_dialect("http://json-schema.org/draft-07/schema#", &null_resolver)?
        );
        assert_eq!(
            DRAFT2020_12,
            base_dialect(DRAFT2020_12_HYPERSCHEMA, &null_resolver)?
        );

        let modern = vocabularies(DRAFT2019_09, &null_resolver)?;
        assert_eq!(Some(&true), modern.get(VOCABULARY_2019_09_APPLICATOR));
        assert_eq!(Some(&false), modern.get(VOCABULARY_2019_09_FORMAT));

        let legacy = vocabularies(DRAFT4, &null_resolver)?;
        assert_eq!(1, legacy.len());
        Ok(())
    }

    #[test]
    fn custom_metaschemas() -> Result<(), SchemaError> {
        let mut resolver = MapResolver::new();
        resolver.add(json!({
            "$id": "https://example.com/meta",
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "$vocabulary": {
                "https://json-schema.org/draft/2020-12/vocab/core": true,
                "https://json-schema.org/draft/2020-12/vocab/validation": true
            }
        }));
        resolver.add(json!({
            "$id": "https://example.com/meta-child",
            "$schema": "https://example.com/meta"
        }));

        assert_eq!(
            DRAFT2020_12,
            base_dialect("https://example.com/meta-child", &resolver)?
        );

        let custom = vocabularies("https://example.com/meta-child", &resolver)?;
        assert_eq!(2, custom.len());
        assert!(!custom.contains_key(VOCABULARY_2020_12_APPLICATOR));
        Ok(())
    }

    #[test]
    fn unknown_dialects() {
        assert_eq!(
            Err(SchemaError::Reference {
                uri: "https://example.com/unknown".to_owned()
            }),
            base_dialect("https://example.com/unknown", &null_resolver)
        );

        let mut resolver = MapResolver::new();
        resolver.add(json!({"$id": "https://example.com/self", "$schema": "https://example.com/self"}));
        assert_eq!(
            Err(SchemaError::BaseDialect {
                dialect: "https://example.com/self".to_owned()
            }),
            base_dialect("https://example.com/self", &resolver)
        );
    }

    #[test]
    fn legacy_identifiers() {
        assert_eq!(Some("a"), identify(&json!({"id": "a"}), DRAFT4));
        assert_eq!(None, identify(&json!({"$id": "a", "$ref": "#"}), DRAFT7));
        assert_eq!(Some("a"), identify(&json!({"$id": "a", "$ref": "#"}), DRAFT2020_12));
    }
}
