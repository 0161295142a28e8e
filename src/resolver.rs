//! Fetching external schema documents.
//!
//! The compiler never performs I/O on its own. Whenever a reference leaves
//! the documents it already knows, or a custom metaschema is needed to work
//! out a dialect, it asks a [`Resolver`](trait.Resolver.html).

use crate::uri;
use serde_json::Value;
use std::collections::HashMap;

/// Turns an absolute URI into a schema document.
///
/// Returning `None` means the URI is unknown. That is only an error if the
/// compiler actually needs the document.
pub trait Resolver {
    fn resolve(&self, uri: &str) -> Option<Value>;
}

impl<F> Resolver for F
where
    F: Fn(&str) -> Option<Value>,
{
    fn resolve(&self, uri: &str) -> Option<Value> {
        self(uri)
    }
}

/// A resolver that knows no documents at all.
pub fn null_resolver(_uri: &str) -> Option<Value> {
    None
}

/// An in-memory resolver, keyed by canonical URI.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MapResolver {
    schemas: HashMap<String, Value>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema under an explicit URI.
    pub fn insert(&mut self, uri: &str, schema: Value) -> &mut Self {
        self.schemas
            .insert(uri::canonicalize(uri::strip_fragment(uri)), schema);
        self
    }

    /// Registers a schema under its own `$id` (or `id`). Returns `false` if
    /// the schema does not declare an absolute identifier.
    pub fn add(&mut self, schema: Value) -> bool {
        let id = schema
            .get("$id")
            .or_else(|| schema.get("id"))
            .and_then(Value::as_str)
            .filter(|id| uri::is_absolute(id))
            .map(ToOwned::to_owned);

        match id {
            Some(id) => {
                self.insert(&id, schema);
                true
            }
            None => false,
        }
    }
}

impl Resolver for MapResolver {
    fn resolve(&self, uri: &str) -> Option<Value> {
        self.schemas.get(&uri::canonicalize(uri)).cloned()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn map_resolver() {
        let mut resolver = MapResolver::new();
        assert!(resolver.add(json!({"$id": "https://example.com/a", "type": "string"})));
        assert!(!resolver.add(json!({"$id": "relative", "type": "string"})));
        resolver.insert("https://example.com/b#", json!(true));

        assert_eq!(
            Some(json!({"$id": "https://example.com/a", "type": "string"})),
            resolver.resolve("https://example.com/a")
        );
        assert_eq!(Some(json!(true)), resolver.resolve("https://example.com/b"));
        assert_eq!(None, resolver.resolve("https://example.com/c"));
    }

    #[test]
    fn closures() {
        let resolver = |uri: &str| {
            if uri == "https://example.com/a" {
                Some(json!({}))
            } else {
                None
            }
        };

        assert_eq!(Some(json!({})), resolver.resolve("https://example.com/a"));
        assert_eq!(None, null_resolver.resolve("https://example.com/a"));
    }
}
