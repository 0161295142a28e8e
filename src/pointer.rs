//! JSON Pointers into schemas and instances.
//!
//! Templates store *relative* pointers, which the evaluator concatenates into
//! absolute ones as it descends. Tokens remember whether they came from an
//! object member or an array index, so instance locations print as `/foo/0`
//! and navigation does not need to guess.

use crate::errors::SchemaError;
use json_pointer::JsonPointer;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// A single step of a pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {
    Property(String),
    Index(usize),
}

impl Token {
    /// The token as a JSON value: a string for properties, a number for
    /// indexes.
    pub fn to_value(&self) -> Value {
        match self {
            Token::Property(property) => Value::String(property.clone()),
            Token::Index(index) => Value::from(*index as u64),
        }
    }

    pub fn as_property(&self) -> Option<&str> {
        match self {
            Token::Property(property) => Some(property),
            Token::Index(_) => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Property(property) => f.write_str(property),
            Token::Index(index) => write!(f, "{}", index),
        }
    }
}

impl From<&str> for Token {
    fn from(property: &str) -> Self {
        Token::Property(property.to_owned())
    }
}

impl From<String> for Token {
    fn from(property: String) -> Self {
        Token::Property(property)
    }
}

impl From<usize> for Token {
    fn from(index: usize) -> Self {
        Token::Index(index)
    }
}

/// An RFC 6901 JSON Pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pointer {
    tokens: Vec<Token>,
}

impl Pointer {
    /// The empty pointer, which points to the whole document.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    /// Parses the string form of a pointer, such as `/properties/foo`.
    ///
    /// Tokens that look like array indexes become `Token::Index`. Navigation
    /// treats an index token on an object as a property name, so this does
    /// not lose anything.
    pub fn parse(pointer: &str) -> Result<Self, SchemaError> {
        if pointer.is_empty() {
            return Ok(Self::new());
        }

        if !pointer.starts_with('/') {
            return Err(SchemaError::Uri {
                uri: pointer.to_owned(),
            });
        }

        let mut tokens = Vec::new();
        for raw in pointer[1..].split('/') {
            let token = raw.replace("~1", "/").replace("~0", "~");
            let is_index = !token.is_empty()
                && token.bytes().all(|b| b.is_ascii_digit())
                && (token == "0" || !token.starts_with('0'));

            match token.parse::<usize>() {
                Ok(index) if is_index => tokens.push(Token::Index(index)),
                _ => tokens.push(Token::Property(token)),
            }
        }

        Ok(Self { tokens })
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn last(&self) -> Option<&Token> {
        self.tokens.last()
    }

    pub fn push(&mut self, token: impl Into<Token>) {
        self.tokens.push(token.into());
    }

    pub fn pop(&mut self) -> Option<Token> {
        self.tokens.pop()
    }

    pub fn truncate(&mut self, length: usize) {
        self.tokens.truncate(length);
    }

    pub fn extend(&mut self, other: &Pointer) {
        self.tokens.extend(other.tokens.iter().cloned());
    }

    /// A new pointer with the tokens of `other` appended.
    pub fn concat(&self, other: &Pointer) -> Pointer {
        let mut result = self.clone();
        result.extend(other);
        result
    }

    /// A new pointer with one more token.
    pub fn join(&self, token: impl Into<Token>) -> Pointer {
        let mut result = self.clone();
        result.push(token);
        result
    }

    /// Every token but the last one.
    pub fn initial(&self) -> Pointer {
        let mut result = self.clone();
        result.pop();
        result
    }

    pub fn starts_with(&self, prefix: &Pointer) -> bool {
        self.tokens.starts_with(&prefix.tokens)
    }

    /// Follows this pointer into a document.
    pub fn get<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        self.tokens
            .iter()
            .try_fold(document, |current, token| step(current, token))
    }
}

/// Follows a single token into a value.
pub fn step<'a>(value: &'a Value, token: &Token) -> Option<&'a Value> {
    match (value, token) {
        (Value::Object(members), Token::Property(property)) => members.get(property),
        (Value::Object(members), Token::Index(index)) => members.get(&index.to_string()),
        (Value::Array(items), Token::Index(index)) => items.get(*index),
        (Value::Array(items), Token::Property(property)) => {
            property.parse::<usize>().ok().and_then(|index| items.get(index))
        }
        _ => None,
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let tokens: Vec<String> = self.tokens.iter().map(ToString::to_string).collect();
        write!(f, "{}", JsonPointer::new(tokens))
    }
}

impl Serialize for Pointer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<Vec<Token>> for Pointer {
    fn from(tokens: Vec<Token>) -> Self {
        Self::from_tokens(tokens)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn display_escapes() {
        let pointer = Pointer::from_tokens(vec!["a/b".into(), "c~d".into(), 3.into()]);
        assert_eq!("/a~1b/c~0d/3", pointer.to_string());
        assert_eq!("", Pointer::new().to_string());
    }

    #[test]
    fn parse() -> Result<(), SchemaError> {
        let pointer = Pointer::parse("/properties/a~1b/items/0/01")?;
        assert_eq!(
            &[
                Token::Property("properties".to_owned()),
                Token::Property("a/b".to_owned()),
                Token::Property("items".to_owned()),
                Token::Index(0),
                Token::Property("01".to_owned()),
            ],
            pointer.tokens()
        );

        assert!(Pointer::parse("foo").is_err());
        assert_eq!(Pointer::new(), Pointer::parse("")?);
        Ok(())
    }

    #[test]
    fn navigation() -> Result<(), SchemaError> {
        let document = json!({"a": [{"0": true}, {"b": 1}]});
        assert_eq!(Some(&json!(1)), Pointer::parse("/a/1/b")?.get(&document));
        assert_eq!(Some(&json!(true)), Pointer::parse("/a/0/0")?.get(&document));
        assert_eq!(None, Pointer::parse("/a/2")?.get(&document));
        assert_eq!(Some(&document), Pointer::new().get(&document));
        Ok(())
    }

    #[test]
    fn prefixes() -> Result<(), SchemaError> {
        let pointer = Pointer::parse("/allOf/0/properties")?;
        assert!(pointer.starts_with(&Pointer::parse("/allOf")?));
        assert!(!pointer.starts_with(&Pointer::parse("/anyOf")?));
        assert_eq!(Pointer::parse("/allOf/0")?, pointer.initial());
        assert_eq!(
            Pointer::parse("/allOf/0/properties/foo")?,
            pointer.join("foo")
        );
        Ok(())
    }
}
