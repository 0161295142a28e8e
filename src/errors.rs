//! An error type for schema compilation.
//!
//! Evaluation never fails: an instance that does not satisfy a template is a
//! normal outcome, reported as `false`. Only turning a schema into a template
//! (or decoding a stored template) can go wrong.

use failure::Fail;

/// An enum of possible errors that can emerge from this crate.
#[derive(Debug, Fail, PartialEq, Clone, Eq, Hash)]
pub enum SchemaError {
    /// The dialect of a schema could not be determined.
    ///
    /// Every schema needs a dialect, either through its own `$schema` keyword
    /// or through the default dialect handed to the compiler. When neither is
    /// present, there is no way to know what the keywords mean.
    #[fail(display = "could not determine the dialect of the schema")]
    Dialect,

    /// A metaschema chain ended in a dialect this crate does not implement.
    ///
    /// Drafts 4, 6 and 7, 2019-09 and 2020-12 are supported. Custom
    /// metaschemas are fine as long as following their `$schema` keywords
    /// eventually lands on one of those.
    #[fail(display = "unsupported base dialect: {}", dialect)]
    BaseDialect { dialect: String },

    /// A reference could not be resolved.
    ///
    /// This arises when a `$ref`, `$dynamicRef` or `$recursiveRef` points to a
    /// location that is not part of the reference frame, either because the
    /// resolver did not know the external document or because the fragment
    /// does not exist inside it. Custom metaschemas the resolver cannot
    /// provide are reported the same way.
    #[fail(display = "could not resolve schema reference: {}", uri)]
    Reference { uri: String },

    /// A keyword had a value that could not be compiled.
    ///
    /// For example, a `pattern` that is not a string, or a regular expression
    /// this crate cannot compile. Compilation stops at the first such keyword;
    /// no partial template is produced.
    #[fail(
        display = "could not compile keyword {} at {}: {}",
        keyword, location, reason
    )]
    Compilation {
        keyword: String,
        location: String,
        reason: String,
    },

    /// An identifier or a reference was not a valid URI.
    #[fail(display = "invalid URI: {}", uri)]
    Uri { uri: String },

    /// A JSON document did not encode a valid template, or a template could
    /// not be encoded as JSON.
    #[fail(display = "invalid template: {}", reason)]
    Template { reason: String },
}

impl SchemaError {
    pub(crate) fn compilation(keyword: &str, location: &str, reason: &str) -> Self {
        SchemaError::Compilation {
            keyword: keyword.to_owned(),
            location: location.to_owned(),
            reason: reason.to_owned(),
        }
    }

    pub(crate) fn template(reason: impl Into<String>) -> Self {
        SchemaError::Template {
            reason: reason.into(),
        }
    }
}
