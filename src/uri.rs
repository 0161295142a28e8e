//! URI handling for schema identifiers and references.
//!
//! Absolute URIs go through the `url` crate, which gives a canonical form
//! (lowercase scheme and host, resolved dot segments). Schemas with no
//! absolute `$id` live under the empty base URI, so their locations are plain
//! fragments like `#/$defs/a`.

use crate::errors::SchemaError;
use url::Url;

/// Resolves a reference against a base URI.
///
/// The result is canonical and keeps the fragment of the reference, if any.
pub fn resolve(base: &str, reference: &str) -> Result<String, SchemaError> {
    if let Ok(url) = Url::parse(reference) {
        return Ok(canonicalize_url(url));
    }

    if base.is_empty() {
        return Ok(canonicalize(reference));
    }

    let base = Url::parse(base).map_err(|_| SchemaError::Uri {
        uri: base.to_owned(),
    })?;

    let url = base.join(reference).map_err(|_| SchemaError::Uri {
        uri: reference.to_owned(),
    })?;

    Ok(canonicalize_url(url))
}

/// The canonical form of a URI. An empty fragment is dropped.
pub fn canonicalize(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(url) => canonicalize_url(url),
        Err(_) => uri.strip_suffix('#').unwrap_or(uri).to_owned(),
    }
}

fn canonicalize_url(mut url: Url) -> String {
    if url.fragment() == Some("") {
        url.set_fragment(None);
    }

    url.to_string()
}

/// Splits a URI into the part before the fragment and the (still encoded)
/// fragment.
pub fn split_fragment(uri: &str) -> (&str, Option<&str>) {
    match uri.find('#') {
        Some(index) => (&uri[..index], Some(&uri[index + 1..])),
        None => (uri, None),
    }
}

/// A URI without its fragment.
pub fn strip_fragment(uri: &str) -> &str {
    split_fragment(uri).0
}

/// Appends a fragment to a base URI. Empty fragments are left out.
pub fn with_fragment(base: &str, fragment: &str) -> String {
    if fragment.is_empty() {
        base.to_owned()
    } else {
        format!("{}#{}", base, fragment)
    }
}

/// Decodes `%XX` escapes in a URI fragment.
///
/// Invalid escapes are kept as they are.
pub fn percent_decode(fragment: &str) -> String {
    let bytes = fragment.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' && index + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[index + 1..index + 3]).ok();
            if let Some(byte) = hex.and_then(|hex| u8::from_str_radix(hex, 16).ok()) {
                decoded.push(byte);
                index += 3;
                continue;
            }
        }

        decoded.push(bytes[index]);
        index += 1;
    }

    String::from_utf8_lossy(&decoded).into_owned()
}

/// Whether a string is an absolute URI.
pub fn is_absolute(uri: &str) -> bool {
    Url::parse(uri).is_ok()
}
