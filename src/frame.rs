//! The reference frame of a schema.
//!
//! A frame indexes every addressable location of a schema, and of every
//! external document it references, by canonical URI: schema resources
//! (`$id`), anchors (`$anchor`, `$dynamicAnchor`, legacy `#foo` ids) and plain
//! JSON Pointer fragments. It also records, for every `$ref`-like keyword, the
//! canonical URI it points to.

use crate::errors::SchemaError;
use crate::pointer::Pointer;
use crate::resolver::Resolver;
use crate::uri;
use crate::vocabularies::{self as vocab, Vocabularies};
use crate::walker::{subschemas, SubschemaEntry, Walker};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, trace, warn};

/// What kind of location a frame entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// The root of a schema resource.
    Resource,
    /// A plain-name fragment.
    Anchor,
    /// A `$dynamicAnchor`. It also acts as a plain-name fragment.
    DynamicAnchor,
    /// A JSON Pointer fragment.
    Pointer,
}

/// A location of the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameEntry {
    pub kind: EntryKind,
    /// The document the location belongs to, as an index into the frame's
    /// documents.
    pub document: usize,
    /// The absolute location within the document.
    pub pointer: Pointer,
    /// The base URI of the schema resource that encloses the location.
    pub base: String,
    /// The location relative to the root of its schema resource.
    pub relative_pointer: Pointer,
    pub dialect: String,
    pub base_dialect: String,
}

/// How a reference keyword resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReferenceKind {
    /// `$ref`.
    Static,
    /// `$dynamicRef`.
    Dynamic,
    /// `$recursiveRef`.
    Recursive,
}

impl ReferenceKind {
    pub fn keyword(self) -> &'static str {
        match self {
            ReferenceKind::Static => "$ref",
            ReferenceKind::Dynamic => "$dynamicRef",
            ReferenceKind::Recursive => "$recursiveRef",
        }
    }
}

/// A resolved reference keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// The canonical URI the reference points to.
    pub destination: String,
    /// The destination without its fragment.
    pub base: String,
    /// The decoded fragment of the destination, if any.
    pub fragment: Option<String>,
    /// The reference as written in the schema.
    pub original: String,
    /// The dialect in effect where the reference was written.
    pub dialect: String,
}

type ReferenceKey = (usize, Pointer, ReferenceKind);

/// The index of every addressable location of a schema.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    documents: Vec<Value>,
    entries: BTreeMap<String, FrameEntry>,
    locations: HashMap<(usize, Pointer), FrameEntry>,
    references: BTreeMap<ReferenceKey, Reference>,
    vocabularies: HashMap<String, Vocabularies>,
    recursive_anchors: BTreeSet<String>,
    keywords: HashSet<String>,
    root: String,
}

/// The canonical form of a URI that may carry a fragment, with the fragment
/// percent-decoded.
fn key(reference: &str) -> String {
    let (base, fragment) = uri::split_fragment(reference);
    let base = uri::canonicalize(base);
    match fragment {
        Some(fragment) => uri::with_fragment(&base, &uri::percent_decode(fragment)),
        None => base,
    }
}

/// Every location below `pointer` in a JSON document, in pre-order.
fn collect_locations(value: &Value, pointer: &mut Pointer, locations: &mut Vec<Pointer>) {
    match value {
        Value::Object(object) => {
            for (property, member) in object {
                pointer.push(property.as_str());
                locations.push(pointer.clone());
                collect_locations(member, pointer, locations);
                pointer.pop();
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                pointer.push(index);
                locations.push(pointer.clone());
                collect_locations(item, pointer, locations);
                pointer.pop();
            }
        }
        _ => {}
    }
}

impl Frame {
    /// Builds the frame of a schema, fetching referenced external documents
    /// through the resolver.
    pub fn build(
        schema: &Value,
        walker: &dyn Walker,
        resolver: &dyn Resolver,
        default_dialect: Option<&str>,
    ) -> Result<Frame, SchemaError> {
        let mut frame = Frame::default();
        frame.root = frame.absorb(schema.clone(), None, default_dialect, walker, resolver)?;

        let mut attempted: HashSet<String> = HashSet::new();
        loop {
            let missing: Vec<(String, String)> = frame
                .references
                .values()
                .filter(|reference| !reference.base.is_empty())
                .filter(|reference| !frame.entries.contains_key(&reference.base))
                .filter(|reference| !attempted.contains(&reference.base))
                .map(|reference| (reference.base.clone(), reference.dialect.clone()))
                .collect();

            if missing.is_empty() {
                break;
            }

            for (base, dialect) in missing {
                if !attempted.insert(base.clone()) || frame.entries.contains_key(&base) {
                    continue;
                }

                match resolver.resolve(&base) {
                    Some(document) => {
                        debug!(uri = %base, "absorbing external schema");
                        frame.absorb(document, Some(&base), Some(&dialect), walker, resolver)?;
                    }
                    None => debug!(uri = %base, "could not resolve external schema"),
                }
            }
        }

        Ok(frame)
    }

    /// Indexes one document. Returns the base URI of its root.
    fn absorb(
        &mut self,
        document: Value,
        default_id: Option<&str>,
        default_dialect: Option<&str>,
        walker: &dyn Walker,
        resolver: &dyn Resolver,
    ) -> Result<String, SchemaError> {
        let index = self.documents.len();
        let walked = subschemas(&document, walker, resolver, default_dialect)?;

        let mut root_base = default_id.map(uri::canonicalize).unwrap_or_default();
        if let Some(root) = walked.first() {
            if let Some(id) = vocab::identify(&document, &root.base_dialect) {
                root_base = uri::canonicalize(uri::strip_fragment(&uri::resolve(&root_base, id)?));
            }
        }

        // (resource root within the document, base URI), outermost first
        let mut resources: Vec<(Pointer, String)> = Vec::new();
        let mut every_resource: Vec<(Pointer, String)> = Vec::new();

        for subschema in &walked {
            let value = match subschema.pointer.get(&document) {
                Some(value) => value,
                None => continue,
            };

            self.vocabularies
                .entry(subschema.dialect.clone())
                .or_insert_with(|| subschema.vocabularies.clone());

            while let Some((root, _)) = resources.last() {
                if subschema.pointer.starts_with(root) {
                    break;
                }
                resources.pop();
            }

            let current_base = resources
                .last()
                .map(|(_, base)| base.clone())
                .unwrap_or_else(|| root_base.clone());

            let mut legacy_anchor = None;
            if subschema.pointer.is_empty() {
                resources.push((Pointer::new(), root_base.clone()));
                every_resource.push((Pointer::new(), root_base.clone()));
                self.register(&root_base, EntryKind::Resource, index, subschema, &root_base, Pointer::new());
                if let Some(id) = vocab::identify(value, &subschema.base_dialect) {
                    legacy_anchor = uri::split_fragment(id).1.map(ToOwned::to_owned);
                }
            } else if let Some(id) = vocab::identify(value, &subschema.base_dialect) {
                let resolved = uri::resolve(&current_base, id)?;
                let (base, fragment) = uri::split_fragment(&resolved);
                if !id.starts_with('#') {
                    let base = uri::canonicalize(base);
                    resources.push((subschema.pointer.clone(), base.clone()));
                    every_resource.push((subschema.pointer.clone(), base.clone()));
                    self.register(&base, EntryKind::Resource, index, subschema, &base, Pointer::new());
                }

                legacy_anchor = fragment.map(ToOwned::to_owned);
            }

            let (resource_root, base) = resources
                .last()
                .cloned()
                .unwrap_or_else(|| (Pointer::new(), root_base.clone()));
            let relative = Pointer::from_tokens(subschema.pointer.tokens()[resource_root.len()..].to_vec());

            if vocab::is_legacy(&subschema.base_dialect) {
                if let Some(anchor) = legacy_anchor.filter(|anchor| !anchor.is_empty() && !anchor.starts_with('/')) {
                    let uri = uri::with_fragment(&base, &anchor);
                    self.register(&uri, EntryKind::Anchor, index, subschema, &base, relative.clone());
                }
            } else if let Some(object) = value.as_object() {
                if let Some(anchor) = object.get("$anchor").and_then(Value::as_str) {
                    let uri = uri::with_fragment(&base, anchor);
                    self.register(&uri, EntryKind::Anchor, index, subschema, &base, relative.clone());
                }

                if subschema.base_dialect == vocab::DRAFT2020_12 {
                    if let Some(anchor) = object.get("$dynamicAnchor").and_then(Value::as_str) {
                        let uri = uri::with_fragment(&base, anchor);
                        self.register(&uri, EntryKind::DynamicAnchor, index, subschema, &base, relative.clone());
                    }
                } else if object.get("$recursiveAnchor") == Some(&Value::Bool(true))
                    && relative.is_empty()
                {
                    self.recursive_anchors.insert(base.clone());
                }
            }

            // Every enclosing resource can address this location by pointer.
            for (root, enclosing) in &resources {
                let relative_to_enclosing =
                    Pointer::from_tokens(subschema.pointer.tokens()[root.len()..].to_vec());
                if relative_to_enclosing.is_empty() {
                    continue;
                }

                let uri = uri::with_fragment(enclosing, &relative_to_enclosing.to_string());
                self.register(&uri, EntryKind::Pointer, index, subschema, enclosing, relative_to_enclosing);
            }

            let innermost = FrameEntry {
                kind: if relative.is_empty() {
                    EntryKind::Resource
                } else {
                    EntryKind::Pointer
                },
                document: index,
                pointer: subschema.pointer.clone(),
                base: base.clone(),
                relative_pointer: relative,
                dialect: subschema.dialect.clone(),
                base_dialect: subschema.base_dialect.clone(),
            };
            self.locations
                .insert((index, subschema.pointer.clone()), innermost);

            if let Some(object) = value.as_object() {
                self.keywords.extend(object.keys().cloned());
                self.record_references(index, subschema, object, &base)?;
            }
        }

        self.absorb_unwalked(index, &document, &walked, &every_resource);
        self.documents.push(document);
        Ok(root_base)
    }

    /// Makes the locations the walker does not visit, such as the members of
    /// `definitions` in 2019-09 and later, addressable by pointer.
    ///
    /// They take the dialect of the closest walked subschema above them. They
    /// never introduce resources or anchors.
    fn absorb_unwalked(
        &mut self,
        index: usize,
        document: &Value,
        walked: &[SubschemaEntry],
        every_resource: &[(Pointer, String)],
    ) {
        let mut pointers = Vec::new();
        collect_locations(document, &mut Pointer::new(), &mut pointers);

        for pointer in pointers {
            if self.locations.contains_key(&(index, pointer.clone())) {
                continue;
            }

            let owner = match walked
                .iter()
                .filter(|subschema| pointer.starts_with(&subschema.pointer))
                .max_by_key(|subschema| subschema.pointer.len())
            {
                Some(owner) => owner,
                None => continue,
            };
            let subschema = SubschemaEntry {
                pointer: pointer.clone(),
                orphan: true,
                ..owner.clone()
            };

            let mut enclosing: Vec<&(Pointer, String)> = every_resource
                .iter()
                .filter(|(root, _)| pointer.starts_with(root))
                .collect();
            enclosing.sort_by_key(|(root, _)| root.len());

            for (root, base) in &enclosing {
                let relative = Pointer::from_tokens(pointer.tokens()[root.len()..].to_vec());
                let uri = uri::with_fragment(base, &relative.to_string());
                self.register(&uri, EntryKind::Pointer, index, &subschema, base, relative);
            }

            let (root, base) = match enclosing.last() {
                Some(innermost) => (*innermost).clone(),
                None => continue,
            };
            self.locations.insert(
                (index, pointer.clone()),
                FrameEntry {
                    kind: EntryKind::Pointer,
                    document: index,
                    pointer: pointer.clone(),
                    base: base.clone(),
                    relative_pointer: Pointer::from_tokens(pointer.tokens()[root.len()..].to_vec()),
                    dialect: subschema.dialect.clone(),
                    base_dialect: subschema.base_dialect.clone(),
                },
            );

            if let Some(object) = pointer.get(document).and_then(Value::as_object) {
                self.keywords.extend(object.keys().cloned());
                if let Err(error) = self.record_references(index, &subschema, object, &base) {
                    debug!(location = %pointer, %error, "ignoring reference outside of a subschema");
                }
            }
        }
    }

    fn record_references(
        &mut self,
        document: usize,
        subschema: &SubschemaEntry,
        object: &serde_json::Map<String, Value>,
        base: &str,
    ) -> Result<(), SchemaError> {
        let kinds: &[ReferenceKind] = if subschema.base_dialect == vocab::DRAFT2020_12 {
            &[ReferenceKind::Static, ReferenceKind::Dynamic]
        } else if subschema.base_dialect == vocab::DRAFT2019_09 {
            &[ReferenceKind::Static, ReferenceKind::Recursive]
        } else {
            &[ReferenceKind::Static]
        };

        for kind in kinds {
            let original = match object.get(kind.keyword()).and_then(Value::as_str) {
                Some(original) => original,
                None => continue,
            };

            let destination = key(&uri::resolve(base, original)?);
            let (destination_base, fragment) = uri::split_fragment(&destination);
            let reference = Reference {
                base: destination_base.to_owned(),
                fragment: fragment.map(ToOwned::to_owned),
                destination: destination.clone(),
                original: original.to_owned(),
                dialect: subschema.dialect.clone(),
            };

            self.references.insert(
                (document, subschema.pointer.join(kind.keyword()), *kind),
                reference,
            );
        }

        Ok(())
    }

    fn register(
        &mut self,
        uri: &str,
        kind: EntryKind,
        document: usize,
        subschema: &SubschemaEntry,
        base: &str,
        relative_pointer: Pointer,
    ) {
        if let Some(existing) = self.entries.get(uri) {
            if existing.document != document || existing.pointer != subschema.pointer {
                warn!(%uri, "ignoring duplicate schema location");
            }
            return;
        }

        trace!(%uri, ?kind, "registering frame entry");
        self.entries.insert(
            uri.to_owned(),
            FrameEntry {
                kind,
                document,
                pointer: subschema.pointer.clone(),
                base: base.to_owned(),
                relative_pointer,
                dialect: subschema.dialect.clone(),
                base_dialect: subschema.base_dialect.clone(),
            },
        );
    }

    /// The base URI of the root schema. Empty for schemas without an
    /// absolute identifier.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Looks up a location by URI.
    pub fn get(&self, uri: &str) -> Option<&FrameEntry> {
        self.entries.get(&key(uri))
    }

    pub fn defines(&self, uri: &str) -> bool {
        self.get(uri).is_some()
    }

    /// The innermost entry for a location of a document.
    pub fn location(&self, document: usize, pointer: &Pointer) -> Option<&FrameEntry> {
        self.locations.get(&(document, pointer.clone()))
    }

    /// The reference made by the keyword at the given location.
    pub fn reference(
        &self,
        document: usize,
        keyword_location: &Pointer,
        kind: ReferenceKind,
    ) -> Option<&Reference> {
        self.references
            .get(&(document, keyword_location.clone(), kind))
    }

    pub fn document(&self, index: usize) -> Option<&Value> {
        self.documents.get(index)
    }

    /// The subschema a frame entry points to.
    pub fn traverse(&self, entry: &FrameEntry) -> Option<&Value> {
        self.document(entry.document)
            .and_then(|document| entry.pointer.get(document))
    }

    pub fn vocabularies(&self, dialect: &str) -> Option<&Vocabularies> {
        self.vocabularies.get(dialect)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &FrameEntry)> {
        self.entries.iter()
    }

    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.references.values()
    }

    /// Resources whose root declares `"$recursiveAnchor": true`.
    pub fn recursive_anchors(&self) -> impl Iterator<Item = &String> {
        self.recursive_anchors.iter()
    }

    /// Whether a resource declares a dynamic anchor of the given name.
    /// The empty name stands for `$recursiveAnchor`.
    pub fn has_dynamic_anchor(&self, resource: &str, anchor: &str) -> bool {
        if anchor.is_empty() {
            return self.recursive_anchors.contains(resource);
        }

        self.entries
            .get(&uri::with_fragment(resource, anchor))
            .map_or(false, |entry| entry.kind == EntryKind::DynamicAnchor)
    }

    /// Whether any keyword with this name appears anywhere in the frame.
    pub fn uses_keyword(&self, keyword: &str) -> bool {
        self.keywords.contains(keyword)
    }

    /// Whether evaluation needs to track dynamic scopes.
    pub fn uses_dynamic_scopes(&self) -> bool {
        !self.recursive_anchors.is_empty()
            || self
                .entries
                .values()
                .any(|entry| entry.kind == EntryKind::DynamicAnchor)
            || self
                .references
                .keys()
                .any(|(_, _, kind)| *kind != ReferenceKind::Static)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resolver::{null_resolver, MapResolver};
    use crate::walker::default_schema_walker;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn build(schema: &Value, resolver: &dyn Resolver) -> Result<Frame, SchemaError> {
        Frame::build(schema, &default_schema_walker, resolver, None)
    }

    fn entry<'a>(frame: &'a Frame, uri: &str) -> &'a FrameEntry {
        frame.get(uri).expect(uri)
    }

    #[test]
    fn anonymous_pointers() -> Result<(), SchemaError> {
        let frame = build(
            &json!({
                "$schema": "https://json-schema.org/draft/2020-12/schema",
                "properties": {"foo bar": {"type": "string"}},
                "$defs": {"a": {"$anchor": "x"}}
            }),
            &null_resolver,
        )?;

        assert_eq!("", frame.root());
        assert_eq!(EntryKind::Resource, entry(&frame, "").kind);
        assert_eq!(
            Pointer::parse("/properties/foo bar")?,
            entry(&frame, "#/properties/foo%20bar").pointer
        );
        assert_eq!(EntryKind::Anchor, entry(&frame, "#x").kind);
        assert_eq!(Pointer::parse("/$defs/a")?, entry(&frame, "#x").pointer);
        assert!(!frame.defines("#/properties/missing"));
        Ok(())
    }

    #[test]
    fn nested_resources() -> Result<(), SchemaError> {
        let frame = build(
            &json!({
                "$schema": "https://json-schema.org/draft/2020-12/schema",
                "$id": "https://example.com/root.json",
                "items": {
                    "$id": "item.json",
                    "properties": {"a": {"$dynamicAnchor": "meta"}}
                },
                "properties": {"b": {"$ref": "item.json#/properties/a"}}
            }),
            &null_resolver,
        )?;

        assert_eq!("https://example.com/root.json", frame.root());

        let item = entry(&frame, "https://example.com/item.json");
        assert_eq!(EntryKind::Resource, item.kind);
        assert_eq!(Pointer::parse("/items")?, item.pointer);

        let through_root = entry(&frame, "https://example.com/root.json#/items/properties/a");
        let through_item = entry(&frame, "https://example.com/item.json#/properties/a");
        assert_eq!(through_root.pointer, through_item.pointer);
        assert_eq!("https://example.com/item.json", through_item.base);
        assert_eq!(Pointer::parse("/properties/a")?, through_item.relative_pointer);

        assert!(frame.has_dynamic_anchor("https://example.com/item.json", "meta"));
        assert!(frame.uses_dynamic_scopes());

        let reference = frame
            .reference(0, &Pointer::parse("/properties/b/$ref")?, ReferenceKind::Static)
            .expect("reference");
        assert_eq!(
            "https://example.com/item.json#/properties/a",
            reference.destination
        );
        Ok(())
    }

    #[test]
    fn legacy_identifiers() -> Result<(), SchemaError> {
        let frame = build(
            &json!({
                "$schema": "http://json-schema.org/draft-04/schema#",
                "id": "http://example.com/root.json",
                "definitions": {
                    "a": {"id": "#foo"},
                    "b": {"id": "other.json", "$ref": "#/definitions/a"},
                    "c": {"id": "nested.json"}
                }
            }),
            &null_resolver,
        )?;

        assert_eq!(EntryKind::Anchor, entry(&frame, "http://example.com/root.json#foo").kind);
        assert!(!frame.defines("http://example.com/other.json"));
        assert!(frame.defines("http://example.com/nested.json"));
        Ok(())
    }

    #[test]
    fn external_documents() -> Result<(), SchemaError> {
        let mut resolver = MapResolver::new();
        resolver.add(json!({
            "$id": "https://example.com/string.json",
            "$defs": {"s": {"type": "string"}}
        }));

        let frame = build(
            &json!({
                "$schema": "https://json-schema.org/draft/2020-12/schema",
                "$ref": "https://example.com/string.json#/$defs/s",
                "properties": {"x": {"$ref": "https://example.com/missing.json"}}
            }),
            &resolver,
        )?;

        let entry = entry(&frame, "https://example.com/string.json#/$defs/s");
        assert_eq!(1, entry.document);
        assert_eq!(vocab::DRAFT2020_12, entry.dialect);
        assert!(!frame.defines("https://example.com/missing.json"));
        Ok(())
    }

    #[test]
    fn locations_outside_subschemas() -> Result<(), SchemaError> {
        let frame = build(
            &json!({
                "$schema": "https://json-schema.org/draft/2020-12/schema",
                "$id": "https://example.com/root.json",
                "definitions": {
                    "middle": {"$ref": "#/definitions/string"},
                    "string": {"type": "string"}
                },
                "$ref": "#/definitions/middle"
            }),
            &null_resolver,
        )?;

        let middle = entry(&frame, "https://example.com/root.json#/definitions/middle");
        assert_eq!(EntryKind::Pointer, middle.kind);
        assert_eq!(vocab::DRAFT2020_12, middle.dialect);
        assert!(frame.defines("https://example.com/root.json#/definitions"));
        assert!(frame.defines("https://example.com/root.json#/definitions/middle/$ref"));
        assert!(frame
            .location(0, &Pointer::parse("/definitions/string")?)
            .is_some());

        let reference = frame
            .reference(
                0,
                &Pointer::parse("/definitions/middle/$ref")?,
                ReferenceKind::Static,
            )
            .expect("reference");
        assert_eq!(
            "https://example.com/root.json#/definitions/string",
            reference.destination
        );
        Ok(())
    }

    #[test]
    fn missing_dialect() {
        assert_eq!(
            Some(SchemaError::Dialect),
            build(&json!({"type": "string"}), &null_resolver).err()
        );
    }
}
