//! Purpose: Convert one XML document into a JSON value, or report why not.
//! Exports: `convert`, `parse_element`.
//! Role: The conversion core; pure, stateless, no logging or I/O.
//! Invariants: Every input returns a result; malformed XML never panics.
//! Invariants: Failures carry the original input so callers can dead-letter it.
//! Invariants: Root layer overwrites repeated tags and ignores root attributes;
//! only the recursive layer collapses repeats into lists and folds attributes.

use roxmltree::{Document, Node};
use serde_json::{Map, Value};

use crate::core::error::{Error, ErrorKind};

// Elements nested past this depth would exhaust the recursion in
// `parse_element`; such documents are rejected up front as failures so a
// hostile message cannot abort a long-running host.
const MAX_ELEMENT_DEPTH: usize = 512;

/// Convert a single XML document into a JSON value.
///
/// The result is an object keyed by the root's direct child tags. A child
/// with element children converts through [`parse_element`]; a leaf child
/// contributes its raw text (or null when the element is empty). Repeated
/// tags at this layer overwrite earlier entries and root attributes are
/// dropped, unlike the recursive layer below. That asymmetry is deliberate
/// and pinned by tests.
pub fn convert(xml: &str) -> Result<Value, Error> {
    let doc = Document::parse(xml).map_err(|err| {
        let pos = err.pos();
        Error::new(ErrorKind::Parse)
            .with_message("invalid xml document")
            .with_pos(pos.row, pos.col)
            .with_input(xml)
            .with_source(err)
    })?;

    let root = doc.root_element();
    if exceeds_depth(root, MAX_ELEMENT_DEPTH) {
        return Err(Error::new(ErrorKind::Parse)
            .with_message("document nesting too deep")
            .with_input(xml));
    }

    let mut fields = Map::new();
    for child in root.children().filter(Node::is_element) {
        let tag = child.tag_name().name().to_string();
        let value = if has_element_children(child) {
            parse_element(child)
        } else {
            text_value(child)
        };
        fields.insert(tag, value);
    }
    Ok(Value::Object(fields))
}

/// Convert one element into a JSON value, recursively.
///
/// Attributes become `@`-prefixed string entries. Child elements insert
/// under their tag in document order; a repeated tag turns the entry into a
/// flat list. A childless, attributeless element with nonblank text
/// collapses to that trimmed text instead of an empty object.
pub fn parse_element(node: Node<'_, '_>) -> Value {
    let mut parsed = Map::new();

    for attr in node.attributes() {
        parsed.insert(
            format!("@{}", attr.name()),
            Value::String(attr.value().to_string()),
        );
    }

    for child in node.children().filter(Node::is_element) {
        let tag = child.tag_name().name();
        let value = if has_element_children(child) {
            parse_element(child)
        } else {
            text_value(child)
        };
        match parsed.get_mut(tag) {
            None => {
                parsed.insert(tag.to_string(), value);
            }
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }

    if parsed.is_empty() {
        if let Some(text) = node.text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Value::String(trimmed.to_string());
            }
        }
    }

    Value::Object(parsed)
}

fn has_element_children(node: Node<'_, '_>) -> bool {
    node.children().any(|child| child.is_element())
}

fn exceeds_depth(root: Node<'_, '_>, limit: usize) -> bool {
    let mut stack = vec![(root, 1usize)];
    while let Some((node, depth)) = stack.pop() {
        if depth > limit {
            return true;
        }
        for child in node.children().filter(Node::is_element) {
            stack.push((child, depth + 1));
        }
    }
    false
}

/// Leaf text as the parser reports it: untrimmed, null when absent.
fn text_value(node: Node<'_, '_>) -> Value {
    match node.text() {
        Some(text) => Value::String(text.to_string()),
        None => Value::Null,
    }
}
