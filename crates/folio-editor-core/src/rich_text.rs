//! Structured rich-text values.
//!
//! Rich text is a tree of nodes, each an object with `nodeType`, `data` and
//! (for containers) `content`. Two shapes need special handling:
//! - the empty document, which stands for "no value"
//! - legacy nodes that lack `data`, which cannot be patched node by node

use serde_json::json;

use crate::types::Value;

const NODE_TYPE: &str = "nodeType";
const DATA: &str = "data";
const CONTENT: &str = "content";

/// The canonical empty rich-text document: one empty paragraph.
pub fn empty_document() -> Value {
    json!({
        "nodeType": "document",
        "data": {},
        "content": [{
            "nodeType": "paragraph",
            "data": {},
            "content": [{
                "nodeType": "text",
                "value": "",
                "marks": [],
                "data": {}
            }]
        }]
    })
}

fn node_type(value: &Value) -> Option<&str> {
    value.get(NODE_TYPE).and_then(Value::as_str)
}

fn children(value: &Value) -> &[Value] {
    value
        .get(CONTENT)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Whether `value` is an empty rich-text document.
///
/// Accepts a document with no content, or with a single paragraph holding at
/// most one empty text node.
pub fn is_empty_document(value: &Value) -> bool {
    if node_type(value) != Some("document") {
        return false;
    }
    match children(value) {
        [] => true,
        [paragraph] if node_type(paragraph) == Some("paragraph") => match children(paragraph) {
            [] => true,
            [text] => {
                node_type(text) == Some("text")
                    && text.get("value").and_then(Value::as_str).unwrap_or("").is_empty()
            }
            _ => false,
        },
        _ => false,
    }
}

/// Whether any node in `value` lacks the `data` object that node-level edits
/// rely on. Such values are only ever replaced wholesale.
pub fn has_legacy_nodes(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            if map.contains_key(NODE_TYPE) && !map.contains_key(DATA) {
                return true;
            }
            map.values().any(has_legacy_nodes)
        }
        Value::Array(items) => items.iter().any(has_legacy_nodes),
        _ => false,
    }
}
