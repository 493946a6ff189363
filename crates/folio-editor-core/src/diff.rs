//! Operation diff engine.
//!
//! Turns a full-value replacement at a path into the ordered list of
//! structural edits that transforms the old value into the new one:
//! objects are diffed by key, arrays by longest common subsequence, and
//! anything else is replaced in place. Every operation carries its full
//! path from the entity root.

use serde_json::Map;
use tracing::warn;

use crate::operation::Operation;
use crate::path::Path;
use crate::rich_text;
use crate::types::Value;

/// Arrays larger than this (old len * new len) are replaced wholesale
/// instead of running the quadratic LCS.
const MAX_LCS_CELLS: usize = 1 << 20;

/// Compute the operations that turn `old` into `new` at `path`.
///
/// `None` means no value is stored. The empty rich-text document is treated
/// as "no value" on the new side: replacing anything with it deletes the
/// value, and replacing it with itself does nothing.
pub fn diff(path: &Path, old: Option<&Value>, new: Option<&Value>) -> Vec<Operation> {
    let mut ops = Vec::new();

    if let (Some(o), Some(n)) = (old, new) {
        if rich_text::is_empty_document(o) && rich_text::is_empty_document(n) {
            return ops;
        }
    }

    let new = new.filter(|n| !rich_text::is_empty_document(n));
    match (old, new) {
        (None, None) => {}
        (Some(o), None) => ops.push(Operation::delete(path.clone(), o.clone())),
        (None, Some(n)) => ops.push(Operation::insert(path.clone(), n.clone())),
        (Some(o), Some(n)) => {
            if o == n {
                return ops;
            }
            if rich_text::has_legacy_nodes(o) || rich_text::has_legacy_nodes(n) {
                warn!(%path, "legacy rich-text nodes without data, replacing whole value");
                ops.push(Operation::replace(path.clone(), o.clone(), n.clone()));
                return ops;
            }
            diff_value(&mut ops, path, o, n);
        }
    }
    ops
}

/// Normalize a value the way `diff` does: the empty document becomes `None`.
pub fn normalize(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !rich_text::is_empty_document(v))
}

fn diff_value(ops: &mut Vec<Operation>, path: &Path, old: &Value, new: &Value) {
    if old == new {
        return;
    }
    match (old, new) {
        (Value::Object(o), Value::Object(n)) => diff_object(ops, path, o, n),
        (Value::Array(o), Value::Array(n)) => diff_array(ops, path, o, n),
        _ => ops.push(Operation::replace(path.clone(), old.clone(), new.clone())),
    }
}

fn diff_object(
    ops: &mut Vec<Operation>,
    path: &Path,
    old: &Map<String, Value>,
    new: &Map<String, Value>,
) {
    for (key, old_val) in old {
        if !new.contains_key(key) {
            ops.push(Operation::delete(path.child(key), old_val.clone()));
        }
    }
    for (key, new_val) in new {
        match old.get(key) {
            None => ops.push(Operation::insert(path.child(key), new_val.clone())),
            Some(old_val) => diff_value(ops, &path.child(key), old_val, new_val),
        }
    }
}

/// One step of an array edit script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Keep,
    Delete(usize),
    Insert(usize),
}

/// Edit script from the longest common subsequence of `old` and `new`.
fn edit_script(old: &[Value], new: &[Value]) -> Vec<Edit> {
    let (n, m) = (old.len(), new.len());
    // lcs[i][j] = LCS length of old[i..] and new[j..]
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut script = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            script.push(Edit::Keep);
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            script.push(Edit::Delete(i));
            i += 1;
        } else {
            script.push(Edit::Insert(j));
            j += 1;
        }
    }
    script.extend((i..n).map(Edit::Delete));
    script.extend((j..m).map(Edit::Insert));
    script
}

fn same_shape(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_))
    )
}

fn diff_array(ops: &mut Vec<Operation>, path: &Path, old: &[Value], new: &[Value]) {
    if old.len().saturating_mul(new.len()) > MAX_LCS_CELLS {
        warn!(%path, old_len = old.len(), new_len = new.len(), "array too large to diff, replacing");
        ops.push(Operation::replace(
            path.clone(),
            Value::Array(old.to_vec()),
            Value::Array(new.to_vec()),
        ));
        return;
    }

    // Cursor into the array as it looks after the operations emitted so far.
    let mut cursor = 0usize;
    let mut deleted = Vec::new();
    let mut inserted = Vec::new();

    let flush_gap = |ops: &mut Vec<Operation>,
                         cursor: &mut usize,
                         deleted: &mut Vec<usize>,
                         inserted: &mut Vec<usize>| {
        let paired = deleted.len().min(inserted.len());
        for (&d, &i) in deleted.iter().zip(inserted.iter()) {
            let here = path.index(*cursor);
            if same_shape(&old[d], &new[i]) {
                diff_value(ops, &here, &old[d], &new[i]);
            } else {
                ops.push(Operation::replace(here, old[d].clone(), new[i].clone()));
            }
            *cursor += 1;
        }
        for &d in &deleted[paired..] {
            ops.push(Operation::delete(path.index(*cursor), old[d].clone()));
        }
        for &i in &inserted[paired..] {
            ops.push(Operation::insert(path.index(*cursor), new[i].clone()));
            *cursor += 1;
        }
        deleted.clear();
        inserted.clear();
    };

    for edit in edit_script(old, new) {
        match edit {
            Edit::Keep => {
                flush_gap(ops, &mut cursor, &mut deleted, &mut inserted);
                cursor += 1;
            }
            Edit::Delete(d) => deleted.push(d),
            Edit::Insert(i) => inserted.push(i),
        }
    }
    flush_gap(ops, &mut cursor, &mut deleted, &mut inserted);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{OperationKind, apply_operations};
    use proptest::prelude::*;
    use serde_json::json;

    fn base() -> Path {
        Path::field_locale("body", "en-US")
    }

    fn roundtrip(old: Option<Value>, new: Option<Value>) {
        let ops = diff(&base(), old.as_ref(), new.as_ref());
        let applied = apply_operations(&base(), old.clone(), &ops).unwrap();
        assert_eq!(normalize(applied), normalize(new), "ops: {ops:#?}");
    }

    #[test]
    fn test_equal_values_produce_nothing() {
        assert!(diff(&base(), Some(&json!({"a": 1})), Some(&json!({"a": 1}))).is_empty());
        assert!(diff(&base(), None, None).is_empty());
    }

    #[test]
    fn test_scalar_replace() {
        let ops = diff(&base(), Some(&json!("old")), Some(&json!("new")));
        assert_eq!(ops, vec![Operation::replace(base(), json!("old"), json!("new"))]);
    }

    #[test]
    fn test_object_keys() {
        let ops = diff(
            &base(),
            Some(&json!({"keep": 1, "drop": 2, "change": 3})),
            Some(&json!({"keep": 1, "change": 4, "add": 5})),
        );
        assert_eq!(
            ops,
            vec![
                Operation::delete(base().child("drop"), json!(2)),
                Operation::replace(base().child("change"), json!(3), json!(4)),
                Operation::insert(base().child("add"), json!(5)),
            ]
        );
    }

    #[test]
    fn test_array_insert_in_middle_is_single_op() {
        let ops = diff(&base(), Some(&json!([1, 2, 4])), Some(&json!([1, 2, 3, 4])));
        assert_eq!(ops, vec![Operation::insert(base().index(2), json!(3))]);
    }

    #[test]
    fn test_array_element_objects_recurse() {
        let ops = diff(
            &base(),
            Some(&json!([{"id": 1, "v": "a"}, {"id": 2, "v": "b"}])),
            Some(&json!([{"id": 1, "v": "a"}, {"id": 2, "v": "c"}])),
        );
        assert_eq!(
            ops,
            vec![Operation::replace(base().index(1).child("v"), json!("b"), json!("c"))]
        );
    }

    #[test]
    fn test_empty_document_to_itself_is_noop() {
        let empty = rich_text::empty_document();
        assert!(diff(&base(), Some(&empty), Some(&empty)).is_empty());
    }

    #[test]
    fn test_setting_empty_document_deletes() {
        let doc = json!({"nodeType": "document", "data": {}, "content": [
            {"nodeType": "paragraph", "data": {}, "content": [
                {"nodeType": "text", "value": "hello", "marks": [], "data": {}}
            ]}
        ]});
        let ops = diff(&base(), Some(&doc), Some(&rich_text::empty_document()));
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::Delete);
        assert_eq!(ops[0].path, base());

        assert!(diff(&base(), None, Some(&rich_text::empty_document())).is_empty());
    }

    #[test]
    fn test_legacy_nodes_fall_back_to_root_replace() {
        let legacy = json!({"nodeType": "document", "content": [
            {"nodeType": "paragraph", "content": [{"nodeType": "text", "value": "a"}]}
        ]});
        let modern = json!({"nodeType": "document", "data": {}, "content": [
            {"nodeType": "paragraph", "data": {}, "content": [
                {"nodeType": "text", "value": "b", "marks": [], "data": {}}
            ]}
        ]});
        let ops = diff(&base(), Some(&legacy), Some(&modern));
        assert_eq!(ops, vec![Operation::replace(base(), legacy.clone(), modern.clone())]);
        roundtrip(Some(legacy), Some(modern));
    }

    #[test]
    fn test_rich_text_paragraph_edit_roundtrip() {
        let para = |text: &str| {
            json!({"nodeType": "paragraph", "data": {}, "content": [
                {"nodeType": "text", "value": text, "marks": [], "data": {}}
            ]})
        };
        let doc = |paras: Vec<Value>| json!({"nodeType": "document", "data": {}, "content": paras});
        roundtrip(
            Some(doc(vec![para("one"), para("two"), para("three")])),
            Some(doc(vec![para("zero"), para("one"), para("three"), para("four")])),
        );
    }

    #[test]
    fn test_mixed_gap_roundtrips() {
        roundtrip(Some(json!([1, "x", [1], {"a": 1}, 5])), Some(json!([{"a": 2}, 1, [2, 3], 5, 6])));
        roundtrip(Some(json!([1, 2, 3])), Some(json!([])));
        roundtrip(Some(json!([])), Some(json!([true, null])));
        roundtrip(Some(json!({"a": [1]})), Some(json!([1])));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            (0i64..5).prop_map(|n| json!(n)),
            "[a-c]{0,2}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..5).prop_map(Value::Array),
                prop::collection::btree_map("[k-n]", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_diff_then_apply_yields_new(
            old in proptest::option::of(arb_json()),
            new in proptest::option::of(arb_json()),
        ) {
            let ops = diff(&base(), old.as_ref(), new.as_ref());
            let applied = apply_operations(&base(), old.clone(), &ops).unwrap();
            prop_assert_eq!(normalize(applied), normalize(new));
        }
    }
}
