//! Structural edit operations and their application.

use serde::{Deserialize, Serialize};

use crate::error::ApplyError;
use crate::path::Path;
use crate::tree;
use crate::types::Value;

/// What an operation does at its path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Add a key, or insert into an array shifting later elements.
    Insert,
    /// Remove a key, or remove an array element shifting later elements.
    Delete,
    /// Overwrite the value in place.
    Replace,
}

/// A minimal structural edit at a path from the entity root.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub path: Path,
    pub kind: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
}

impl Operation {
    pub fn insert(path: Path, value: Value) -> Self {
        Self {
            path,
            kind: OperationKind::Insert,
            previous_value: None,
            new_value: Some(value),
        }
    }

    pub fn delete(path: Path, previous: Value) -> Self {
        Self {
            path,
            kind: OperationKind::Delete,
            previous_value: Some(previous),
            new_value: None,
        }
    }

    pub fn replace(path: Path, previous: Value, value: Value) -> Self {
        Self {
            path,
            kind: OperationKind::Replace,
            previous_value: Some(previous),
            new_value: Some(value),
        }
    }

    fn required_value(&self) -> Result<Value, ApplyError> {
        self.new_value
            .clone()
            .ok_or_else(|| ApplyError::MissingValue(self.path.clone()))
    }

    /// Apply this operation to a value tree whose root sits at `base`.
    ///
    /// `value` is `None` when nothing is stored at `base`.
    pub fn apply_at(&self, base: &Path, value: &mut Option<Value>) -> Result<(), ApplyError> {
        let relative = self
            .path
            .strip_prefix(base)
            .ok_or_else(|| ApplyError::OutsideBase {
                op_path: self.path.clone(),
                base: base.clone(),
            })?;

        if relative.is_empty() {
            *value = match self.kind {
                OperationKind::Delete => None,
                OperationKind::Insert | OperationKind::Replace => Some(self.required_value()?),
            };
            return Ok(());
        }

        let root = value.get_or_insert_with(|| Value::Object(Default::default()));
        match self.kind {
            OperationKind::Insert => tree::insert(root, base, relative, self.required_value()?)?,
            OperationKind::Replace => {
                tree::set(root, base, relative, self.required_value()?)?;
            }
            OperationKind::Delete => {
                tree::remove(root, base, relative)?;
            }
        }
        Ok(())
    }
}

/// Apply `ops` in order to `value`, whose root sits at `base`.
pub fn apply_operations(
    base: &Path,
    mut value: Option<Value>,
    ops: &[Operation],
) -> Result<Option<Value>, ApplyError> {
    for op in ops {
        op.apply_at(base, &mut value)?;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_root_operations() {
        let base = Path::field_locale("title", "en");
        let value = apply_operations(&base, None, &[Operation::insert(base.clone(), json!("a"))])
            .unwrap();
        assert_eq!(value, Some(json!("a")));

        let value = apply_operations(&base, value, &[Operation::delete(base.clone(), json!("a"))])
            .unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_nested_operations() {
        let base = Path::field_locale("tags", "en");
        let ops = vec![
            Operation::insert(base.index(0), json!("first")),
            Operation::replace(base.index(3), json!("c"), json!("C")),
            Operation::delete(base.index(1), json!("a")),
        ];
        let value = apply_operations(&base, Some(json!(["a", "b", "c"])), &ops).unwrap();
        assert_eq!(value, Some(json!(["first", "b", "C"])));
    }

    #[test]
    fn test_operation_outside_base_is_rejected() {
        let base = Path::field_locale("a", "en");
        let op = Operation::insert(Path::field_locale("b", "en"), json!(1));
        let err = apply_operations(&base, None, &[op]).unwrap_err();
        assert!(matches!(err, ApplyError::OutsideBase { .. }));
    }

    #[test]
    fn test_operation_wire_shape() {
        let op = Operation::replace(Path::field_locale("n", "en"), json!(1), json!(2));
        insta::assert_json_snapshot!(op, @r###"
        {
          "path": [
            "fields",
            "n",
            "en"
          ],
          "kind": "replace",
          "previousValue": 1,
          "newValue": 2
        }
        "###);
    }
}
