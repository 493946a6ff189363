//! Navigation and in-place edits on a JSON value tree by path segments.
//!
//! `at` is the full path of the tree root; it is only used to build error paths.

use crate::error::StoreError;
use crate::path::{Path, Segment};
use crate::types::Value;

pub(crate) fn get<'a>(root: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    segments.iter().try_fold(root, |node, seg| match (node, seg) {
        (Value::Object(map), Segment::Key(k)) => map.get(k.as_str()),
        (Value::Array(items), Segment::Index(i)) => items.get(*i),
        _ => None,
    })
}

fn error_path(at: &Path, segments: &[Segment]) -> Path {
    at.segments().iter().chain(segments).cloned().collect()
}

/// Walk to the parent of the last segment, creating objects for missing keys.
fn parent_mut<'a>(
    root: &'a mut Value,
    at: &Path,
    segments: &[Segment],
    create: bool,
) -> Result<&'a mut Value, StoreError> {
    let Some((_, parents)) = segments.split_last() else {
        return Err(StoreError::InvalidPath(at.clone()));
    };
    let mut node = root;
    for (depth, seg) in parents.iter().enumerate() {
        let here = || error_path(at, &segments[..=depth]);
        node = match (node, seg) {
            (Value::Object(map), Segment::Key(k)) => {
                if create {
                    map.entry(k.to_string())
                        .or_insert_with(|| Value::Object(Default::default()))
                } else {
                    map.get_mut(k.as_str())
                        .ok_or_else(|| StoreError::Missing(here()))?
                }
            }
            (Value::Array(items), Segment::Index(i)) => {
                let len = items.len();
                items.get_mut(*i).ok_or_else(|| StoreError::IndexOutOfRange {
                    path: here(),
                    index: *i,
                    len,
                })?
            }
            (Value::Object(_), Segment::Index(_)) => {
                return Err(StoreError::TypeMismatch {
                    path: here(),
                    expected: "array",
                });
            }
            (_, _) => {
                return Err(StoreError::TypeMismatch {
                    path: here(),
                    expected: "object",
                });
            }
        };
    }
    Ok(node)
}

/// Set the value at `segments`, returning the previous value.
///
/// Missing intermediate objects are created. An array index equal to the
/// length appends.
pub(crate) fn set(
    root: &mut Value,
    at: &Path,
    segments: &[Segment],
    value: Value,
) -> Result<Option<Value>, StoreError> {
    let parent = parent_mut(root, at, segments, true)?;
    let full = || error_path(at, segments);
    match (parent, segments.last()) {
        (Value::Object(map), Some(Segment::Key(k))) => Ok(map.insert(k.to_string(), value)),
        (Value::Array(items), Some(Segment::Index(i))) => {
            let len = items.len();
            if *i < len {
                Ok(Some(std::mem::replace(&mut items[*i], value)))
            } else if *i == len {
                items.push(value);
                Ok(None)
            } else {
                Err(StoreError::IndexOutOfRange {
                    path: full(),
                    index: *i,
                    len,
                })
            }
        }
        (Value::Array(_), _) => Err(StoreError::TypeMismatch {
            path: full(),
            expected: "object",
        }),
        (_, _) => Err(StoreError::TypeMismatch {
            path: full(),
            expected: "container",
        }),
    }
}

/// Insert into the container at the parent of `segments`.
///
/// Arrays shift later elements right; objects behave like `set`.
pub(crate) fn insert(
    root: &mut Value,
    at: &Path,
    segments: &[Segment],
    value: Value,
) -> Result<(), StoreError> {
    let parent = parent_mut(root, at, segments, true)?;
    match (parent, segments.last()) {
        (Value::Array(items), Some(Segment::Index(i))) => {
            let len = items.len();
            if *i > len {
                return Err(StoreError::IndexOutOfRange {
                    path: error_path(at, segments),
                    index: *i,
                    len,
                });
            }
            items.insert(*i, value);
            Ok(())
        }
        (Value::Object(map), Some(Segment::Key(k))) => {
            map.insert(k.to_string(), value);
            Ok(())
        }
        (_, _) => Err(StoreError::TypeMismatch {
            path: error_path(at, segments),
            expected: "container",
        }),
    }
}

/// Remove the value at `segments`, returning it. Missing values are not an error.
pub(crate) fn remove(
    root: &mut Value,
    at: &Path,
    segments: &[Segment],
) -> Result<Option<Value>, StoreError> {
    let parent = match parent_mut(root, at, segments, false) {
        Ok(parent) => parent,
        Err(StoreError::Missing(_)) => return Ok(None),
        Err(e) => return Err(e),
    };
    match (parent, segments.last()) {
        (Value::Object(map), Some(Segment::Key(k))) => Ok(map.shift_remove(k.as_str())),
        (Value::Array(items), Some(Segment::Index(i))) => {
            if *i < items.len() {
                Ok(Some(items.remove(*i)))
            } else {
                Ok(None)
            }
        }
        (_, _) => Err(StoreError::TypeMismatch {
            path: error_path(at, segments),
            expected: "container",
        }),
    }
}

/// Append to the array at `segments`, creating it if absent. Returns the new index.
pub(crate) fn push(
    root: &mut Value,
    at: &Path,
    segments: &[Segment],
    value: Value,
) -> Result<usize, StoreError> {
    let parent = parent_mut(root, at, segments, true)?;
    let slot = match (parent, segments.last()) {
        (Value::Object(map), Some(Segment::Key(k))) => map
            .entry(k.to_string())
            .or_insert_with(|| Value::Array(Vec::new())),
        (Value::Array(items), Some(Segment::Index(i))) => {
            let len = items.len();
            items.get_mut(*i).ok_or_else(|| StoreError::IndexOutOfRange {
                path: error_path(at, segments),
                index: *i,
                len,
            })?
        }
        (_, _) => {
            return Err(StoreError::TypeMismatch {
                path: error_path(at, segments),
                expected: "container",
            });
        }
    };
    match slot {
        Value::Array(items) => {
            items.push(value);
            Ok(items.len() - 1)
        }
        _ => Err(StoreError::TypeMismatch {
            path: error_path(at, segments),
            expected: "array",
        }),
    }
}
