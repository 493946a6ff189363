//! In-memory snapshot of one entity, addressable by path.
//!
//! The store is a plain data structure; the owning document wraps it in a
//! lock so every mutation is atomic with respect to readers.

use std::collections::HashMap;

use crate::error::StoreError;
use crate::operation::{Operation, OperationKind};
use crate::path::{Path, Segment};
use crate::tree;
use crate::types::{Entity, EntitySys, Fields, Value};

/// Result of a local mutation.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalChange {
    /// Path the mutation targeted.
    pub path: Path,
    /// Field-locale scope containing `path` (see [`Path::value_scope`]).
    pub scope: Path,
    /// Value stored at `scope` right after the mutation.
    pub scope_value: Option<Value>,
    /// Store revision after the mutation.
    pub revision: u64,
}

/// Mutable snapshot of `sys` + `fields`.
#[derive(Debug, Clone)]
pub struct PathValueStore {
    sys: EntitySys,
    fields: Value,
    revision: u64,
    views: HashMap<Path, Value>,
}

impl PathValueStore {
    pub fn new(entity: Entity) -> Self {
        Self {
            sys: entity.sys,
            fields: Value::Object(entity.fields),
            revision: 0,
            views: HashMap::new(),
        }
    }

    pub fn sys(&self) -> &EntitySys {
        &self.sys
    }

    /// Monotonic counter bumped by every mutation, local or remote.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Copy of the current field map.
    pub fn fields(&self) -> Fields {
        match &self.fields {
            Value::Object(map) => map.clone(),
            _ => Fields::new(),
        }
    }

    /// Copy of the whole entity.
    pub fn entity(&self) -> Entity {
        Entity::new(self.sys.clone(), self.fields())
    }

    /// Read the value at `path`.
    pub fn get_value_at(&self, path: &Path) -> Option<Value> {
        match path.segments() {
            [] => serde_json::to_value(self.entity()).ok(),
            [Segment::Key(root), rest @ ..] if root == crate::path::SYS => {
                let sys = serde_json::to_value(&self.sys).ok()?;
                tree::get(&sys, rest).cloned()
            }
            [Segment::Key(root), rest @ ..] if root == crate::path::FIELDS => {
                tree::get(&self.fields, rest).cloned()
            }
            _ => None,
        }
    }

    fn fields_relative<'p>(&self, path: &'p Path) -> Result<&'p [Segment], StoreError> {
        if path.is_sys() {
            return Err(StoreError::ReadOnlyPath(path.clone()));
        }
        match path.strip_prefix(&Path::fields()) {
            Some(rest) if !rest.is_empty() => Ok(rest),
            _ => Err(StoreError::InvalidPath(path.clone())),
        }
    }

    fn commit(&mut self, path: &Path) -> LocalChange {
        self.revision += 1;
        self.invalidate(path);
        let scope = path.value_scope();
        let scope_value = self.get_value_at(&scope);
        LocalChange {
            path: path.clone(),
            scope,
            scope_value,
            revision: self.revision,
        }
    }

    /// Run `edit` on the field tree, restoring the touched field if it fails
    /// so no half-created containers are left behind.
    fn guarded<R>(
        &mut self,
        relative: &[Segment],
        edit: impl FnOnce(&mut Value) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let key = relative.first().and_then(Segment::as_key).map(str::to_owned);
        let saved = key.as_deref().map(|k| self.fields.get(k).cloned());
        let result = edit(&mut self.fields);
        if result.is_err() {
            if let (Some(key), Some(saved), Value::Object(map)) = (key, saved, &mut self.fields) {
                match saved {
                    Some(value) => {
                        map.insert(key, value);
                    }
                    None => {
                        map.shift_remove(&key);
                    }
                }
            }
        }
        result
    }

    /// Drop `fields/<id>` once its last locale is gone.
    fn prune(&mut self, relative: &[Segment]) {
        if let [field, _locale, ..] = relative {
            let field_path = std::slice::from_ref(field);
            let empty = matches!(
                tree::get(&self.fields, field_path),
                Some(Value::Object(locales)) if locales.is_empty()
            );
            if empty {
                let _ = tree::remove(&mut self.fields, &Path::fields(), field_path);
            }
        }
    }

    pub fn set_value_at(&mut self, path: &Path, value: Value) -> Result<LocalChange, StoreError> {
        let relative = self.fields_relative(path)?;
        self.guarded(relative, |fields| tree::set(fields, &Path::fields(), relative, value))?;
        Ok(self.commit(path))
    }

    pub fn remove_value_at(&mut self, path: &Path) -> Result<LocalChange, StoreError> {
        let relative = self.fields_relative(path)?;
        tree::remove(&mut self.fields, &Path::fields(), relative)?;
        if relative.len() == 2 {
            self.prune(relative);
        }
        Ok(self.commit(path))
    }

    /// Append to the array at `path`, creating it if absent.
    pub fn push_value_at(&mut self, path: &Path, value: Value) -> Result<LocalChange, StoreError> {
        let relative = self.fields_relative(path)?;
        self.guarded(relative, |fields| tree::push(fields, &Path::fields(), relative, value))?;
        Ok(self.commit(path))
    }

    /// Insert into the array at `path` before `index`.
    pub fn insert_value_at(
        &mut self,
        path: &Path,
        index: usize,
        value: Value,
    ) -> Result<LocalChange, StoreError> {
        let target = path.index(index);
        let relative = self.fields_relative(&target)?;
        self.guarded(relative, |fields| tree::insert(fields, &Path::fields(), relative, value))?;
        Ok(self.commit(path))
    }

    /// Apply one structural operation, as received from a collaborator.
    pub fn apply(&mut self, op: &Operation) -> Result<LocalChange, StoreError> {
        let relative = self.fields_relative(&op.path)?;
        let value = || {
            op.new_value
                .clone()
                .ok_or_else(|| StoreError::Missing(op.path.clone()))
        };
        match op.kind {
            OperationKind::Insert => {
                let value = value()?;
                self.guarded(relative, |fields| {
                    tree::insert(fields, &Path::fields(), relative, value)
                })?;
            }
            OperationKind::Replace => {
                let value = value()?;
                self.guarded(relative, |fields| tree::set(fields, &Path::fields(), relative, value))?;
            }
            OperationKind::Delete => {
                tree::remove(&mut self.fields, &Path::fields(), relative)?;
                if relative.len() == 2 {
                    self.prune(relative);
                }
            }
        }
        Ok(self.commit(&op.path))
    }

    /// Apply a batch of operations all or nothing.
    ///
    /// The batch runs against a scratch copy that replaces the store only if
    /// every operation applies.
    pub fn apply_all(&mut self, ops: &[Operation]) -> Result<Vec<LocalChange>, StoreError> {
        let mut scratch = self.clone();
        let changes = ops
            .iter()
            .map(|op| scratch.apply(op))
            .collect::<Result<Vec<_>, _>>()?;
        *self = scratch;
        Ok(changes)
    }

    /// Replace `sys` wholesale. Only persistence responses do this.
    pub fn replace_sys(&mut self, sys: EntitySys) {
        self.sys = sys;
        self.revision += 1;
        self.invalidate(&Path::new(vec![Segment::Key(crate::path::SYS.into())]));
    }

    /// Replace all fields, e.g. with the authority's response.
    pub fn replace_fields(&mut self, fields: Fields) {
        self.fields = Value::Object(fields);
        self.revision += 1;
        self.invalidate(&Path::fields());
    }

    pub fn replace_entity(&mut self, entity: Entity) {
        self.sys = entity.sys;
        self.fields = Value::Object(entity.fields);
        self.revision += 1;
        self.views.clear();
    }

    /// Memoised view derived from the value at `path`.
    ///
    /// Cached until a mutation touches `path`, one of its ancestors, or one of
    /// its descendants.
    pub fn cached_view(&mut self, path: &Path, compute: impl FnOnce(Option<&Value>) -> Value) -> Value {
        if let Some(view) = self.views.get(path) {
            return view.clone();
        }
        let current = self.get_value_at(path);
        let view = compute(current.as_ref());
        self.views.insert(path.clone(), view.clone());
        view
    }

    fn invalidate(&mut self, path: &Path) {
        self.views.retain(|key, _| !key.overlaps(path));
    }
}
