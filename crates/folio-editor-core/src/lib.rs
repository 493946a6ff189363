//! folio-editor-core: entity editing logic without I/O or a runtime.
//!
//! This crate provides:
//! - `Entity`, `EntitySys`, `ContentType` - the edited record and its schema
//! - `Path` - addresses of values inside an entity
//! - `PathValueStore` - in-memory snapshot mutated by path
//! - `ChangeNotifier` - fan-out of mutated paths
//! - `diff` / `apply_operations` - structural operation diff and application
//! - `ResourceState` - lifecycle derivation from `sys`
//! - `decide` - per field-locale access decision
//! - `PresenceTracker` - collaborators and their focus

pub mod access;
pub mod diff;
pub mod error;
pub mod lifecycle;
pub mod notifier;
pub mod operation;
pub mod path;
pub mod presence;
pub mod rich_text;
pub mod store;
mod tree;
pub mod types;

pub use access::{AccessDecision, AccessInputs, decide};
pub use diff::{diff, normalize};
pub use error::{ApplyError, StoreError};
pub use lifecycle::{Action, ResourceState};
pub use notifier::{ChangeNotifier, ChangeStream};
pub use operation::{Operation, OperationKind, apply_operations};
pub use path::{Path, Segment};
pub use presence::{Collaborator, PresenceTracker};
pub use smol_str::SmolStr;
pub use store::{LocalChange, PathValueStore};
pub use types::{
    ContentType, ContentTypeField, Entity, EntitySys, EntityType, FieldId, FieldKind, Fields,
    LocaleCode, UserId, Value,
};
