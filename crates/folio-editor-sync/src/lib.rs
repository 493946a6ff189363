//! folio-editor-sync: live entity documents and their persistence.
//!
//! This crate provides:
//! - `EntityDocument` / `DocumentCore` - path-scoped setters over a shared store
//! - `RealtimeDocument` - submits every edit to a collaborative `OtTransport`
//! - `BatchedDocument` - debounced, at-most-one-in-flight saves to a `PersistenceAuthority`
//! - `ResourceStateManager` - publish/archive/delete actions and their side effects
//! - `AccessController` - reactive per field-locale access decisions
//! - `CollabMessage` - postcard wire messages for realtime transports

pub mod access_controller;
pub mod authority;
pub mod batched;
pub mod document;
pub mod error;
pub mod realtime;
pub mod state_manager;
pub mod transport;

pub use access_controller::{AccessController, FieldPermissions};
pub use authority::{Method, PersistRequest, PersistenceAuthority};
pub use batched::BatchedDocument;
pub use document::{DocumentCore, DocumentStatus, EntityDocument, PendingMutation};
pub use error::{ActionError, DocumentError, PersistenceError, PersistenceErrorKind, TransportError};
pub use realtime::{OtTransport, RealtimeDocument, Submission, TransportEvent};
pub use state_manager::{
    ActionObserver, ActionOutcome, ActionPermissions, PublicationWarnings, ResourceStateManager,
    Validator, WarningsDismissed,
};
pub use transport::CollabMessage;
