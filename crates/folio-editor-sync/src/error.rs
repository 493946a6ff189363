//! Error types for documents, persistence and lifecycle actions.

use std::fmt;

use folio_editor_core::{Action, ResourceState, StoreError};
use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;

/// Machine-readable reason a persistence request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistenceErrorKind {
    /// The request's version is stale relative to the authority.
    VersionMismatch,
    PermissionDenied,
    NotFound,
    /// Other 4xx response.
    Client(u16),
    /// 5xx response.
    Server(u16),
    Timeout,
    /// Connection-level failure; no response was received.
    Transport,
}

impl fmt::Display for PersistenceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VersionMismatch => f.write_str("version mismatch"),
            Self::PermissionDenied => f.write_str("permission denied"),
            Self::NotFound => f.write_str("not found"),
            Self::Client(status) => write!(f, "client error {status}"),
            Self::Server(status) => write!(f, "server error {status}"),
            Self::Timeout => f.write_str("timeout"),
            Self::Transport => f.write_str("transport failure"),
        }
    }
}

/// Failure reported by the persistence authority.
#[derive(Error, Debug, Clone, PartialEq, Diagnostic)]
#[error("{kind}: {message}")]
#[diagnostic(code(folio::persistence))]
pub struct PersistenceError {
    pub kind: PersistenceErrorKind,
    pub message: SmolStr,
}

impl PersistenceError {
    pub fn new(kind: PersistenceErrorKind, message: impl Into<SmolStr>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn version_mismatch() -> Self {
        Self::new(PersistenceErrorKind::VersionMismatch, "entity version is stale")
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == PersistenceErrorKind::VersionMismatch
    }

    /// Server-side validation rejected the payload.
    pub fn is_validation(&self) -> bool {
        self.kind == PersistenceErrorKind::Client(422)
    }
}

/// Failures of the realtime transport.
#[derive(Error, Debug, Clone, PartialEq, Diagnostic)]
#[non_exhaustive]
pub enum TransportError {
    #[error("transport is closed")]
    #[diagnostic(code(folio::transport::closed))]
    Closed,

    #[error("transport send failed: {0}")]
    #[diagnostic(code(folio::transport::send))]
    Send(SmolStr),

    /// The remote session refused a submission.
    #[error("submission rejected: {0}")]
    #[diagnostic(code(folio::transport::rejected))]
    Rejected(SmolStr),

    #[error("wire codec error: {0}")]
    #[diagnostic(code(folio::transport::codec))]
    Codec(SmolStr),
}

impl From<postcard::Error> for TransportError {
    fn from(e: postcard::Error) -> Self {
        TransportError::Codec(e.to_string().into())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Codec(e.to_string().into())
    }
}

/// Errors surfaced by document mutations and strategy calls.
#[derive(Error, Debug, Clone, PartialEq, Diagnostic)]
#[non_exhaustive]
pub enum DocumentError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    /// The document was torn down.
    #[error("document has been disposed")]
    #[diagnostic(code(folio::document::disposed))]
    Disposed,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Transport(#[from] TransportError),
}

/// Why a lifecycle action did not happen.
#[derive(Error, Debug, Clone, PartialEq, Diagnostic)]
#[non_exhaustive]
pub enum ActionError {
    #[error("cannot {action} an entity in state {state:?}")]
    #[diagnostic(code(folio::action::illegal))]
    Illegal { action: Action, state: ResourceState },

    #[error("not permitted to {0}")]
    #[diagnostic(code(folio::action::not_permitted))]
    NotPermitted(Action),

    #[error("another action ({0}) is in progress")]
    #[diagnostic(code(folio::action::in_progress))]
    InProgress(Action),

    /// Local validation failed; nothing was sent.
    #[error("entity failed validation")]
    #[diagnostic(code(folio::action::validation_failed))]
    ValidationFailed,

    /// The user dismissed the publication warnings.
    #[error("cancelled by user")]
    #[diagnostic(code(folio::action::cancelled))]
    Cancelled,

    #[error("document has been disposed")]
    #[diagnostic(code(folio::action::disposed))]
    Disposed,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Persistence(#[from] PersistenceError),
}
