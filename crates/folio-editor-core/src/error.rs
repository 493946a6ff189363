//! Error types for store mutations and operation application.

use miette::Diagnostic;
use thiserror::Error;

use crate::path::Path;

/// Errors from reading or mutating a `PathValueStore`.
#[derive(Error, Debug, Clone, PartialEq, Diagnostic)]
#[non_exhaustive]
pub enum StoreError {
    /// Path does not address a mutable location.
    #[error("invalid path: {0}")]
    #[diagnostic(code(folio::store::invalid_path))]
    InvalidPath(Path),

    /// `sys` is owned by the persistence authority.
    #[error("path is read-only: {0}")]
    #[diagnostic(
        code(folio::store::read_only),
        help("sys metadata only changes through persistence responses")
    )]
    ReadOnlyPath(Path),

    /// Container at the path has the wrong shape for the operation.
    #[error("type mismatch at {path}: expected {expected}")]
    #[diagnostic(code(folio::store::type_mismatch))]
    TypeMismatch { path: Path, expected: &'static str },

    /// Array index past the end.
    #[error("index {index} out of range at {path} (len {len})")]
    #[diagnostic(code(folio::store::index_out_of_range))]
    IndexOutOfRange { path: Path, index: usize, len: usize },

    /// Nothing stored at the path.
    #[error("no value at {0}")]
    #[diagnostic(code(folio::store::missing))]
    Missing(Path),
}

/// Errors from applying an operation list.
#[derive(Error, Debug, Clone, PartialEq, Diagnostic)]
pub enum ApplyError {
    /// Operation path is outside the value being patched.
    #[error("operation at {op_path} is outside {base}")]
    #[diagnostic(code(folio::apply::outside_base))]
    OutsideBase { op_path: Path, base: Path },

    /// Operation carries no value where one is required.
    #[error("operation at {0} has no new value")]
    #[diagnostic(code(folio::apply::missing_value))]
    MissingValue(Path),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}
