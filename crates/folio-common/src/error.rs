//! Error types shared across folio crates.

use miette::Diagnostic;

/// Main error type for folio plumbing (configuration, serialization, IO).
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum FolioError {
    /// Configuration could not be loaded or is invalid
    #[error("configuration error: {0}")]
    #[diagnostic(code(folio::config))]
    Config(String),

    /// Serialization/deserialization error
    #[error(transparent)]
    #[diagnostic_source]
    Serde(#[from] SerDeError),

    /// IO error
    #[error(transparent)]
    #[diagnostic(code(folio::io))]
    Io(#[from] std::io::Error),

    /// Tracing subscriber could not be installed
    #[error("telemetry error: {0}")]
    #[diagnostic(code(folio::telemetry))]
    Telemetry(String),
}

/// Serialization/deserialization errors
#[derive(thiserror::Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum SerDeError {
    #[error(transparent)]
    #[diagnostic(code(folio::serde::json))]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(code(folio::serde::toml))]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    #[diagnostic(code(folio::serde::toml))]
    TomlSer(#[from] toml::ser::Error),
}

impl From<serde_json::Error> for FolioError {
    fn from(err: serde_json::Error) -> Self {
        FolioError::Serde(SerDeError::Json(err))
    }
}

impl From<toml::de::Error> for FolioError {
    fn from(err: toml::de::Error) -> Self {
        FolioError::Serde(SerDeError::TomlDe(err))
    }
}

impl From<toml::ser::Error> for FolioError {
    fn from(err: toml::ser::Error) -> Self {
        FolioError::Serde(SerDeError::TomlSer(err))
    }
}
