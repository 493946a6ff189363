//! folio-common: shared plumbing for the folio entity editor.
//!
//! - `error`: base error taxonomy with miette diagnostics
//! - `config`: editor configuration and file-backed loading
//! - `telemetry`: tracing subscriber setup
//! - `signal`: observable properties, fan-out subjects, scoped subscriptions

pub mod config;
pub mod error;
pub mod signal;
pub mod sync;
pub mod telemetry;

pub use crate::config::{EditorConfig, FileStore, Loader, Saver};
pub use crate::error::{FolioError, SerDeError};
pub use crate::signal::{Property, Subject, Subscription, SubscriptionBag};
