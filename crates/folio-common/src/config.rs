use miette::Result;
use miette::miette;
use serde::{Deserialize, Serialize};

use std::future::Future;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::FolioError;

/// Tunables for entity documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorConfig {
    /// Quiet window after the last local edit before a batched flush runs.
    pub debounce_ms: u64,
    /// How long `is_saving` stays true after a flush settles.
    pub saving_trailing_ms: u64,
    /// Collaborator focus older than this is treated as gone.
    pub presence_stale_secs: u64,
    /// Ask the persistence authority to skip server-side data transformation.
    pub skip_transformation: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            saving_trailing_ms: 200,
            presence_stale_secs: 60,
            skip_transformation: false,
        }
    }
}

impl EditorConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn saving_trailing(&self) -> Duration {
        Duration::from_millis(self.saving_trailing_ms)
    }

    pub fn presence_stale(&self) -> Duration {
        Duration::from_secs(self.presence_stale_secs)
    }

    /// Loads the configuration from the provided loader.
    pub async fn load(loader: &impl Loader) -> Result<Self> {
        loader
            .load()
            .await
            .map_err(|e| miette!("Failed to load configuration: {e}"))
    }

    /// Saves the configuration using the provided saver.
    pub async fn save(&self, saver: &impl Saver) -> Result<()> {
        saver
            .save(self)
            .await
            .map_err(|e| miette!("Failed to save configuration: {e}"))
    }
}

/// The trait for loading configuration data.
pub trait Loader {
    /// Loads the configuration data.
    fn load(&self) -> impl Future<Output = core::result::Result<EditorConfig, FolioError>> + Send;
}

/// The trait for saving configuration data.
pub trait Saver {
    /// Saves the configuration data.
    fn save(
        &self,
        config: &EditorConfig,
    ) -> impl Future<Output = core::result::Result<(), FolioError>> + Send;
}

/// An implementation of [`Loader`] and [`Saver`] that reads and writes a configuration file.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a new [`FileStore`] with the given path.
    ///
    /// [`EditorConfig`] data is serialized and deserialized according to the file
    /// extension. `.json` and `.toml` are supported.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|ext| ext.to_str())
    }
}

impl Loader for FileStore {
    async fn load(&self) -> core::result::Result<EditorConfig, FolioError> {
        match self.extension() {
            Some("json") => Ok(serde_json::from_str(&std::fs::read_to_string(&self.path)?)?),
            Some("toml") => Ok(toml::from_str(&std::fs::read_to_string(&self.path)?)?),
            other => Err(FolioError::Config(format!(
                "unsupported config format: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }
}

impl Saver for FileStore {
    async fn save(&self, config: &EditorConfig) -> core::result::Result<(), FolioError> {
        match self.extension() {
            Some("json") => Ok(std::fs::write(
                &self.path,
                serde_json::to_string_pretty(config)?,
            )?),
            Some("toml") => Ok(std::fs::write(&self.path, toml::to_string_pretty(config)?)?),
            other => Err(FolioError::Config(format!(
                "unsupported config format: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }
}
