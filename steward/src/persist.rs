//! Persistence of the structure document between runs.
//!
//! The scheduled job re-applies the last accepted document, so an accepted
//! config has to survive restarts. The file store writes through a temporary
//! sibling and renames, a torn write must never clobber the last good copy.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::config::{ConfigError, StructureConfig};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Loads the last accepted structure document, `None` when no document
    /// has been accepted yet.
    async fn load(&self) -> Result<Option<StructureConfig>, ConfigError>;

    /// Persists an accepted structure document.
    async fn save(&self, config: &StructureConfig) -> Result<(), ConfigError>;
}

/// JSON file on local disk, one document per deployment.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> ConfigError {
        ConfigError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Result<Option<StructureConfig>, ConfigError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no stored config");
                return Ok(None);
            }
            Err(e) => return Err(self.io_error(e)),
        };
        Ok(Some(StructureConfig::from_json_str(&raw)?))
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn save(&self, config: &StructureConfig) -> Result<(), ConfigError> {
        let raw = config.to_json_string()?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        debug!("stored config");
        Ok(())
    }
}
