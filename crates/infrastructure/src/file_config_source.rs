//! Local file configuration source.

use std::path::PathBuf;

use async_trait::async_trait;
use ephemera_application::ConfigSource;
use ephemera_core::{AppError, AppResult};

/// Reads the configuration document from a local path.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    /// Creates a source for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn fetch(&self) -> AppResult<Vec<u8>> {
        tokio::fs::read(self.path.as_path()).await.map_err(|error| {
            AppError::Configuration(format!(
                "failed to read configuration file '{}': {error}",
                self.path.display()
            ))
        })
    }

    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }
}
