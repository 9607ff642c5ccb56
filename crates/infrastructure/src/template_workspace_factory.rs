//! Temporary-directory workspaces seeded from a provisioning template.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ephemera_application::{Workspace, WorkspaceFactory};
use ephemera_core::{AppError, AppResult};
use ephemera_domain::{RequestId, VariablesDocument};
use tempfile::TempDir;
use tracing::debug;

use crate::terraform_engine::BACKEND_CONFIG_FILE;

/// File name the engine reads input variables from.
pub const VARIABLES_FILE: &str = "terraform.tfvars.json";

/// Workspace backed by a temporary directory removed on drop.
#[derive(Debug)]
pub struct TempWorkspace {
    directory: TempDir,
}

impl Workspace for TempWorkspace {
    fn path(&self) -> &Path {
        self.directory.path()
    }
}

/// Copies the template into a fresh temporary directory per invocation.
#[derive(Debug, Clone)]
pub struct TemplateWorkspaceFactory {
    template_root: PathBuf,
    state_key_prefix: String,
}

impl TemplateWorkspaceFactory {
    /// Creates a factory.
    ///
    /// Each workspace receives a backend settings file keying remote state
    /// by request id under `state_key_prefix`, so a later workspace for the
    /// same request reaches the same state.
    #[must_use]
    pub fn new(template_root: impl Into<PathBuf>, state_key_prefix: impl Into<String>) -> Self {
        Self {
            template_root: template_root.into(),
            state_key_prefix: state_key_prefix.into(),
        }
    }
}

#[async_trait]
impl WorkspaceFactory for TemplateWorkspaceFactory {
    async fn materialize(
        &self,
        request_id: &RequestId,
        variables: &VariablesDocument,
    ) -> AppResult<Box<dyn Workspace>> {
        let state_key_prefix = self.state_key_prefix.trim().trim_end_matches('/');
        if state_key_prefix.is_empty() {
            return Err(AppError::Configuration(
                "terraform state key prefix must not be empty".to_owned(),
            ));
        }

        let template_root = self.template_root.clone();
        let variables_bytes = variables.to_json_bytes()?;
        let backend_settings = format!("key = \"{state_key_prefix}/{request_id}.tfstate\"\n");
        let prefix = format!("ephemera-{request_id}-");

        let directory = tokio::task::spawn_blocking(move || -> io::Result<TempDir> {
            let directory = tempfile::Builder::new().prefix(prefix.as_str()).tempdir()?;
            copy_dir_recursive(template_root.as_path(), directory.path())?;
            fs::write(directory.path().join(VARIABLES_FILE), variables_bytes)?;
            fs::write(directory.path().join(BACKEND_CONFIG_FILE), backend_settings)?;
            Ok(directory)
        })
        .await
        .map_err(|error| AppError::Internal(format!("workspace task failed: {error}")))?
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to materialize workspace for '{request_id}': {error}"
            ))
        })?;

        debug!(
            request_id = %request_id,
            path = %directory.path().display(),
            "workspace materialized"
        );

        Ok(Box::new(TempWorkspace { directory }))
    }
}

/// Copies `source` into `destination`, skipping local engine state.
fn copy_dir_recursive(source: &Path, destination: &Path) -> io::Result<()> {
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if is_local_state(file_name.to_string_lossy().as_ref()) {
            continue;
        }

        let target = destination.join(&file_name);
        if entry.file_type()?.is_dir() {
            fs::create_dir_all(target.as_path())?;
            copy_dir_recursive(entry.path().as_path(), target.as_path())?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }

    Ok(())
}

fn is_local_state(file_name: &str) -> bool {
    file_name == ".terraform"
        || file_name == VARIABLES_FILE
        || file_name.ends_with(".tfstate")
        || file_name.ends_with(".tfstate.backup")
}
