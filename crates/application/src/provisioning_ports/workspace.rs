use std::path::Path;

use async_trait::async_trait;
use ephemera_core::AppResult;
use ephemera_domain::{RequestId, VariablesDocument};

/// Isolated directory holding the provisioning template and variables.
///
/// Implementations remove the directory when dropped.
pub trait Workspace: Send + Sync {
    /// Returns the workspace root.
    fn path(&self) -> &Path;
}

/// Creates a fresh workspace per engine invocation.
#[async_trait]
pub trait WorkspaceFactory: Send + Sync {
    /// Copies the template into a new directory and writes the variables document.
    async fn materialize(
        &self,
        request_id: &RequestId,
        variables: &VariablesDocument,
    ) -> AppResult<Box<dyn Workspace>>;
}
