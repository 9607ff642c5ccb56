//! Scheduled destruction of provisioned resources.

use std::sync::Arc;

use ephemera_core::{AppError, AppResult};
use ephemera_domain::{GrantState, RequestId, TeardownPayload};
use thiserror::Error;
use tracing::{error, info};

use crate::provisioning_ports::{ProvisioningEngine, TeardownScheduler, WorkspaceFactory};

/// Teardown failures, split by whether resources still exist.
#[derive(Debug, Error)]
pub enum TeardownError {
    /// Destroy did not complete; resources may still exist and the trigger
    /// remains registered.
    #[error("teardown of '{request_id}' failed: {source}")]
    DestroyFailed {
        /// Request being torn down.
        request_id: RequestId,
        /// Underlying failure.
        source: AppError,
    },

    /// Resources were destroyed but the trigger could not be deregistered.
    #[error("resources of '{request_id}' were destroyed but trigger cleanup failed: {source}")]
    DeregistrationFailed {
        /// Request whose trigger is left behind.
        request_id: RequestId,
        /// Underlying failure.
        source: AppError,
    },
}

impl TeardownError {
    /// Returns the affected request id.
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::DestroyFailed { request_id, .. } | Self::DeregistrationFailed { request_id, .. } => {
                request_id
            }
        }
    }

    /// Returns whether provisioned resources may still exist.
    #[must_use]
    pub fn resources_remain(&self) -> bool {
        matches!(self, Self::DestroyFailed { .. })
    }
}

/// Result of a completed teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    /// Request that was torn down.
    pub request_id: RequestId,
    /// Final grant state.
    pub state: GrantState,
}

/// Destroys the resources described by a teardown payload.
#[derive(Clone)]
pub struct TeardownService {
    engine: Arc<dyn ProvisioningEngine>,
    workspaces: Arc<dyn WorkspaceFactory>,
    scheduler: Arc<dyn TeardownScheduler>,
    target_id: String,
}

impl TeardownService {
    /// Creates a teardown service deregistering `target_id` from fired triggers.
    #[must_use]
    pub fn new(
        engine: Arc<dyn ProvisioningEngine>,
        workspaces: Arc<dyn WorkspaceFactory>,
        scheduler: Arc<dyn TeardownScheduler>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            workspaces,
            scheduler,
            target_id: target_id.into(),
        }
    }

    /// Runs init and destroy in a fresh workspace, then deregisters the trigger.
    ///
    /// Nothing is deregistered when destroy fails, so the trigger can be
    /// re-invoked with the same payload.
    pub async fn destroy(&self, payload: &TeardownPayload) -> Result<TeardownReport, TeardownError> {
        let request_id = payload.request_id().clone();
        let mut state = GrantState::Active
            .advance(GrantState::TearingDown)
            .map_err(|source| TeardownError::DestroyFailed {
                request_id: request_id.clone(),
                source,
            })?;

        info!(request_id = %request_id, state = state.as_str(), "tearing down bastion");

        if let Err(source) = self.run_destroy(payload).await {
            error!(
                alert = true,
                request_id = %request_id,
                error = %source,
                "teardown failed, resources may still exist"
            );
            return Err(TeardownError::DestroyFailed { request_id, source });
        }

        state = state
            .advance(GrantState::Destroyed)
            .map_err(|source| TeardownError::DestroyFailed {
                request_id: request_id.clone(),
                source,
            })?;
        info!(request_id = %request_id, state = state.as_str(), "resources destroyed");

        if let Err(source) = self.deregister(request_id.as_str()).await {
            error!(
                alert = true,
                request_id = %request_id,
                error = %source,
                "resources destroyed but teardown trigger is still registered"
            );
            return Err(TeardownError::DeregistrationFailed { request_id, source });
        }

        info!(request_id = %request_id, "teardown trigger deregistered");

        Ok(TeardownReport { request_id, state })
    }

    async fn run_destroy(&self, payload: &TeardownPayload) -> AppResult<()> {
        let workspace = self
            .workspaces
            .materialize(payload.request_id(), payload.variables())
            .await?;

        self.engine.init(workspace.path()).await?.into_result()?;
        self.engine.destroy(workspace.path()).await?.into_result()?;

        Ok(())
    }

    async fn deregister(&self, name: &str) -> AppResult<()> {
        self.scheduler
            .remove_target(name, self.target_id.as_str())
            .await?;
        self.scheduler.delete_trigger(name).await
    }
}

#[cfg(test)]
mod tests;
