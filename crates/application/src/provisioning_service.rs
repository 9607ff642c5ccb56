//! Provision, schedule teardown, deliver credential.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ephemera_core::{AppError, AppResult};
use ephemera_domain::{
    AccessGrant, AccessRequest, Credential, GrantState, RequestId, TargetDefinition,
    TeardownPayload, VariablesDocument,
};
use secrecy::ExposeSecret;
use tracing::{error, info, warn};

use crate::config_service::ConfigService;
use crate::provisioning_ports::{
    ChatNotifier, EngineOutcome, ProvisioningEngine, TeardownScheduler, TriggerRegistration,
    WorkspaceFactory,
};

mod credential_delivery;

/// Engine output holding the bastion address.
pub const BASTION_ENDPOINT_OUTPUT: &str = "bastion_public_ip";

/// Engine output holding the generated private key.
pub const PRIVATE_KEY_OUTPUT: &str = "ssh_private_key_pem";

/// What to do when apply succeeds but required outputs are absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingOutputPolicy {
    /// Destroy the just-created resources from the same workspace.
    DestroyImmediately,
    /// Leave resources in place for an operator.
    LeaveForOperator,
}

impl MissingOutputPolicy {
    /// Parses a configuration value (`destroy` or `leave`).
    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim() {
            "destroy" => Ok(Self::DestroyImmediately),
            "leave" => Ok(Self::LeaveForOperator),
            _ => Err(AppError::Validation(format!(
                "unknown missing output policy '{value}', expected 'destroy' or 'leave'"
            ))),
        }
    }
}

/// Deployment settings for provisioning.
#[derive(Debug, Clone)]
pub struct ProvisioningSettings {
    /// Region resources are created in.
    pub region: String,
    /// Scheduler invocation target of the destroyer.
    pub destroyer_target_id: String,
    /// Cleanup behavior for missing outputs.
    pub missing_output_policy: MissingOutputPolicy,
}

/// Orchestrates one access request from apply to credential delivery.
#[derive(Clone)]
pub struct ProvisioningService {
    config_service: ConfigService,
    engine: Arc<dyn ProvisioningEngine>,
    workspaces: Arc<dyn WorkspaceFactory>,
    scheduler: Arc<dyn TeardownScheduler>,
    chat: Arc<dyn ChatNotifier>,
    settings: ProvisioningSettings,
}

impl ProvisioningService {
    /// Creates a provisioning service.
    #[must_use]
    pub fn new(
        config_service: ConfigService,
        engine: Arc<dyn ProvisioningEngine>,
        workspaces: Arc<dyn WorkspaceFactory>,
        scheduler: Arc<dyn TeardownScheduler>,
        chat: Arc<dyn ChatNotifier>,
        settings: ProvisioningSettings,
    ) -> Self {
        Self {
            config_service,
            engine,
            workspaces,
            scheduler,
            chat,
            settings,
        }
    }

    /// Runs the full request flow and reports the outcome to the requester.
    ///
    /// An interim acknowledgement is posted before provisioning starts; the
    /// final success or failure arrives as a separate message.
    pub async fn handle(&self, request: AccessRequest) -> AppResult<AccessGrant> {
        self.acknowledge(&request).await;

        match self.provision(&request, Utc::now()).await {
            Ok(grant) => {
                info!(
                    request_id = %grant.request_id(),
                    target = %request.target(),
                    expires_at = %grant.expires_at(),
                    "access granted"
                );
                Ok(grant)
            }
            Err(error) => {
                warn!(
                    target = %request.target(),
                    user_id = %request.requester().user_id(),
                    error = %error,
                    "failed to provision access"
                );
                self.report_failure(&request, &error).await;
                Err(error)
            }
        }
    }

    /// Provisions access and returns the active grant.
    ///
    /// Fails before any engine call for unknown targets and request id
    /// collisions. Engine failures abort before scheduling and delivery.
    pub async fn provision(
        &self,
        request: &AccessRequest,
        now: DateTime<Utc>,
    ) -> AppResult<AccessGrant> {
        let config = self.config_service.get().await?;
        let target = config
            .target(request.target())
            .cloned()
            .ok_or_else(|| AppError::UnknownTarget(request.target().to_owned()))?;

        let request_id = RequestId::generate(request.requester().user_name(), now);
        if self.scheduler.trigger_exists(request_id.as_str()).await? {
            return Err(AppError::Conflict(format!(
                "request '{request_id}' is already active, retry in a moment"
            )));
        }

        let variables =
            VariablesDocument::build(&request_id, request, &target, self.settings.region.as_str());
        let mut grant = AccessGrant::open(
            request_id.clone(),
            variables.clone(),
            now,
            request.duration_minutes(),
        );
        grant.advance(GrantState::Provisioning)?;

        info!(
            request_id = %request_id,
            target = %request.target(),
            duration_minutes = request.duration_minutes(),
            "provisioning bastion"
        );

        let credential = self.apply(&mut grant).await?;
        grant.advance(GrantState::Active)?;

        self.register_teardown(&mut grant, request.duration_minutes())
            .await?;
        self.deliver_credential(request, &request_id, &target, &credential)
            .await?;

        Ok(grant)
    }

    /// Materializes a workspace, runs init and apply, and reads outputs.
    ///
    /// The workspace is dropped, and therefore removed, on every return path.
    async fn apply(&self, grant: &mut AccessGrant) -> AppResult<Credential> {
        let workspace = match self
            .workspaces
            .materialize(grant.request_id(), grant.variables())
            .await
        {
            Ok(workspace) => workspace,
            Err(error) => {
                grant.fail(error.to_string())?;
                return Err(error);
            }
        };

        let applied: AppResult<EngineOutcome> = async {
            self.engine.init(workspace.path()).await?.into_result()?;
            self.engine.apply(workspace.path()).await?.into_result()
        }
        .await;
        if let Err(error) = applied {
            grant.fail(error.to_string())?;
            return Err(error);
        }

        match self.read_credential(workspace.path()).await {
            Ok(credential) => Ok(credential),
            Err(error) => {
                grant.fail_with_orphan(error.to_string())?;
                error!(
                    request_id = %grant.request_id(),
                    error = %error,
                    policy = ?self.settings.missing_output_policy,
                    "apply succeeded without usable outputs"
                );
                self.resolve_orphan(grant, workspace.path()).await;
                Err(error)
            }
        }
    }

    async fn read_credential(&self, workspace: &Path) -> AppResult<Credential> {
        let endpoint = self
            .engine
            .read_output(workspace, BASTION_ENDPOINT_OUTPUT)
            .await?
            .ok_or_else(|| AppError::MissingOutput(BASTION_ENDPOINT_OUTPUT.to_owned()))?;
        let private_key = self
            .engine
            .read_output(workspace, PRIVATE_KEY_OUTPUT)
            .await?
            .ok_or_else(|| AppError::MissingOutput(PRIVATE_KEY_OUTPUT.to_owned()))?;

        Ok(Credential::new(
            endpoint.expose_secret().trim(),
            private_key,
        ))
    }

    async fn resolve_orphan(&self, grant: &mut AccessGrant, workspace: &Path) {
        if self.settings.missing_output_policy == MissingOutputPolicy::LeaveForOperator {
            error!(
                alert = true,
                request_id = %grant.request_id(),
                state = grant.state().as_str(),
                "resources left in place for operator cleanup"
            );
            return;
        }

        if let Err(error) = grant.advance(GrantState::TearingDown) {
            warn!(request_id = %grant.request_id(), error = %error, "cannot tear down grant");
            return;
        }

        let destroyed = match self.engine.destroy(workspace).await {
            Ok(outcome) => outcome.into_result().map(|_| ()),
            Err(error) => Err(error),
        };

        match destroyed {
            Ok(()) => {
                if grant.advance(GrantState::Destroyed).is_ok() {
                    info!(
                        request_id = %grant.request_id(),
                        "destroyed resources of failed grant"
                    );
                }
            }
            Err(error) => {
                if let Err(state_error) = grant.fail(error.to_string()) {
                    warn!(
                        request_id = %grant.request_id(),
                        error = %state_error,
                        "cannot record teardown failure on grant"
                    );
                }
                error!(
                    alert = true,
                    request_id = %grant.request_id(),
                    error = %error,
                    "failed to destroy resources of failed grant, operator cleanup required"
                );
            }
        }
    }

    /// Registers the one-shot teardown trigger for an active grant.
    ///
    /// On failure the grant is failed with orphaned resources.
    async fn register_teardown(
        &self,
        grant: &mut AccessGrant,
        duration_minutes: u32,
    ) -> AppResult<()> {
        let registration = TriggerRegistration {
            name: grant.request_id().as_str().to_owned(),
            delay_minutes: duration_minutes,
            fire_at: grant.expires_at(),
            description: format!("Auto-Bastion teardown for {}", grant.request_id()),
            target_id: self.settings.destroyer_target_id.clone(),
            payload: TeardownPayload::new(grant.request_id().clone(), grant.variables().clone())?,
        };

        if let Err(scheduler_error) = self.scheduler.create_trigger(registration).await {
            grant.fail(scheduler_error.to_string())?;
            error!(
                alert = true,
                request_id = %grant.request_id(),
                state = grant.state().as_str(),
                error = %scheduler_error,
                "teardown trigger registration failed, grant has no automatic teardown"
            );
            return Err(AppError::SchedulerRegistration(scheduler_error.to_string()));
        }

        info!(
            request_id = %grant.request_id(),
            fire_at = %grant.expires_at(),
            "teardown scheduled"
        );

        Ok(())
    }

    async fn deliver_credential(
        &self,
        request: &AccessRequest,
        request_id: &RequestId,
        target: &TargetDefinition,
        credential: &Credential,
    ) -> AppResult<()> {
        let attachment = credential_delivery::credential_attachment(
            request,
            request_id,
            target,
            credential,
        );

        self.chat.upload_attachment(attachment).await
    }

    async fn acknowledge(&self, request: &AccessRequest) {
        let text = credential_delivery::acknowledgement_text(request);
        if let Err(error) = self
            .chat
            .post_message(request.requester().user_id(), text.as_str())
            .await
        {
            warn!(
                user_id = %request.requester().user_id(),
                error = %error,
                "failed to post acknowledgement"
            );
        }
    }

    async fn report_failure(&self, request: &AccessRequest, failure: &AppError) {
        let text = credential_delivery::failure_text(failure);
        if let Err(error) = self
            .chat
            .post_message(request.requester().user_id(), text.as_str())
            .await
        {
            error!(
                user_id = %request.requester().user_id(),
                error = %error,
                "failed to post provisioning failure"
            );
        }
    }
}
