use ephemera_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::access::{AccessRequest, RequestId};
use crate::target::TargetDefinition;

/// Value of the `ManagedBy` tag on every provisioned resource.
pub const MANAGED_BY_TAG: &str = "Auto-Bastion";

/// Tags applied to every provisioned resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceTags {
    #[serde(rename = "ManagedBy")]
    managed_by: String,
    #[serde(rename = "User")]
    user: String,
    #[serde(rename = "RequestId")]
    request_id: String,
}

impl ResourceTags {
    /// Returns the `ManagedBy` tag.
    #[must_use]
    pub fn managed_by(&self) -> &str {
        self.managed_by.as_str()
    }

    /// Returns the `User` tag.
    #[must_use]
    pub fn user(&self) -> &str {
        self.user.as_str()
    }

    /// Returns the `RequestId` tag.
    #[must_use]
    pub fn request_id(&self) -> &str {
        self.request_id.as_str()
    }
}

/// Exact variables input handed to the provisioning engine.
///
/// The same document drives apply and the matching destroy, so field order
/// and names are part of the contract: serialization of a deserialized copy
/// must reproduce the original bytes. Unknown fields are rejected for the
/// same reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariablesDocument {
    user_ssh_key_name: String,
    user_public_ip: String,
    target_sg_id: String,
    target_port: u16,
    aws_region: String,
    tags: ResourceTags,
}

impl VariablesDocument {
    /// Builds the document for one access request against one target.
    #[must_use]
    pub fn build(
        request_id: &RequestId,
        request: &AccessRequest,
        target: &TargetDefinition,
        region: &str,
    ) -> Self {
        Self {
            user_ssh_key_name: request_id.as_str().to_owned(),
            user_public_ip: request.source_ip().to_string(),
            target_sg_id: target.security_group_id().to_owned(),
            target_port: target.port(),
            aws_region: region.to_owned(),
            tags: ResourceTags {
                managed_by: MANAGED_BY_TAG.to_owned(),
                user: request.requester().user_name().to_owned(),
                request_id: request_id.as_str().to_owned(),
            },
        }
    }

    /// Serializes the document in its canonical engine form.
    pub fn to_json_bytes(&self) -> AppResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|error| {
            AppError::Internal(format!("failed to serialize variables document: {error}"))
        })
    }

    /// Returns the key pair name created for the request.
    #[must_use]
    pub fn user_ssh_key_name(&self) -> &str {
        self.user_ssh_key_name.as_str()
    }

    /// Returns the address granted ingress.
    #[must_use]
    pub fn user_public_ip(&self) -> &str {
        self.user_public_ip.as_str()
    }

    /// Returns the target security group id.
    #[must_use]
    pub fn target_sg_id(&self) -> &str {
        self.target_sg_id.as_str()
    }

    /// Returns the target port.
    #[must_use]
    pub fn target_port(&self) -> u16 {
        self.target_port
    }

    /// Returns the region resources are created in.
    #[must_use]
    pub fn aws_region(&self) -> &str {
        self.aws_region.as_str()
    }

    /// Returns the resource tag set.
    #[must_use]
    pub fn tags(&self) -> &ResourceTags {
        &self.tags
    }
}

/// Payload carried by a teardown trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TeardownPayload {
    request_id: RequestId,
    #[serde(rename = "tfvars")]
    variables: VariablesDocument,
}

impl TeardownPayload {
    /// Creates a payload, checking that the document belongs to the request.
    pub fn new(request_id: RequestId, variables: VariablesDocument) -> AppResult<Self> {
        let payload = Self {
            request_id,
            variables,
        };
        payload.validate()?;
        Ok(payload)
    }

    /// Parses a payload read back from the scheduler.
    pub fn from_json(raw: &str) -> AppResult<Self> {
        let payload = serde_json::from_str::<Self>(raw).map_err(|error| {
            AppError::Validation(format!("invalid teardown payload: {error}"))
        })?;
        payload.validate()?;
        Ok(payload)
    }

    /// Serializes the payload for the scheduler.
    pub fn to_json(&self) -> AppResult<String> {
        serde_json::to_string(self).map_err(|error| {
            AppError::Internal(format!("failed to serialize teardown payload: {error}"))
        })
    }

    fn validate(&self) -> AppResult<()> {
        if self.request_id.as_str() != self.variables.tags().request_id() {
            return Err(AppError::Validation(format!(
                "teardown payload request id '{}' does not match variables tag '{}'",
                self.request_id,
                self.variables.tags().request_id()
            )));
        }

        Ok(())
    }

    /// Returns the request id, which is also the trigger name.
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Returns the apply-time variables document.
    #[must_use]
    pub fn variables(&self) -> &VariablesDocument {
        &self.variables
    }
}
