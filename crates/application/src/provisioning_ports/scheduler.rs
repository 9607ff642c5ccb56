use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ephemera_core::AppResult;
use ephemera_domain::TeardownPayload;

/// One-shot teardown trigger registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRegistration {
    /// Trigger name, equal to the request id.
    pub name: String,
    /// Delay after registration in minutes.
    pub delay_minutes: u32,
    /// Absolute firing time.
    pub fire_at: DateTime<Utc>,
    /// Operator-facing description.
    pub description: String,
    /// Invocation target that receives the payload.
    pub target_id: String,
    /// Payload handed to the destroyer.
    pub payload: TeardownPayload,
}

/// Durable scheduler port used to register and deregister teardown triggers.
#[async_trait]
pub trait TeardownScheduler: Send + Sync {
    /// Returns whether a trigger with this name is registered.
    async fn trigger_exists(&self, name: &str) -> AppResult<bool>;

    /// Registers a one-shot trigger. Fails with `Conflict` when the name exists.
    async fn create_trigger(&self, registration: TriggerRegistration) -> AppResult<()>;

    /// Removes the invocation target from a trigger.
    async fn remove_target(&self, name: &str, target_id: &str) -> AppResult<()>;

    /// Deletes the trigger.
    async fn delete_trigger(&self, name: &str) -> AppResult<()>;
}

/// Trigger that reached its firing time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueTrigger {
    /// Trigger name.
    pub name: String,
    /// Payload registered with the trigger.
    pub payload: TeardownPayload,
}

/// Firing side of the durable scheduler consumed by the teardown runtime.
#[async_trait]
pub trait TeardownTriggerSource: Send + Sync {
    /// Claims up to `limit` due triggers for `holder_id` until
    /// `now + lease_seconds`.
    ///
    /// A claimed trigger fires again after the lease unless it is deleted,
    /// marked failed, or its claim is renewed first.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        lease_seconds: u32,
        holder_id: &str,
    ) -> AppResult<Vec<DueTrigger>>;

    /// Extends a claim held by `holder_id` to `now + lease_seconds`.
    ///
    /// Returns `false` when the claim is gone or another holder re-claimed
    /// the trigger.
    async fn renew_claim(
        &self,
        name: &str,
        holder_id: &str,
        now: DateTime<Utc>,
        lease_seconds: u32,
    ) -> AppResult<bool>;

    /// Loads the payload of a registered trigger for manual re-invocation.
    async fn load_payload(&self, name: &str) -> AppResult<Option<TeardownPayload>>;

    /// Stops a trigger from firing and records why, keeping it registered.
    async fn mark_failed(&self, name: &str, reason: &str) -> AppResult<()>;
}
