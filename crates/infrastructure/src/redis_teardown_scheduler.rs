//! Redis-backed durable teardown scheduler.
//!
//! Each trigger is a hash under `{prefix}:trigger:{name}`; a sorted set under
//! `{prefix}:due` indexes triggers that still have an invocation target, scored
//! by firing time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ephemera_application::{
    DueTrigger, TeardownScheduler, TeardownTriggerSource, TriggerRegistration,
};
use ephemera_core::{AppError, AppResult};
use ephemera_domain::TeardownPayload;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tracing::warn;

const CREATE_TRIGGER_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('HSET', KEYS[1],
  'name', ARGV[1],
  'fire_at', ARGV[2],
  'description', ARGV[3],
  'target_id', ARGV[4],
  'payload', ARGV[5],
  'state', 'scheduled')
redis.call('ZADD', KEYS[2], ARGV[2], ARGV[1])
return 1
"#;

const REMOVE_TARGET_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'target_id') ~= ARGV[2] then
  return 0
end
redis.call('HDEL', KEYS[1], 'target_id', 'payload')
redis.call('ZREM', KEYS[2], ARGV[1])
return 1
"#;

const DELETE_TRIGGER_SCRIPT: &str = r#"
redis.call('ZREM', KEYS[2], ARGV[1])
return redis.call('DEL', KEYS[1])
"#;

const CLAIM_DUE_SCRIPT: &str = r#"
local names = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[2]))
for _, name in ipairs(names) do
  redis.call('ZADD', KEYS[1], ARGV[3], name)
  redis.call('HSET', ARGV[5] .. name, 'claimed_by', ARGV[4])
end
return names
"#;

const RENEW_CLAIM_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'claimed_by') ~= ARGV[2] then
  return 0
end
if not redis.call('ZSCORE', KEYS[2], ARGV[1]) then
  return 0
end
redis.call('ZADD', KEYS[2], ARGV[3], ARGV[1])
return 1
"#;

const MARK_FAILED_SCRIPT: &str = r#"
redis.call('ZREM', KEYS[2], ARGV[1])
if redis.call('EXISTS', KEYS[1]) == 1 then
  redis.call('HSET', KEYS[1], 'state', 'failed', 'last_error', ARGV[2])
end
return 1
"#;

/// Redis implementation of both scheduler ports.
#[derive(Clone)]
pub struct RedisTeardownScheduler {
    client: redis::Client,
    key_prefix: String,
}

impl RedisTeardownScheduler {
    /// Creates a scheduler with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn trigger_key(&self, name: &str) -> String {
        format!("{}{name}", self.trigger_key_prefix())
    }

    fn trigger_key_prefix(&self) -> String {
        format!("{}:trigger:", self.key_prefix)
    }

    fn due_key(&self) -> String {
        format!("{}:due", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

fn validate_holder(holder_id: &str) -> AppResult<()> {
    if holder_id.trim().is_empty() {
        return Err(AppError::Validation(
            "teardown claim holder_id must not be empty".to_owned(),
        ));
    }

    Ok(())
}

fn validate_lease(lease_seconds: u32) -> AppResult<()> {
    if lease_seconds == 0 {
        return Err(AppError::Validation(
            "teardown lease_seconds must be greater than zero".to_owned(),
        ));
    }

    Ok(())
}

fn validate_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::Validation(
            "teardown trigger name must not be empty".to_owned(),
        ));
    }

    Ok(())
}

#[async_trait]
impl TeardownScheduler for RedisTeardownScheduler {
    async fn trigger_exists(&self, name: &str) -> AppResult<bool> {
        validate_name(name)?;
        let mut connection = self.connection().await?;

        connection
            .exists::<_, bool>(self.trigger_key(name))
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to check teardown trigger: {error}"))
            })
    }

    async fn create_trigger(&self, registration: TriggerRegistration) -> AppResult<()> {
        validate_name(registration.name.as_str())?;
        if registration.delay_minutes == 0 {
            return Err(AppError::Validation(
                "teardown trigger delay must be greater than zero".to_owned(),
            ));
        }

        let payload = registration.payload.to_json()?;
        let mut connection = self.connection().await?;

        let created = Script::new(CREATE_TRIGGER_SCRIPT)
            .key(self.trigger_key(registration.name.as_str()))
            .key(self.due_key())
            .arg(registration.name.as_str())
            .arg(registration.fire_at.timestamp())
            .arg(registration.description.as_str())
            .arg(registration.target_id.as_str())
            .arg(payload)
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to create teardown trigger: {error}"))
            })?;

        if created == 0 {
            return Err(AppError::Conflict(format!(
                "teardown trigger '{}' already exists",
                registration.name
            )));
        }

        Ok(())
    }

    async fn remove_target(&self, name: &str, target_id: &str) -> AppResult<()> {
        validate_name(name)?;
        let mut connection = self.connection().await?;

        let removed = Script::new(REMOVE_TARGET_SCRIPT)
            .key(self.trigger_key(name))
            .key(self.due_key())
            .arg(name)
            .arg(target_id)
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to remove teardown target: {error}"))
            })?;

        if removed == 0 {
            return Err(AppError::NotFound(format!(
                "teardown trigger '{name}' has no target '{target_id}'"
            )));
        }

        Ok(())
    }

    async fn delete_trigger(&self, name: &str) -> AppResult<()> {
        validate_name(name)?;
        let mut connection = self.connection().await?;

        Script::new(DELETE_TRIGGER_SCRIPT)
            .key(self.trigger_key(name))
            .key(self.due_key())
            .arg(name)
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to delete teardown trigger: {error}"))
            })?;

        Ok(())
    }
}

#[async_trait]
impl TeardownTriggerSource for RedisTeardownScheduler {
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        lease_seconds: u32,
        holder_id: &str,
    ) -> AppResult<Vec<DueTrigger>> {
        if limit == 0 {
            return Err(AppError::Validation(
                "teardown claim limit must be greater than zero".to_owned(),
            ));
        }
        validate_lease(lease_seconds)?;
        validate_holder(holder_id)?;

        let mut connection = self.connection().await?;
        let lease_until = now.timestamp().saturating_add(i64::from(lease_seconds));

        let names = Script::new(CLAIM_DUE_SCRIPT)
            .key(self.due_key())
            .arg(now.timestamp())
            .arg(limit)
            .arg(lease_until)
            .arg(holder_id)
            .arg(self.trigger_key_prefix())
            .invoke_async::<Vec<String>>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to claim due teardown triggers: {error}"))
            })?;

        let mut claimed = Vec::with_capacity(names.len());
        for name in names {
            match self.load_payload(name.as_str()).await {
                Ok(Some(payload)) => claimed.push(DueTrigger { name, payload }),
                Ok(None) => {
                    warn!(trigger = %name, "due trigger has no payload, dropping from index");
                    self.mark_failed(name.as_str(), "trigger payload missing")
                        .await?;
                }
                Err(error) => {
                    warn!(trigger = %name, error = %error, "due trigger payload is unreadable");
                    self.mark_failed(name.as_str(), error.to_string().as_str())
                        .await?;
                }
            }
        }

        Ok(claimed)
    }

    async fn renew_claim(
        &self,
        name: &str,
        holder_id: &str,
        now: DateTime<Utc>,
        lease_seconds: u32,
    ) -> AppResult<bool> {
        validate_name(name)?;
        validate_holder(holder_id)?;
        validate_lease(lease_seconds)?;
        let mut connection = self.connection().await?;

        let renewed = Script::new(RENEW_CLAIM_SCRIPT)
            .key(self.trigger_key(name))
            .key(self.due_key())
            .arg(name)
            .arg(holder_id)
            .arg(now.timestamp().saturating_add(i64::from(lease_seconds)))
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to renew teardown claim: {error}"))
            })?;

        Ok(renewed == 1)
    }

    async fn load_payload(&self, name: &str) -> AppResult<Option<TeardownPayload>> {
        validate_name(name)?;
        let mut connection = self.connection().await?;

        let raw = connection
            .hget::<_, _, Option<String>>(self.trigger_key(name), "payload")
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to load teardown payload: {error}"))
            })?;

        raw.map(|raw| TeardownPayload::from_json(raw.as_str()))
            .transpose()
    }

    async fn mark_failed(&self, name: &str, reason: &str) -> AppResult<()> {
        validate_name(name)?;
        let mut connection = self.connection().await?;

        Script::new(MARK_FAILED_SCRIPT)
            .key(self.trigger_key(name))
            .key(self.due_key())
            .arg(name)
            .arg(reason)
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to mark teardown trigger failed: {error}"))
            })?;

        Ok(())
    }
}
