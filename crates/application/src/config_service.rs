//! Lazily loaded broker configuration.

use std::collections::HashMap;
use std::sync::Arc;

use ephemera_core::{AppError, AppResult};
use ephemera_domain::TargetDefinition;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::info;

use crate::provisioning_ports::ConfigSource;

#[derive(Debug, Deserialize)]
struct ChatCredentials {
    signing_secret: SecretString,
    bot_token: SecretString,
}

/// Read-only configuration document: chat credentials and target catalog.
#[derive(Debug, Deserialize)]
pub struct BrokerConfig {
    chat: ChatCredentials,
    targets: HashMap<String, TargetDefinition>,
}

impl BrokerConfig {
    /// Parses and validates a JSON configuration document.
    pub fn from_json(raw: &[u8]) -> AppResult<Self> {
        let config = serde_json::from_slice::<Self>(raw).map_err(|error| {
            AppError::Configuration(format!("invalid configuration document: {error}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        if self.chat.signing_secret.expose_secret().trim().is_empty() {
            return Err(AppError::Configuration(
                "chat.signing_secret must not be empty".to_owned(),
            ));
        }

        if self.chat.bot_token.expose_secret().trim().is_empty() {
            return Err(AppError::Configuration(
                "chat.bot_token must not be empty".to_owned(),
            ));
        }

        for (name, target) in &self.targets {
            if name.trim().is_empty() {
                return Err(AppError::Configuration(
                    "target names must not be empty".to_owned(),
                ));
            }

            target.validate().map_err(|error| {
                AppError::Configuration(format!("target '{name}' is invalid: {error}"))
            })?;
        }

        Ok(())
    }

    /// Returns the shared secret used to verify inbound commands.
    #[must_use]
    pub fn signing_secret(&self) -> &SecretString {
        &self.chat.signing_secret
    }

    /// Returns the chat bot token used for outbound messages.
    #[must_use]
    pub fn bot_token(&self) -> &SecretString {
        &self.chat.bot_token
    }

    /// Looks up a target by name.
    #[must_use]
    pub fn target(&self, name: &str) -> Option<&TargetDefinition> {
        self.targets.get(name)
    }

    /// Returns the number of configured targets.
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }
}

/// Process-wide configuration provider.
///
/// The document is fetched once; concurrent first callers wait on a single
/// load. A failed load is not cached, so the next caller retries.
#[derive(Clone)]
pub struct ConfigService {
    source: Arc<dyn ConfigSource>,
    cache: Arc<OnceCell<Arc<BrokerConfig>>>,
}

impl ConfigService {
    /// Creates a provider over a configuration source.
    #[must_use]
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self {
            source,
            cache: Arc::new(OnceCell::new()),
        }
    }

    /// Returns the cached configuration, loading it on first use.
    pub async fn get(&self) -> AppResult<Arc<BrokerConfig>> {
        let config = self
            .cache
            .get_or_try_init(|| async {
                let raw = self.source.fetch().await.map_err(|error| match error {
                    AppError::Configuration(message) => AppError::Configuration(message),
                    other => AppError::Configuration(format!(
                        "failed to load configuration from {}: {other}",
                        self.source.describe()
                    )),
                })?;
                let config = BrokerConfig::from_json(raw.as_slice())?;

                info!(
                    source = %self.source.describe(),
                    target_count = config.target_count(),
                    "broker configuration loaded"
                );

                Ok::<_, AppError>(Arc::new(config))
            })
            .await?;

        Ok(Arc::clone(config))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use ephemera_core::{AppError, AppResult};
    use secrecy::ExposeSecret;

    use super::{BrokerConfig, ConfigService};
    use crate::provisioning_ports::ConfigSource;

    const VALID_DOCUMENT: &str = r#"{
        "chat": { "signing_secret": "s3cret", "bot_token": "xoxb-1" },
        "targets": {
            "db1": { "target_sg_id": "sg-1", "target_port": 5432, "target_host": "db.internal" }
        }
    }"#;

    struct CountingSource {
        fetches: AtomicUsize,
        failures_remaining: AtomicUsize,
    }

    impl CountingSource {
        fn new(failures: usize) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                failures_remaining: AtomicUsize::new(failures),
            }
        }
    }

    #[async_trait]
    impl ConfigSource for CountingSource {
        async fn fetch(&self) -> AppResult<Vec<u8>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.failures_remaining.load(Ordering::SeqCst) > 0 {
                self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
                return Err(AppError::Internal("blob store unavailable".to_owned()));
            }

            Ok(VALID_DOCUMENT.as_bytes().to_vec())
        }

        fn describe(&self) -> String {
            "memory".to_owned()
        }
    }

    #[test]
    fn config_parses_targets_and_secrets() {
        let config = BrokerConfig::from_json(VALID_DOCUMENT.as_bytes());
        assert!(config.is_ok());
        let config = config.unwrap_or_else(|_| unreachable!());
        assert_eq!(config.signing_secret().expose_secret(), "s3cret");
        assert_eq!(config.target("db1").map(|target| target.port()), Some(5432));
        assert!(config.target("db2").is_none());
    }

    #[test]
    fn config_rejects_blank_signing_secret() {
        let raw = r#"{"chat":{"signing_secret":" ","bot_token":"t"},"targets":{}}"#;
        assert!(matches!(
            BrokerConfig::from_json(raw.as_bytes()),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn config_rejects_invalid_target() {
        let raw = r#"{"chat":{"signing_secret":"s","bot_token":"t"},"targets":{"db":{"target_sg_id":"sg","target_port":0,"target_host":"h"}}}"#;
        assert!(matches!(
            BrokerConfig::from_json(raw.as_bytes()),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn config_debug_output_redacts_secrets() {
        let config = BrokerConfig::from_json(VALID_DOCUMENT.as_bytes())
            .unwrap_or_else(|_| unreachable!());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("xoxb-1"));
    }

    #[tokio::test]
    async fn config_is_fetched_once() {
        let source = Arc::new(CountingSource::new(0));
        let service = ConfigService::new(source.clone());

        assert!(service.get().await.is_ok());
        assert!(service.clone().get().await.is_ok());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_load_is_retried_on_next_call() {
        let source = Arc::new(CountingSource::new(1));
        let service = ConfigService::new(source.clone());

        assert!(matches!(
            service.get().await,
            Err(AppError::Configuration(_))
        ));
        assert!(service.get().await.is_ok());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }
}
