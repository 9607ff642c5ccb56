use std::sync::Arc;
use std::time::Duration;

use ephemera_application::{
    ChatNotifier, ConfigService, ConfigSource, ProvisioningService, ProvisioningSettings,
};
use ephemera_core::AppError;
use ephemera_infrastructure::{
    ConsoleChatNotifier, FileConfigSource, HttpConfigSource, RedisTeardownScheduler,
    SlackChatNotifier, TemplateWorkspaceFactory, TerraformEngine,
};

use crate::api_config::{ApiConfig, ChatProviderConfig, ConfigLocation};
use crate::state::AppState;

pub fn build_app_state(config: &ApiConfig) -> Result<AppState, AppError> {
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;

    let config_service = ConfigService::new(build_config_source(config, http_client.clone()));
    let chat = build_chat_notifier(config, http_client, config_service.clone());
    let scheduler = Arc::new(RedisTeardownScheduler::new(
        build_redis_client(config.redis_url.as_str())?,
        config.scheduler_key_prefix.clone(),
    ));
    let engine = Arc::new(TerraformEngine::new(
        config.terraform_bin.clone(),
        Duration::from_secs(config.terraform_timeout_seconds),
    ));
    let workspaces = Arc::new(TemplateWorkspaceFactory::new(
        config.template_root.clone(),
        config.state_key_prefix.clone(),
    ));

    let provisioning_service = ProvisioningService::new(
        config_service.clone(),
        engine,
        workspaces,
        scheduler,
        chat,
        ProvisioningSettings {
            region: config.aws_region.clone(),
            destroyer_target_id: config.destroyer_target_id.clone(),
            missing_output_policy: config.missing_output_policy,
        },
    );

    Ok(AppState {
        config_service,
        provisioning_service,
        trusted_proxies: Arc::new(config.trusted_proxies.clone()),
    })
}

fn build_config_source(config: &ApiConfig, http_client: reqwest::Client) -> Arc<dyn ConfigSource> {
    match &config.config_location {
        ConfigLocation::File(path) => Arc::new(FileConfigSource::new(path.clone())),
        ConfigLocation::Http { url, bearer_token } => Arc::new(HttpConfigSource::new(
            http_client,
            url.clone(),
            bearer_token.clone(),
        )),
    }
}

fn build_chat_notifier(
    config: &ApiConfig,
    http_client: reqwest::Client,
    config_service: ConfigService,
) -> Arc<dyn ChatNotifier> {
    match config.chat_provider {
        ChatProviderConfig::Console => Arc::new(ConsoleChatNotifier::new()),
        ChatProviderConfig::Slack => Arc::new(SlackChatNotifier::new(
            http_client,
            config.slack_api_base_url.clone(),
            config_service,
        )),
    }
}

fn build_redis_client(redis_url: &str) -> Result<redis::Client, AppError> {
    redis::Client::open(redis_url)
        .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))
}
