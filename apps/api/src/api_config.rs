use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use ephemera_application::MissingOutputPolicy;
use ephemera_core::AppError;
use ephemera_infrastructure::DEFAULT_SLACK_API_BASE_URL;
use ipnet::IpNet;
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::client_ip::parse_trusted_proxies;

#[derive(Debug, Clone)]
pub enum ConfigLocation {
    File(PathBuf),
    Http {
        url: Url,
        bearer_token: Option<SecretString>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatProviderConfig {
    Slack,
    Console,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_host: String,
    pub api_port: u16,
    pub config_location: ConfigLocation,
    pub template_root: PathBuf,
    pub terraform_bin: PathBuf,
    pub terraform_timeout_seconds: u64,
    pub state_key_prefix: String,
    pub aws_region: String,
    pub destroyer_target_id: String,
    pub redis_url: String,
    pub scheduler_key_prefix: String,
    pub chat_provider: ChatProviderConfig,
    pub slack_api_base_url: Url,
    pub trusted_proxies: Vec<IpNet>,
    pub missing_output_policy: MissingOutputPolicy,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let api_port = env::var("API_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3001);

        let config_location = match (optional_env("CONFIG_PATH"), optional_env("CONFIG_URL")) {
            (Some(path), None) => ConfigLocation::File(PathBuf::from(path)),
            (None, Some(url)) => ConfigLocation::Http {
                url: Url::parse(url.as_str()).map_err(|error| {
                    AppError::Validation(format!("invalid CONFIG_URL: {error}"))
                })?,
                bearer_token: optional_env("CONFIG_BEARER_TOKEN").map(SecretString::new),
            },
            (Some(_), Some(_)) => {
                return Err(AppError::Validation(
                    "set only one of CONFIG_PATH and CONFIG_URL".to_owned(),
                ));
            }
            (None, None) => {
                return Err(AppError::Validation(
                    "CONFIG_PATH or CONFIG_URL is required".to_owned(),
                ));
            }
        };

        let template_root = PathBuf::from(required_non_empty_env("TEMPLATE_ROOT")?);
        let terraform_bin =
            PathBuf::from(env::var("TERRAFORM_BIN").unwrap_or_else(|_| "terraform".to_owned()));
        let terraform_timeout_seconds = match env::var("TERRAFORM_TIMEOUT_SECONDS") {
            Ok(value) => value.parse::<u64>().map_err(|error| {
                AppError::Validation(format!(
                    "invalid TERRAFORM_TIMEOUT_SECONDS value '{value}': {error}"
                ))
            })?,
            Err(_) => 900,
        };
        if terraform_timeout_seconds == 0 {
            return Err(AppError::Validation(
                "TERRAFORM_TIMEOUT_SECONDS must be greater than zero".to_owned(),
            ));
        }

        let state_key_prefix =
            parse_state_key_prefix(env::var("TERRAFORM_STATE_KEY_PREFIX").ok().as_deref())?;
        let aws_region = required_non_empty_env("AWS_REGION")?;
        let destroyer_target_id = optional_env("DESTROYER_TARGET_ID")
            .unwrap_or_else(|| "destroyer-worker".to_owned());
        let redis_url = required_non_empty_env("REDIS_URL")?;
        let scheduler_key_prefix = env::var("SCHEDULER_KEY_PREFIX")
            .unwrap_or_else(|_| "ephemera:teardown".to_owned());

        let chat_provider = match env::var("CHAT_PROVIDER")
            .unwrap_or_else(|_| "slack".to_owned())
            .as_str()
        {
            "slack" => ChatProviderConfig::Slack,
            "console" => ChatProviderConfig::Console,
            other => {
                return Err(AppError::Validation(format!(
                    "CHAT_PROVIDER must be either 'slack' or 'console', got '{other}'"
                )));
            }
        };

        let slack_api_base_url = slack_base_url(
            env::var("SLACK_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_SLACK_API_BASE_URL.to_owned())
                .as_str(),
        )?;

        let trusted_proxies =
            parse_trusted_proxies(env::var("TRUSTED_PROXY_CIDRS").unwrap_or_default().as_str())?;

        let missing_output_policy = MissingOutputPolicy::parse(
            env::var("MISSING_OUTPUT_POLICY")
                .unwrap_or_else(|_| "destroy".to_owned())
                .as_str(),
        )?;

        Ok(Self {
            api_host,
            api_port,
            config_location,
            template_root,
            terraform_bin,
            terraform_timeout_seconds,
            state_key_prefix,
            aws_region,
            destroyer_target_id,
            redis_url,
            scheduler_key_prefix,
            chat_provider,
            slack_api_base_url,
            trusted_proxies,
            missing_output_policy,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

/// Parses the Slack base URL so relative method names join under it.
fn slack_base_url(raw: &str) -> Result<Url, AppError> {
    let normalized = if raw.ends_with('/') {
        raw.to_owned()
    } else {
        format!("{raw}/")
    };

    Url::parse(normalized.as_str())
        .map_err(|error| AppError::Validation(format!("invalid SLACK_API_BASE_URL: {error}")))
}

/// Validates the remote state key prefix shared with the teardown worker.
fn parse_state_key_prefix(raw: Option<&str>) -> Result<String, AppError> {
    let prefix = raw.unwrap_or_default().trim().trim_end_matches('/');
    if prefix.is_empty() {
        return Err(AppError::Validation(
            "TERRAFORM_STATE_KEY_PREFIX is required and must not be empty".to_owned(),
        ));
    }

    Ok(prefix.to_owned())
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn required_env(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn required_non_empty_env(name: &str) -> Result<String, AppError> {
    let value = required_env(name)?;
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{name} must not be empty")));
    }

    Ok(value)
}
