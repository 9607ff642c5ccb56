//! Slack Web API chat transport.

use async_trait::async_trait;
use ephemera_application::{ChatNotifier, ConfigService, CredentialAttachment};
use ephemera_core::{AppError, AppResult};
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use url::Url;

/// Default Slack Web API base address.
pub const DEFAULT_SLACK_API_BASE_URL: &str = "https://slack.com/api/";

#[derive(Debug, Deserialize)]
struct SlackEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadTicket {
    upload_url: String,
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct OpenedConversation {
    channel: ConversationChannel,
}

#[derive(Debug, Deserialize)]
struct ConversationChannel {
    id: String,
}

/// Posts messages and one-time file uploads through the Slack Web API.
///
/// The bot token is read from the broker configuration on every call.
#[derive(Clone)]
pub struct SlackChatNotifier {
    http_client: reqwest::Client,
    api_base_url: Url,
    config_service: ConfigService,
}

impl SlackChatNotifier {
    /// Creates a notifier for the given API base address.
    #[must_use]
    pub fn new(http_client: reqwest::Client, api_base_url: Url, config_service: ConfigService) -> Self {
        Self {
            http_client,
            api_base_url,
            config_service,
        }
    }

    async fn bot_token(&self) -> AppResult<SecretString> {
        let config = self.config_service.get().await?;
        Ok(config.bot_token().clone())
    }

    fn endpoint(&self, method: &str) -> AppResult<Url> {
        self.api_base_url.join(method).map_err(|error| {
            AppError::Internal(format!("invalid slack endpoint for '{method}': {error}"))
        })
    }

    async fn call_json(&self, method: &str, body: &Value) -> AppResult<Value> {
        let token = self.bot_token().await?;
        let response = self
            .http_client
            .post(self.endpoint(method)?)
            .bearer_auth(token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|error| AppError::Delivery(format!("slack {method} transport error: {error}")))?;

        read_api_response(method, response).await
    }

    async fn call_form(&self, method: &str, fields: &[(&str, &str)]) -> AppResult<Value> {
        let token = self.bot_token().await?;
        let response = self
            .http_client
            .post(self.endpoint(method)?)
            .bearer_auth(token.expose_secret())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form_body(fields))
            .send()
            .await
            .map_err(|error| AppError::Delivery(format!("slack {method} transport error: {error}")))?;

        read_api_response(method, response).await
    }

    async fn resolve_channel(&self, channel: &str) -> AppResult<String> {
        if !is_user_id(channel) {
            return Ok(channel.to_owned());
        }

        let opened = self
            .call_form("conversations.open", &[("users", channel)])
            .await?;
        let opened = serde_json::from_value::<OpenedConversation>(opened).map_err(|error| {
            AppError::Delivery(format!("unexpected conversations.open response: {error}"))
        })?;

        Ok(opened.channel.id)
    }
}

#[async_trait]
impl ChatNotifier for SlackChatNotifier {
    async fn post_message(&self, channel: &str, text: &str) -> AppResult<()> {
        self.call_json(
            "chat.postMessage",
            &json!({ "channel": channel, "text": text }),
        )
        .await?;

        Ok(())
    }

    async fn upload_attachment(&self, attachment: CredentialAttachment) -> AppResult<()> {
        let content = attachment.content.expose_secret().as_bytes().to_vec();
        let length = content.len().to_string();

        let ticket = self
            .call_form(
                "files.getUploadURLExternal",
                &[
                    ("filename", attachment.filename.as_str()),
                    ("length", length.as_str()),
                ],
            )
            .await?;
        let ticket = serde_json::from_value::<UploadTicket>(ticket).map_err(|error| {
            AppError::Delivery(format!(
                "unexpected files.getUploadURLExternal response: {error}"
            ))
        })?;

        let upload = self
            .http_client
            .post(ticket.upload_url.as_str())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(content)
            .send()
            .await
            .map_err(|error| AppError::Delivery(format!("file upload transport error: {error}")))?;
        if !upload.status().is_success() {
            return Err(AppError::Delivery(format!(
                "file upload failed with status {}",
                upload.status()
            )));
        }

        let channel_id = self.resolve_channel(attachment.channel.as_str()).await?;
        self.call_json(
            "files.completeUploadExternal",
            &json!({
                "files": [{ "id": ticket.file_id, "title": attachment.title }],
                "channel_id": channel_id,
                "initial_comment": attachment.initial_comment,
            }),
        )
        .await?;

        info!(
            channel = %attachment.channel,
            filename = %attachment.filename,
            "credential attachment delivered"
        );

        Ok(())
    }
}

async fn read_api_response(method: &str, response: reqwest::Response) -> AppResult<Value> {
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Delivery(format!(
            "slack {method} failed with status {status}"
        )));
    }

    let body = response.json::<Value>().await.map_err(|error| {
        AppError::Delivery(format!("slack {method} returned invalid json: {error}"))
    })?;

    check_envelope(method, body)
}

fn check_envelope(method: &str, body: Value) -> AppResult<Value> {
    let envelope = serde_json::from_value::<SlackEnvelope>(body.clone()).map_err(|error| {
        AppError::Delivery(format!("slack {method} returned unexpected body: {error}"))
    })?;

    if !envelope.ok {
        return Err(AppError::Delivery(format!(
            "slack {method} failed: {}",
            envelope.error.as_deref().unwrap_or("unknown_error")
        )));
    }

    Ok(body)
}

fn form_body(fields: &[(&str, &str)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in fields {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

fn is_user_id(channel: &str) -> bool {
    channel.starts_with('U') || channel.starts_with('W')
}
