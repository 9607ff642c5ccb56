use async_trait::async_trait;
use ephemera_core::AppResult;
use secrecy::SecretString;

/// One-time file attachment carrying credential material.
#[derive(Debug)]
pub struct CredentialAttachment {
    /// Private channel the attachment is delivered to.
    pub channel: String,
    /// File name shown to the recipient.
    pub filename: String,
    /// Attachment title.
    pub title: String,
    /// File content. Never logged.
    pub content: SecretString,
    /// Message posted alongside the attachment.
    pub initial_comment: String,
}

/// Outbound chat transport port.
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    /// Posts a plain text message to a channel or user.
    async fn post_message(&self, channel: &str, text: &str) -> AppResult<()>;

    /// Uploads a one-time credential attachment.
    async fn upload_attachment(&self, attachment: CredentialAttachment) -> AppResult<()>;
}
