//! Console chat notifier for development. Logs messages to tracing output.

use async_trait::async_trait;
use ephemera_application::{ChatNotifier, CredentialAttachment};
use ephemera_core::AppResult;
use secrecy::ExposeSecret;
use tracing::info;

/// Development chat notifier that logs messages to the console.
///
/// Attachment content is never written; only its name and size are logged.
#[derive(Clone)]
pub struct ConsoleChatNotifier;

impl ConsoleChatNotifier {
    /// Creates a new console chat notifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleChatNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatNotifier for ConsoleChatNotifier {
    async fn post_message(&self, channel: &str, text: &str) -> AppResult<()> {
        info!(
            channel = channel,
            "--- CHAT MESSAGE (console) ---\n{}\n--- END MESSAGE ---",
            text
        );

        Ok(())
    }

    async fn upload_attachment(&self, attachment: CredentialAttachment) -> AppResult<()> {
        info!(
            channel = %attachment.channel,
            filename = %attachment.filename,
            content_bytes = attachment.content.expose_secret().len(),
            "--- CHAT ATTACHMENT (console) ---\n{}\n--- END ATTACHMENT ---",
            attachment.initial_comment
        );

        Ok(())
    }
}
