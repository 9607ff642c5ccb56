use serde::{Deserialize, Serialize};

/// Chat user that issued an access command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    user_id: String,
    user_name: String,
}

impl Requester {
    /// Creates a requester from chat platform identity fields.
    #[must_use]
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
        }
    }

    /// Returns the chat platform user id, also used as the private channel.
    #[must_use]
    pub fn user_id(&self) -> &str {
        self.user_id.as_str()
    }

    /// Returns the display name sent with the command.
    #[must_use]
    pub fn user_name(&self) -> &str {
        self.user_name.as_str()
    }
}
