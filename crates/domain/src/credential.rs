use secrecy::{ExposeSecret, SecretString};

/// One-time bastion credential produced by a successful apply.
///
/// Held only in memory between apply completion and delivery. `Debug` never
/// prints key material.
#[derive(Debug)]
pub struct Credential {
    endpoint: String,
    private_key: SecretString,
}

impl Credential {
    /// Creates a credential from engine outputs.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, private_key: SecretString) -> Self {
        Self {
            endpoint: endpoint.into(),
            private_key,
        }
    }

    /// Returns the bastion endpoint address.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    /// Returns the PEM-encoded private key for delivery.
    #[must_use]
    pub fn private_key_pem(&self) -> &str {
        self.private_key.expose_secret().as_str()
    }
}
