//! HTTP blob store configuration source.

use async_trait::async_trait;
use ephemera_application::ConfigSource;
use ephemera_core::{AppError, AppResult};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

/// Fetches the configuration document with a GET request.
#[derive(Clone)]
pub struct HttpConfigSource {
    http_client: reqwest::Client,
    url: Url,
    bearer_token: Option<SecretString>,
}

impl HttpConfigSource {
    /// Creates a source for `url`, optionally authenticated with a bearer token.
    #[must_use]
    pub fn new(http_client: reqwest::Client, url: Url, bearer_token: Option<SecretString>) -> Self {
        Self {
            http_client,
            url,
            bearer_token,
        }
    }
}

#[async_trait]
impl ConfigSource for HttpConfigSource {
    async fn fetch(&self) -> AppResult<Vec<u8>> {
        let mut request = self.http_client.get(self.url.clone());
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|error| {
            AppError::Configuration(format!("failed to fetch configuration: {error}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Configuration(format!(
                "configuration fetch from '{}' failed with status {status}",
                self.describe()
            )));
        }

        let body = response.bytes().await.map_err(|error| {
            AppError::Configuration(format!("failed to read configuration body: {error}"))
        })?;

        Ok(body.to_vec())
    }

    fn describe(&self) -> String {
        let mut url = self.url.clone();
        url.set_query(None);
        url.to_string()
    }
}
