use async_trait::async_trait;
use ephemera_core::AppResult;

/// Blob store port holding the broker configuration document.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Fetches the raw configuration document.
    async fn fetch(&self) -> AppResult<Vec<u8>>;

    /// Returns a human-readable location for logs.
    fn describe(&self) -> String;
}
