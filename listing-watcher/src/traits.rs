use crate::types::Result;
use async_trait::async_trait;

/// Retrieves the raw content behind a source endpoint.
///
/// Implementations apply their own timeout and report non-success
/// responses as [`WatcherError::Fetch`](crate::types::WatcherError::Fetch).
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self, endpoint: &str) -> Result<String>;
}
