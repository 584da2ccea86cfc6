use crate::traits::ContentSource;
use crate::types::{FetchConfig, Result, WatcherError};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

/// Why a single attempt failed, and whether another attempt could help.
struct AttemptFailure {
    cause: String,
    retryable: bool,
}

impl AttemptFailure {
    fn transient(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
            retryable: true,
        }
    }

    fn fatal(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
            retryable: false,
        }
    }
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    pub async fn fetch_page(&self, endpoint: &str) -> Result<String> {
        let start_time = Instant::now();
        debug!("Fetching {}", endpoint);

        let retry_delay = Duration::from_millis(self.config.retry_delay_ms);
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: retry_delay,
            initial_interval: retry_delay,
            max_interval: retry_delay * 32,
            multiplier: 2.0,
            max_elapsed_time: Some(retry_delay * 60),
            ..Default::default()
        };

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.fetch_once(endpoint).await {
                Ok(content) => {
                    info!(
                        "Fetched {} ({} bytes in {} ms)",
                        endpoint,
                        content.len(),
                        start_time.elapsed().as_millis()
                    );
                    return Ok(content);
                }
                Err(failure) => {
                    let retryable = failure.retryable;
                    last_error = Some(failure.cause);

                    if retryable && attempt < self.config.max_retries {
                        if let Some(delay) = backoff.next_backoff() {
                            warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, endpoint, delay);
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                    }
                    break;
                }
            }
        }

        let cause = last_error.unwrap_or_else(|| "Unknown error".to_string());
        error!("Failed to fetch {}: {}", endpoint, cause);

        Err(WatcherError::Fetch {
            endpoint: endpoint.to_string(),
            cause,
        })
    }

    async fn fetch_once(&self, endpoint: &str) -> std::result::Result<String, AttemptFailure> {
        let mut response = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(|e| AttemptFailure::transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let cause = format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            );
            return Err(if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                AttemptFailure::transient(cause)
            } else {
                AttemptFailure::fatal(cause)
            });
        }

        let max_bytes = self.config.max_body_mb * 1024 * 1024;
        if let Some(content_length) = response.content_length() {
            if content_length as usize > max_bytes {
                return Err(too_large(content_length as usize));
            }
        }

        // Decompressed and chunked bodies carry no usable length.
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AttemptFailure::transient(e.to_string()))?
        {
            body.extend_from_slice(&chunk);
            if body.len() > max_bytes {
                return Err(too_large(body.len()));
            }
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

fn too_large(bytes: usize) -> AttemptFailure {
    AttemptFailure::fatal(format!("Page too large: {}MB", bytes / (1024 * 1024)))
}

#[async_trait]
impl ContentSource for Fetcher {
    async fn fetch(&self, endpoint: &str) -> Result<String> {
        self.fetch_page(endpoint).await
    }
}
