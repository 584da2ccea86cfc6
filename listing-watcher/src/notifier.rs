use crate::types::{Notifier, Result};
use anyhow::bail;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Sends digests to a Telegram chat through the Bot API.
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    token: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: TELEGRAM_API_BASE.to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) -> anyhow::Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.token
        );

        let response = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text: message,
                parse_mode: "Markdown",
            })
            .send()
            .await?;

        let status = response.status();
        match response.json::<ApiResponse>().await.ok() {
            Some(ApiResponse { ok: true, .. }) if status.is_success() => {
                debug!("Delivered message to chat {}", self.chat_id);
                Ok(())
            }
            Some(ApiResponse { description, .. }) => bail!(
                "Telegram rejected message (HTTP {}): {}",
                status.as_u16(),
                description.unwrap_or_else(|| "no description".to_string())
            ),
            None => bail!("Telegram returned HTTP {} with an unreadable body", status.as_u16()),
        }
    }
}

/// Writes digests to the log instead of delivering them anywhere.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) -> anyhow::Result<()> {
        info!("{}", message);
        Ok(())
    }
}
