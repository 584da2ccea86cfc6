use crate::controller::ControllerConfig;
use crate::extractor::DEFAULT_BASE_URL;
use crate::notifier::TELEGRAM_API_BASE;
use crate::types::{FetchConfig, Result, WatcherError};
use clap::Parser;
use std::path::PathBuf;
use url::Url;

#[derive(Debug, Parser)]
#[command(name = "listing-watcher", version, about = "Polls listing pages and reports newly posted offers")]
pub struct Args {
    /// JSON file holding every source and the ids already reported for it
    #[arg(long, env = "REGISTRY_PATH", default_value = "data/links.json")]
    pub registry: PathBuf,

    /// Pause between polling rounds
    #[arg(long, env = "PARSING_INTERVAL", default_value_t = 500)]
    pub interval_ms: u64,

    /// Pause before each digest is delivered
    #[arg(long, env = "NOTIFY_DELAY_MS", default_value_t = 2000)]
    pub notify_delay_ms: u64,

    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    pub bot_token: Option<String>,

    #[arg(long, env = "CHAT_ID")]
    pub chat_id: Option<String>,

    #[arg(long, env = "TELEGRAM_API_BASE", default_value = TELEGRAM_API_BASE)]
    pub telegram_api: String,

    /// Prefix for relative offer links
    #[arg(long, env = "BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(long, default_value_t = 30)]
    pub timeout_seconds: u64,

    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Start polling immediately instead of waiting for /start_parsing
    #[arg(long)]
    pub autostart: bool,

    /// Run a single round and exit
    #[arg(long, conflicts_with = "autostart")]
    pub once: bool,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub registry_path: PathBuf,
    pub controller: ControllerConfig,
    pub fetch: FetchConfig,
    pub base_url: String,
    pub telegram: Option<TelegramConfig>,
    pub autostart: bool,
    pub once: bool,
}

impl Args {
    pub fn into_config(self) -> Result<WatcherConfig> {
        if self.interval_ms == 0 {
            return Err(WatcherError::Config(
                "--interval-ms must be a positive number of milliseconds".to_string(),
            ));
        }

        Url::parse(&self.base_url)
            .map_err(|e| WatcherError::Config(format!("Invalid --base-url {}: {}", self.base_url, e)))?;

        let telegram = match (self.bot_token, self.chat_id) {
            (Some(token), Some(chat_id)) => Some(TelegramConfig {
                token,
                chat_id,
                api_base: self.telegram_api,
            }),
            (Some(_), None) => {
                return Err(WatcherError::Config(
                    "CHAT_ID is required when BOT_TOKEN is set".to_string(),
                ))
            }
            (None, _) => None,
        };

        Ok(WatcherConfig {
            registry_path: self.registry,
            controller: ControllerConfig {
                interval_ms: self.interval_ms,
                notify_delay_ms: self.notify_delay_ms,
            },
            fetch: FetchConfig {
                timeout_seconds: self.timeout_seconds,
                max_retries: self.max_retries,
                ..FetchConfig::default()
            },
            base_url: self.base_url,
            telegram,
            autostart: self.autostart,
            once: self.once,
        })
    }
}
