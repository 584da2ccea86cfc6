use clap::Parser;
use listing_watcher::{
    handle_line, Args, Fetcher, JsonFileStore, ListingCardExtractor, LogNotifier, Notifier,
    PollController, SourceRegistry, TelegramNotifier,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Args::parse().into_config()?;
    info!("Starting listing watcher (registry: {})", config.registry_path.display());

    let registry = Arc::new(SourceRegistry::load(JsonFileStore::new(&config.registry_path)).await?);
    let fetcher = Arc::new(Fetcher::new(config.fetch.clone())?);
    let extractor = Arc::new(ListingCardExtractor::new(&config.base_url)?);

    let notifier: Arc<dyn Notifier> = match &config.telegram {
        Some(telegram) => Arc::new(
            TelegramNotifier::new(&telegram.token, &telegram.chat_id)?
                .with_api_base(&telegram.api_base),
        ),
        None => {
            warn!("BOT_TOKEN not set, digests will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let controller = PollController::new(registry, fetcher, extractor, notifier, config.controller.clone())?;

    if config.once {
        let report = controller.run_round().await;
        info!("Single round done: {}", report);
        return Ok(());
    }

    if config.autostart {
        controller.start().await;
    }

    // Operator commands arrive one per line on stdin.
    let mut console = Some(BufReader::new(tokio::io::stdin()).lines());
    loop {
        let Some(lines) = console.as_mut() else {
            tokio::signal::ctrl_c().await?;
            break;
        };

        let closed = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        println!("{}", handle_line(&controller, line).await);
                    }
                    false
                }
                None => true,
            },
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        };

        if closed {
            debug!("stdin closed, waiting for Ctrl-C");
            console = None;
        }
    }

    info!("Shutting down");
    controller.stop().await;
    controller.wait_stopped().await;
    Ok(())
}
