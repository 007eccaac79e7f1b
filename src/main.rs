mod bot;
mod commands;
mod config;
mod llm;
mod platform;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::Config;
use crate::llm::CompletionClient;
use crate::platform::telegram::{self, TelegramSink};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relaybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Optional config file; credentials usually come from the environment
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    if let Some(path) = &config_path {
        info!("Loading configuration from: {}", path.display());
    }
    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;

    info!("Configuration loaded successfully");
    info!("  Provider: {}", config.llm.provider);
    info!("  Model: {}", config.llm.effective_model());
    info!("  Endpoint: {}", config.llm.effective_base_url());
    info!("  Timeout: {}s", config.llm.timeout_secs);
    info!("  Webhook secret: {}", config.telegram.webhook_secret.is_some());

    let completion = CompletionClient::from_config(&config.llm)?;
    info!("Completion provider ready: {}", completion.provider_name());
    let bot = telegram::build_bot(&config)?;
    telegram::register_webhook(&bot, &config).await;

    let sink = Arc::new(TelegramSink::new(bot));
    let state = Arc::new(AppState::new(config, completion, sink));

    info!("Bot is starting...");
    server::serve(state).await
}
