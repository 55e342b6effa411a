use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use lunch_vote::core::documents::encode;
use lunch_vote::domain::model::collections;
use lunch_vote::domain::ports::DocumentStore;
use lunch_vote::utils::{logger, validation::Validate};
use lunch_vote::{
    spawn_ticker, CliConfig, EngineConfig, EngineSettings, InMemoryStore, LunchEngine, SystemClock,
};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let store = InMemoryStore::new();
    for user in &config.users {
        store
            .put(collections::USERS, &user.id, encode(user)?)
            .await?;
    }
    for item in &config.items {
        store
            .put(collections::ITEMS, &item.id, encode(item)?)
            .await?;
    }
    tracing::info!(
        "Seeded {} users and {} items",
        config.users.len(),
        config.items.len()
    );

    let settings = EngineSettings::from_config(&config)?;
    let engine = Arc::new(LunchEngine::new(store, SystemClock, settings));
    tracing::info!("Voting window: {:?}", engine.window_status());

    let mut tallies = engine.tally_updates();
    let feed = tokio::spawn(async move {
        while let Some((day, tally)) = tallies.next().await {
            tracing::info!("Votes for {}: {:?}", day, tally);
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticker = spawn_ticker(engine.clone(), config.tick_interval(), shutdown_rx);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    shutdown_tx.send(true)?;
    ticker.await?;
    feed.abort();

    Ok(())
}
