use std::path::PathBuf;

use tracing::{error, info, warn};
use uuid::Uuid;

use quest_engine::config::EngineConfig;
use quest_engine::error::QuestError;
use quest_engine::quest::{PlayerProfile, QuestEngine};

const CONFIG_ENV: &str = "QUEST_ENGINE_CONFIG";

#[tokio::main]
async fn main() {
    let config_path = std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("engine.toml"));

    let config = match EngineConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.filter)),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(templates_path) = args.next() else {
        error!("Usage: quest-engine <templates.toml> [quest id]");
        std::process::exit(2);
    };

    if let Err(e) = run(config, PathBuf::from(templates_path), args.next()).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

/// Load templates and walk one demo player through each quest
async fn run(config: EngineConfig, templates_path: PathBuf, only: Option<String>) -> Result<(), QuestError> {
    let engine = QuestEngine::builder().config(config).build();

    let mut notifications = engine.events().subscribe();
    tokio::spawn(async move {
        while let Ok(notification) = notifications.recv().await {
            info!(
                "Notification: {:?} {} for {}",
                notification.kind, notification.quest_id, notification.player
            );
        }
    });

    let source = std::fs::read_to_string(&templates_path)
        .map_err(|e| QuestError::Config(format!("Failed to read {:?}: {}", templates_path, e)))?;
    let loaded = engine.load_templates(&source)?;
    info!("Loaded {} quest templates from {:?}", loaded, templates_path);

    let player = PlayerProfile::new(Uuid::new_v4(), "demo");
    let ids = match only {
        Some(id) => vec![id],
        None => engine.template_ids(),
    };

    for id in ids {
        let Some(template) = engine.template(&id) else {
            warn!("Quest {} is not defined", id);
            continue;
        };

        let accepted = template.accept_to(&engine, &player).await;
        info!("Accept {}: {}", id, accepted);
        if !accepted.is_accepted() {
            continue;
        }

        if let Some(quest) = player.quest(&id) {
            let outcome = quest.complete_quest().await?;
            info!("Complete {}: {}", id, outcome);
        }
    }

    Ok(())
}
