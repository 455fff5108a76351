mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use classifier_client::GroqClassifier;
use config_store::{read_rule, ClassificationCache, ConfigStore, Settings, SqliteStore};
use feed_scanner::{
    CycleOutcome, HostDocument, ScanContext, ScanLoop, SnapshotDocument, VisibilityOutcome,
};
use feedguard_core::{AppConfig, CoreError, ErrorExt, TopicRule};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, CredentialCommands, TopicCommands};

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    if let Some(database_url) = cli.database_url {
        config.store.database_url = database_url;
    }
    init_tracing(&config.logging.filter);

    tracing::info!("Starting feedguard");
    let store = Arc::new(SqliteStore::connect(&config.store.database_url).await?);

    let result = match cli.command {
        Commands::Scan { snapshot } => scan(&config, store.clone(), &snapshot).await,
        Commands::ResetCache => reset_cache(store.clone()).await,
        Commands::Topics(command) => topics(Settings::new(store.clone()), command).await,
        Commands::Credential(command) => credential(Settings::new(store.clone()), command).await,
    };

    store.close().await;
    if let Err(e) = &result {
        if let Some(core) = e.downcast_ref::<CoreError>() {
            core.log_error();
            eprintln!("{}", core.user_friendly_message());
        }
    }
    result
}

async fn scan(config: &AppConfig, store: Arc<dyn ConfigStore>, snapshot: &Path) -> Result<()> {
    let document = Arc::new(
        SnapshotDocument::load(snapshot)
            .with_context(|| format!("failed to read snapshot {}", snapshot.display()))?,
    );
    let classifier = Arc::new(GroqClassifier::from_config(&config.classifier)?);
    let scanner = ScanLoop::new(ScanContext::new(
        document.clone(),
        store,
        classifier,
        config.scan.clone(),
    ));

    match scanner.on_scroll().await {
        None => println!("{} is not a targeted host", document.hostname()),
        Some(CycleOutcome::Completed(report)) => {
            let hidden: Vec<_> = report
                .outcomes
                .iter()
                .filter_map(|outcome| match &outcome.visibility {
                    VisibilityOutcome::Hidden(hide) => Some(hide),
                    _ => None,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&hidden)?);
            eprintln!(
                "{} post(s) scanned, {} classified, {} from cache, {} hidden",
                report.outcomes.len(),
                report.classified(),
                report.cached(),
                hidden.len()
            );
        }
        Some(CycleOutcome::NoRules) => println!("No topics configured, nothing to do"),
        Some(CycleOutcome::MissingCredential) => {
            println!("No API key stored, run `feedguard credential set <token>` first")
        }
        Some(other) => println!("Scan did not run: {:?}", other),
    }
    Ok(())
}

async fn reset_cache(store: Arc<dyn ConfigStore>) -> Result<()> {
    let removed = ClassificationCache::new(store).reset().await?;
    println!("Removed {} cached result(s)", removed);
    Ok(())
}

async fn topics(settings: Settings, command: TopicCommands) -> Result<()> {
    match command {
        TopicCommands::List => {
            let entries = settings.topic_entries().await?;
            if entries.is_empty() {
                println!("No topics configured");
            }
            for (index, entry) in entries.iter().enumerate() {
                match read_rule(entry) {
                    Ok(rule) => {
                        println!("{index}: {} > {} ({})", rule.name, rule.threshold, rule.description)
                    }
                    Err(e) => println!("{index}: unreadable entry {entry} ({e})"),
                }
            }
        }
        TopicCommands::Add {
            name,
            description,
            threshold,
        } => {
            let index = settings
                .add_topic(TopicRule::new(name, description, threshold)?)
                .await?;
            println!("Added topic #{index}");
        }
        TopicCommands::Update {
            index,
            name,
            description,
            threshold,
        } => {
            settings
                .update_topic(index, TopicRule::new(name, description, threshold)?)
                .await?;
            println!("Updated topic #{index}");
        }
        TopicCommands::Remove { index } => {
            let removed = settings.remove_topic(index).await?;
            match read_rule(&removed) {
                Ok(rule) => println!("Removed topic {}", rule.name),
                Err(_) => println!("Removed unreadable entry {removed}"),
            }
        }
        TopicCommands::Seed => {
            if settings.seed_defaults().await? {
                println!("Stored the default topics");
            } else {
                println!("Topics already configured, left untouched");
            }
        }
    }
    Ok(())
}

async fn credential(settings: Settings, command: CredentialCommands) -> Result<()> {
    match command {
        CredentialCommands::Set { token } => {
            settings.set_credential(&token).await?;
            println!("API key saved");
        }
        CredentialCommands::Clear => {
            settings.clear_credential().await?;
            println!("API key removed");
        }
    }
    Ok(())
}
