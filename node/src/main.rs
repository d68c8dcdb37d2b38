//! ExpertMesh Node CLI
//!
//! Command-line interface for running an expertise registry node.

use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use expertmesh_node::selector::{DEFAULT_THRESHOLD, DEFAULT_TOP_K};
use expertmesh_node::{
    store, telemetry, CachedEmbeddingProvider, EmbeddingProvider, ExpertiseQuery,
    ExpertiseRegistry, ExpiryScheduler, FastEmbedProvider, NodeConfig, Result, StorageBackend,
};

#[derive(Parser)]
#[command(name = "expertmesh")]
#[command(author, version, about = "ExpertMesh expertise registry node", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new node configuration
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.toml")]
        output: String,
    },

    /// Start the registry node
    Start {
        /// Override the retention window in seconds
        #[arg(long)]
        retention_secs: Option<u64>,
    },

    /// Embed expertise texts and store them as a node's announcement
    Announce {
        /// Announcing node
        #[arg(long)]
        node_id: String,

        /// Topic as `key=expertise text`; repeat for several topics
        #[arg(long = "topic", required = true, value_parser = parse_topic)]
        topics: Vec<(String, String)>,
    },

    /// Find the nodes whose expertise best matches a question
    Query {
        /// Natural-language question
        #[arg(long)]
        question: String,

        /// Number of best matches to report
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// Minimum score for the threshold listing
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f32,
    },
}

fn parse_topic(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, text)) if !key.trim().is_empty() && !text.trim().is_empty() => {
            Ok((key.trim().to_string(), text.trim().to_string()))
        }
        _ => Err(format!("expected key=text, got '{}'", raw)),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn load_config(path: &str) -> Result<NodeConfig> {
    if Path::new(path).exists() {
        info!("Loading configuration from: {}", path);
        NodeConfig::load(path)
    } else {
        info!("Using default configuration");
        Ok(NodeConfig::default())
    }
}

/// Open the configured store and load its rows into a fresh registry.
async fn open_registry(config: &NodeConfig) -> Result<Arc<ExpertiseRegistry>> {
    let store = store::open(&config.storage)?;
    info!("Storage backend: {:?}", config.storage.backend);
    let registry = Arc::new(ExpertiseRegistry::new(&config.registry).with_store(store));
    let entries = registry.hydrate().await?;
    info!("Registry ready with {} stored entries", entries);

    let mut failures = registry.subscribe_failures();
    tokio::spawn(async move {
        while let Ok(failure) = failures.recv().await {
            warn!(
                "Store {} failed for node {}: {}",
                failure.operation, failure.node_id, failure.message
            );
        }
    });
    Ok(registry)
}

fn embedding_provider(config: &NodeConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    info!("Initializing embedding model {}...", config.embedding.model);
    let provider: Arc<dyn EmbeddingProvider> =
        Arc::new(FastEmbedProvider::new(&config.embedding.model)?);
    info!("Embedding model initialized successfully");
    if config.embedding.cache_capacity == 0 {
        return Ok(provider);
    }
    Ok(Arc::new(CachedEmbeddingProvider::new(
        provider,
        config.embedding.cache_capacity,
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);
    telemetry::describe_metrics();

    match cli.command {
        Commands::Init { output } => {
            info!("Initializing new node configuration at: {}", output);
            let config = NodeConfig::default();
            config.save(&output)?;
            info!("Configuration saved successfully");
        }

        Commands::Start { retention_secs } => {
            info!("Starting ExpertMesh node...");

            // 1. Load configuration (or use defaults with CLI overrides)
            let mut config = load_config(&cli.config)?;
            if let Some(secs) = retention_secs {
                config.registry.retention_secs = secs;
            }
            config.validate()?;

            // 2. Open the store and hydrate the registry from it
            let registry = open_registry(&config).await?;

            // 3. Start expiry sweeps
            let scheduler =
                ExpiryScheduler::new(registry.clone(), config.registry.sweep_interval()).spawn();
            info!(
                "Expiring entries older than {}s every {}s",
                config.registry.retention_secs, config.registry.sweep_interval_secs
            );

            info!("ExpertMesh node started successfully");
            info!("Press Ctrl+C to stop");

            // 4. Wait for shutdown
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Received shutdown signal");
            scheduler.shutdown().await;
            registry.flush().await;
            info!(
                "Node stopped with {} entries from {} nodes",
                registry.len().await,
                registry.node_count().await
            );
        }

        Commands::Announce { node_id, topics } => {
            let config = load_config(&cli.config)?;
            if config.storage.backend == StorageBackend::Memory {
                warn!("Memory storage backend: the announcement is lost when this command exits");
            }

            let registry = open_registry(&config).await?;
            let query = ExpertiseQuery::new(registry.clone(), embedding_provider(&config)?);
            let written = query
                .announce(&node_id, &topics, &config.embedding.model)
                .await?;
            registry.flush().await;
            info!("Announced {} topics for node {}", written, node_id);
        }

        Commands::Query {
            question,
            top_k,
            threshold,
        } => {
            let config = load_config(&cli.config)?;
            let registry = open_registry(&config).await?;
            if registry.snapshot().await.is_empty() {
                warn!("No live announcements in the registry");
            }
            let query = ExpertiseQuery::new(registry, embedding_provider(&config)?);
            let model = &config.embedding.model;

            match query.find_best_match(&question, model, Some(top_k)).await {
                Ok(matches) if matches.is_empty() => info!("No matching node found"),
                Ok(matches) => {
                    for m in &matches {
                        info!(
                            "Best match: {} ({}) score {:.4}: {}",
                            m.node_id, m.key, m.score, m.expertise
                        );
                    }
                }
                Err(e) if e.is_no_match() => {
                    info!("No matching node found: {}", e);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }

            let above = query
                .find_above_threshold(&question, model, threshold)
                .await?;
            info!("{} nodes scored at least {}", above.len(), threshold);
            for m in &above {
                info!("  {} ({}) score {:.4}", m.node_id, m.key, m.score);
            }
        }
    }

    Ok(())
}
