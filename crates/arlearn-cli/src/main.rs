//! ARLearn CLI - ask questions about labeled 3D models

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use arlearn_core::config::Config;
use arlearn_core::graph::{GraphFactFetcher, GraphLookup, GraphSeed, SqliteGraphStore};
use arlearn_core::llm::{Embedder, HashEmbedder, LlmClient, TextGenerator};
use arlearn_core::pipeline::{AnswerRequest, HybridAnswerer};
use arlearn_core::retrieval::{
    COLLECTION_KEY, ChunkOptions, Metadata, SCENE_KEY, SourceDocument, SqliteVectorStore,
    embed_document,
};
use arlearn_core::storage::Database;

#[cfg(test)]
mod main_tests;

/// Metadata key naming the file a passage was ingested from
const DOCUMENT_KEY: &str = "document";

#[derive(Parser)]
#[command(name = "arlearn")]
#[command(author, version, about = "Ask questions about labeled 3D models", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args, Debug, Clone, Default)]
struct QueryArgs {
    /// Collection (model id) to scope retrieval to
    #[arg(short, long)]
    collection: Option<String>,
    /// Name of the selected entity, if any
    #[arg(short, long)]
    entity: Option<String>,
    /// Scene the question was asked in
    #[arg(short, long)]
    scene: Option<String>,
    /// Embed locally instead of calling the embeddings API
    #[arg(long)]
    offline: bool,
}

impl QueryArgs {
    fn request(&self, question: &str) -> AnswerRequest {
        AnswerRequest {
            question: question.to_string(),
            collection_scope: self.collection.clone(),
            entity_hint: self.entity.clone(),
            scene_hint: self.scene.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question from passages and graph facts
    Ask {
        question: String,
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Infer which entity a question is about
    Locate {
        question: String,
        #[arg(short, long)]
        collection: Option<String>,
    },

    /// Resolve a noisy name to a canonical entity
    Resolve {
        name: String,
        #[arg(short, long)]
        collection: Option<String>,
    },

    /// Show the assembled context for a question without generating
    Context {
        question: String,
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Load a graph seed file (JSON)
    Seed { file: PathBuf },

    /// Split a text or PDF file into passages, embed and store them
    Ingest {
        file: PathBuf,
        /// Collection the passages belong to
        #[arg(short, long)]
        collection: String,
        #[arg(short, long)]
        scene: Option<String>,
        /// Document title (defaults to the PDF title or the file name)
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        subject: Option<String>,
        /// Embed locally instead of calling the embeddings API
        #[arg(long)]
        offline: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
    /// Reset config to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("arlearn=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ask { question, query } => cmd_ask(&question, &query, cli.format).await,

        Commands::Locate {
            question,
            collection,
        } => cmd_locate(&question, collection.as_deref(), cli.format).await,

        Commands::Resolve { name, collection } => {
            cmd_resolve(&name, collection.as_deref(), cli.format, cli.quiet).await
        }

        Commands::Context { question, query } => {
            cmd_context(&question, &query, cli.format).await
        }

        Commands::Seed { file } => cmd_seed(&file, cli.format, cli.quiet).await,

        Commands::Ingest {
            file,
            collection,
            scene,
            title,
            subject,
            offline,
        } => {
            let labels = DocumentLabels {
                scene,
                title,
                subject,
            };
            cmd_ingest(
                &file,
                &collection,
                labels,
                offline,
                cli.format,
                cli.quiet,
            )
            .await
        }

        Commands::Config { action } => cmd_config(action, cli.quiet),

        Commands::Doctor => cmd_doctor(cli.quiet).await,
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// Generator used when no API key is configured; retrieval still works
struct UnconfiguredGenerator;

#[async_trait]
impl TextGenerator for UnconfiguredGenerator {
    async fn generate(&self, _prompt: &str) -> arlearn_core::Result<String> {
        Err(arlearn_core::Error::GenerationFailed(
            "no API key configured (use `arlearn context` to inspect retrieved context)"
                .to_string(),
        ))
    }
}

async fn open_database(config: &Config) -> anyhow::Result<Database> {
    let path = config.storage.resolved_database_path();
    Database::open(&path)
        .await
        .with_context(|| format!("Failed to open database at {}", path.display()))
}

fn llm_client(config: &Config) -> anyhow::Result<LlmClient> {
    let client = LlmClient::builder()
        .config(config.llm.clone())
        .embedding_dimensions(config.retrieval.embedding_dimensions)
        .build()?;
    Ok(client)
}

fn embedder(config: &Config, offline: bool) -> anyhow::Result<Arc<dyn Embedder>> {
    if offline {
        return Ok(Arc::new(HashEmbedder::new(
            config.retrieval.embedding_dimensions,
        )));
    }
    let client = llm_client(config)
        .context("Embedding requires an API key; pass --offline to embed locally")?;
    Ok(Arc::new(client))
}

fn generator(config: &Config) -> Arc<dyn TextGenerator> {
    match llm_client(config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!(error = %e, "Answer generation unavailable");
            Arc::new(UnconfiguredGenerator)
        }
    }
}

fn answerer(config: &Config, db: &Database, offline: bool) -> anyhow::Result<HybridAnswerer> {
    let answerer = HybridAnswerer::builder()
        .embedder(embedder(config, offline)?)
        .vector_store(Arc::new(SqliteVectorStore::new(db.pool().clone())))
        .graph_store(Arc::new(SqliteGraphStore::new(db.pool().clone())))
        .generator(generator(config))
        .retrieval(config.retrieval.clone())
        .build()?;
    Ok(answerer)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_ask(question: &str, query: &QueryArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = Config::load()?;
    let db = open_database(&config).await?;
    let answerer = answerer(&config, &db, query.offline)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let request = query.request(question);
    let answer = answerer.answer_with_cancellation(&request, cancel).await?;

    match format {
        OutputFormat::Text => println!("{}", answer),
        OutputFormat::Json => print_json(&serde_json::json!({
            "question": question,
            "answer": answer,
        }))?,
    }

    db.close().await;
    Ok(())
}

async fn cmd_locate(
    question: &str,
    collection: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let config = Config::load()?;
    let db = open_database(&config).await?;
    let facts = GraphFactFetcher::new(Arc::new(SqliteGraphStore::new(db.pool().clone())));

    let lookup = facts.infer_entity(question, collection).await;
    match format {
        OutputFormat::Json => print_json(&lookup)?,
        OutputFormat::Text => match &lookup {
            GraphLookup::Found(name) => println!("{}", name),
            GraphLookup::NotFound => println!("No entity matches this question."),
            GraphLookup::Unavailable(reason) => println!("Graph unavailable: {}", reason),
        },
    }

    db.close().await;
    Ok(())
}

async fn cmd_resolve(
    name: &str,
    collection: Option<&str>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let config = Config::load()?;
    let db = open_database(&config).await?;
    let facts = GraphFactFetcher::new(Arc::new(SqliteGraphStore::new(db.pool().clone())));

    let resolved = facts.resolver().resolve_entity(name, collection).await?;
    match (format, resolved) {
        (OutputFormat::Json, Some((entity, tier))) => print_json(&serde_json::json!({
            "entity": entity,
            "tier": tier,
        }))?,
        (OutputFormat::Json, None) => print_json(&serde_json::json!({ "entity": null }))?,
        (OutputFormat::Text, Some((entity, tier))) => {
            println!("{}", entity.name);
            if !quiet {
                println!("  Match: {:?}", tier);
                if let Some(external_id) = &entity.external_id {
                    println!("  External ID: {}", external_id);
                }
                if let Some(collection_id) = &entity.collection_id {
                    println!("  Collection: {}", collection_id);
                }
            }
        }
        (OutputFormat::Text, None) => println!("No entity matches '{}'.", name),
    }

    db.close().await;
    Ok(())
}

async fn cmd_context(
    question: &str,
    query: &QueryArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let config = Config::load()?;
    let db = open_database(&config).await?;
    let answerer = answerer(&config, &db, query.offline)?;

    let retrieved = answerer.retrieve(&query.request(question)).await?;
    match format {
        OutputFormat::Json => print_json(&retrieved)?,
        OutputFormat::Text => {
            if retrieved.context.is_empty() {
                println!("No context retrieved.");
            } else {
                println!("{}", retrieved.context.render());
            }
        }
    }

    db.close().await;
    Ok(())
}

async fn cmd_seed(file: &Path, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let seed = GraphSeed::from_file(file)
        .with_context(|| format!("Failed to load seed file {}", file.display()))?;

    let config = Config::load()?;
    let db = open_database(&config).await?;
    let report = SqliteGraphStore::new(db.pool().clone())
        .apply_seed(&seed)
        .await?;
    info!(file = %file.display(), entities = report.entities, "Graph seeded");

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text if !quiet => {
            println!("Seeded graph from {}", file.display());
            println!("  Collections: {}", report.collections);
            println!("  Entities:    {}", report.entities);
            println!("  Labels:      {}", report.labels);
            println!("  Relations:   {}", report.relations);
            if report.skipped_links > 0 {
                println!("  Skipped links to unknown entities: {}", report.skipped_links);
            }
        }
        OutputFormat::Text => {}
    }

    db.close().await;
    Ok(())
}

/// Optional labels attached to every ingested passage
struct DocumentLabels {
    scene: Option<String>,
    title: Option<String>,
    subject: Option<String>,
}

async fn cmd_ingest(
    file: &Path,
    collection: &str,
    labels: DocumentLabels,
    offline: bool,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let path = file.to_path_buf();
    let mut document = tokio::task::spawn_blocking(move || SourceDocument::load(&path))
        .await?
        .with_context(|| format!("Failed to read {}", file.display()))?;
    if let Some(title) = labels.title {
        document = document.with_title(title);
    }
    if let Some(subject) = labels.subject {
        document = document.with_subject(subject);
    }

    let config = Config::load()?;
    let embedder = embedder(&config, offline)?;
    let db = open_database(&config).await?;
    let store = SqliteVectorStore::new(db.pool().clone());

    let mut metadata = Metadata::new();
    metadata.insert(COLLECTION_KEY.to_string(), collection.to_string());
    if let Some(scene) = labels.scene {
        metadata.insert(SCENE_KEY.to_string(), scene);
    }
    if let Some(name) = file.file_name() {
        metadata.insert(DOCUMENT_KEY.to_string(), name.to_string_lossy().into_owned());
    }

    let records =
        embed_document(embedder.as_ref(), &document, &ChunkOptions::default(), &metadata).await?;
    for record in &records {
        store.upsert(record).await?;
    }
    info!(file = %file.display(), passages = records.len(), "Passages ingested");

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "file": file.display().to_string(),
            "collection": collection,
            "title": document.title,
            "pages": document.pages.len(),
            "passages": records.len(),
        }))?,
        OutputFormat::Text if !quiet => {
            println!(
                "Ingested {} passages from {} into '{}'",
                records.len(),
                file.display(),
                collection
            );
        }
        OutputFormat::Text => {}
    }

    db.close().await;
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("ARLearn Health Check");
        println!("====================");
        println!();
    }

    let mut all_ok = true;

    let config = match Config::load() {
        Ok(config) => {
            if let Err(e) = config.validate() {
                all_ok = false;
                if !quiet {
                    println!("[!!] Configuration: {}", e);
                }
            } else if !quiet {
                println!("[OK] Configuration: Valid");
            }
            config
        }
        Err(e) => {
            if !quiet {
                println!("[!!] Configuration: {}", e);
            }
            anyhow::bail!("Health check failed");
        }
    };

    match config.llm.redacted_api_key() {
        Ok(Some(redacted)) => {
            if !quiet {
                println!("[OK] API Key: Configured ({})", redacted);
            }
        }
        Ok(None) => {
            warn!("API Key: Not configured");
            if !quiet {
                println!("[--] API Key: Not configured (only --offline retrieval is available)");
                println!("     Set ARLEARN_API_KEY or OPENAI_API_KEY environment variable");
            }
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] API Key: Error - {}", e);
            }
        }
    }

    match open_database(&config).await {
        Ok(db) => {
            let status = db.migration_status().await?;
            let entities = SqliteGraphStore::new(db.pool().clone())
                .count_entities()
                .await?;
            let passages = SqliteVectorStore::new(db.pool().clone()).count().await?;
            if !quiet {
                println!(
                    "[OK] Database: {} (schema v{})",
                    db.path().display(),
                    status.current_version
                );
                println!("     Entities: {}, Passages: {}", entities, passages);
            }
            db.close().await;
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Database: {:#}", e);
            }
        }
    }

    if !quiet {
        println!();
    }
    if all_ok {
        if !quiet {
            println!("All checks passed.");
        }
        Ok(())
    } else {
        anyhow::bail!("Health check failed")
    }
}
