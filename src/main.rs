use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dice::{
    config::{Config, LogFormat, LoggingConfig},
    langbase::LangbaseClient,
    pipeline::{apply_delta, Chunk, KnowledgePipeline, LangbaseExtractor, PropositionPipeline},
    resolver::{EscalatingResolverFactory, LlmCandidateBakeoff},
    revision::PropositionReviser,
    schema::DataDictionary,
    storage::SqliteStore,
};

#[derive(Parser, Debug)]
#[command(name = "dice", version, about = "Entity resolution and proposition revision")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a text file into the store, one chunk per blank-line block
    Ingest {
        /// Text file to ingest
        file: PathBuf,

        /// Context id propositions are stored under
        #[arg(long)]
        context: String,

        /// Schema document (JSON); open world when omitted
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Skip proposition revision
        #[arg(long)]
        no_propositions: bool,

        /// Create or update the Langbase pipes before running
        #[arg(long)]
        ensure_pipes: bool,
    },

    /// Validate a schema document
    SchemaCheck {
        /// Schema document (JSON)
        schema: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::SchemaCheck { schema } => {
            init_logging(&LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            });
            let dictionary = load_schema(Some(&schema))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "valid": true,
                    "open_world": dictionary.is_open_world(),
                    "types": dictionary.type_names(),
                }))?
            );
            Ok(())
        }
        Command::Ingest {
            file,
            context,
            schema,
            no_propositions,
            ensure_pipes,
        } => {
            let config = match Config::from_env() {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Configuration error: {}", e);
                    std::process::exit(1);
                }
            };
            init_logging(&config.logging);
            info!(version = env!("CARGO_PKG_VERSION"), "DICE starting");

            let result = ingest(
                &config,
                &file,
                &context,
                schema.as_deref(),
                no_propositions,
                ensure_pipes,
            )
            .await;
            if let Err(e) = result {
                error!(error = %e, "Ingest failed");
                return Err(e);
            }
            Ok(())
        }
    }
}

async fn ingest(
    config: &Config,
    file: &Path,
    context: &str,
    schema: Option<&Path>,
    no_propositions: bool,
    ensure_pipes: bool,
) -> anyhow::Result<()> {
    let schema = load_schema(schema)?;
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let chunks = split_chunks(&text, file, context);
    info!(chunks = chunks.len(), file = %file.display(), "Loaded input");

    let langbase = Arc::new(LangbaseClient::new(&config.langbase, config.request.clone())?);
    if ensure_pipes {
        langbase.ensure_pipes(&config.pipes).await?;
    }

    let store = Arc::new(SqliteStore::new(&config.database).await?.with_embedder(langbase.clone()));
    info!(path = %config.database.path.display(), "Database initialized");

    let extractor = Arc::new(LangbaseExtractor::from_config(langbase.clone(), config));
    let resolvers = EscalatingResolverFactory::new(config.resolution.clone())
        .with_arbiter(Arc::new(LlmCandidateBakeoff::from_config(
            langbase.clone(),
            &config.pipes,
            &config.resolution,
        )))
        .with_agentic(langbase.clone(), config.pipes.agentic_search.clone());

    let pipeline = KnowledgePipeline::new(
        extractor.clone(),
        Arc::new(resolvers),
        store.clone(),
        schema.clone(),
    )
    .with_embedder(langbase.clone());
    let ingested = pipeline.ingest(&chunks).await?;
    let applied = apply_delta(store.as_ref(), &ingested.delta).await?;

    let revisions = if no_propositions {
        None
    } else {
        let reviser = PropositionReviser::new(store.clone(), config.revision.clone())
            .with_llm(langbase.clone(), config.pipes.classification.clone());
        let propositions = PropositionPipeline::new(extractor, reviser, schema);
        Some(propositions.revise(ingested.propositions, &ingested.delta).await?)
    };

    let report = json!({
        "chunks": chunks.len(),
        "failed_chunks": ingested.failed_chunks,
        "delta": ingested.delta.summary(),
        "applied": applied,
        "propositions": revisions.as_ref().map(|r| r.counts()),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn load_schema(path: Option<&Path>) -> anyhow::Result<DataDictionary> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read schema {}", path.display()))?;
            Ok(DataDictionary::from_json(&json)?)
        }
        None => Ok(DataDictionary::open_world()),
    }
}

/// One chunk per block of text separated by blank lines.
fn split_chunks(text: &str, file: &Path, context: &str) -> Vec<Chunk> {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "chunk".to_string());

    let mut blocks: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }

    blocks
        .into_iter()
        .enumerate()
        .map(|(i, block)| Chunk::new(format!("{}-{}", stem, i + 1), context, block))
        .collect()
}

/// Initialize tracing/logging on stderr; stdout carries the report.
fn init_logging(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
