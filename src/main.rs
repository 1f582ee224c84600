//! Paperqa CLI
//!
//! Command-line interface over the Q&A pipeline: index a document,
//! ask questions against it, and report index status. Results are
//! printed as JSON on stdout; logs go to stderr.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use paperqa::{ClaudeGenerator, HashEmbedder, QaPipeline, Settings, VectorIndex};

#[derive(Parser)]
#[command(name = "paperqa")]
#[command(about = "Retrieval-augmented Q&A over a single document", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed and index a plain-text document, replacing any
    /// previously indexed content
    Index {
        /// Path to the document (UTF-8 text)
        file: PathBuf,
    },
    /// Ask a question about the indexed document
    Ask {
        /// The question to ask
        question: String,
        /// Number of context chunks to retrieve
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..=50))]
        top_k: Option<u64>,
    },
    /// Show index size and configuration
    Status,
}

// ============ Output Types ============

#[derive(Serialize)]
struct IndexOutput {
    status: String,
    message: String,
    chunks_created: usize,
    documents_indexed: usize,
}

#[derive(Serialize)]
struct StatusOutput {
    documents_indexed: usize,
    embedding_dimension: usize,
    llm_model: String,
    index_dir: String,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
}

// ============ Main ============

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Index { file } => handle_index(file),
        Commands::Ask { question, top_k } => handle_ask(question, top_k.map(|k| k as usize)).await,
        Commands::Status => handle_status(),
    };

    match result {
        Ok(json) => println!("{}", json),
        Err(e) => {
            let error = ErrorOutput {
                error: format!("{:#}", e),
            };
            println!("{}", serde_json::to_string(&error).unwrap_or_default());
            std::process::exit(1);
        }
    }
}

// ============ Handlers ============

fn build_pipeline(settings: Settings) -> anyhow::Result<QaPipeline> {
    let api_key = settings
        .anthropic_api_key
        .clone()
        .context("ANTHROPIC_API_KEY is not set")?;

    let embedder = HashEmbedder::default();
    let index = VectorIndex::open(&settings.index_dir, paperqa::EMBEDDING_DIM)?;
    let generator = ClaudeGenerator::new(api_key)?.with_base_url(&settings.api_base);

    Ok(QaPipeline::new(
        settings,
        Box::new(embedder),
        index,
        Box::new(generator),
    ))
}

fn handle_index(file: PathBuf) -> anyhow::Result<String> {
    let settings = Settings::from_env()?;
    let raw_text = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let mut pipeline = build_pipeline(settings)?;
    let summary = pipeline.index_document(&raw_text)?;

    let output = IndexOutput {
        status: "success".to_string(),
        message: "Document indexed successfully".to_string(),
        chunks_created: summary.chunks_created,
        documents_indexed: summary.documents_indexed,
    };
    Ok(serde_json::to_string(&output)?)
}

async fn handle_ask(question: String, top_k: Option<usize>) -> anyhow::Result<String> {
    let settings = Settings::from_env()?;
    let pipeline = build_pipeline(settings)?;

    let outcome = pipeline.answer_question(&question, top_k).await?;
    Ok(serde_json::to_string(&outcome.answer)?)
}

fn handle_status() -> anyhow::Result<String> {
    let settings = Settings::from_env()?;
    let index = VectorIndex::open(&settings.index_dir, paperqa::EMBEDDING_DIM)?;

    let output = StatusOutput {
        documents_indexed: index.count(),
        embedding_dimension: paperqa::EMBEDDING_DIM,
        llm_model: settings.model,
        index_dir: settings.index_dir.display().to_string(),
    };
    Ok(serde_json::to_string(&output)?)
}
