use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use charter_chat::{ChatConfig, ChatService};
use charter_core::{Embedder, LLMProvider};
use charter_gemini::{GeminiClient, GeminiConfig, GeminiEmbedder};
use charter_rag::{
    Chunker, ChunkerConfig, DEFAULT_BATCH_SIZE, Error, HashEmbedder, IndexTarget, IngestionPipeline, IngestionReport,
    open_index,
};
use charter_server::ChatServer;

mod config;

use config::{AppConfig, Backend, EmbedderKind};

#[derive(Parser)]
#[command(name = "charter", version)]
#[command(about = "Grounded question answering over the Constitution of Pakistan (1973)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, chunk, embed and persist a source document
    Ingest {
        /// PDF, text or markdown file
        source: PathBuf,
        /// Index directory
        #[arg(long)]
        storage: Option<PathBuf>,
        #[arg(long, value_enum)]
        backend: Option<Backend>,
        #[arg(long, value_enum)]
        embedder: Option<EmbedderKind>,
        /// Rebuild even if this exact document is already indexed
        #[arg(long)]
        force: bool,
        /// Document title stored with every chunk
        #[arg(long)]
        title: Option<String>,
        #[arg(long, default_value_t = 1000)]
        chunk_size: usize,
        #[arg(long, default_value_t = 100)]
        overlap: usize,
        /// Chunks sent to the embedder per call
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Serve the chat API
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Index directory
        #[arg(long)]
        storage: Option<PathBuf>,
        #[arg(long, value_enum)]
        embedder: Option<EmbedderKind>,
        /// Largest request body accepted, in bytes
        #[arg(long)]
        max_body_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let app = AppConfig::from_env()?;

    match cli.command {
        Commands::Ingest {
            source,
            storage,
            backend,
            embedder,
            force,
            title,
            chunk_size,
            overlap,
            batch_size,
        } => {
            let storage = storage.unwrap_or(app.storage_dir.clone());
            let embedder = build_embedder(embedder.unwrap_or(app.embedder))?;
            let target = match backend.unwrap_or(app.backend) {
                Backend::Local => IndexTarget::Local,
                Backend::Qdrant => IndexTarget::Qdrant {
                    url: app.qdrant_url.clone(),
                    base_collection: app.qdrant_collection.clone(),
                },
            };
            let chunker = Chunker::new(ChunkerConfig::new(chunk_size, overlap))?;
            let title = match title {
                Some(title) => title,
                None => ChatConfig::from_env()?.document_title,
            };

            println!("{} Ingesting {}...", "📄".blue(), source.display());
            let pipeline =
                IngestionPipeline::new(embedder, chunker, title).with_batch_size(batch_size);
            match pipeline.run(&source, &storage, &target, force).await {
                Ok(report) => print_report(&report),
                Err(e @ Error::AlreadyIngested { .. }) => {
                    println!("{} {}", "⚠️".yellow(), e);
                    return Err(e.into());
                }
                Err(e) => return Err(e).context("ingestion failed"),
            }
        }
        Commands::Serve {
            bind,
            port,
            storage,
            embedder,
            max_body_size,
        } => {
            // fail fast without a key, before touching the index
            let gemini = GeminiConfig::from_env().context("cannot start the chat server")?;
            let storage = storage.unwrap_or(app.storage_dir.clone());
            let embedder: Arc<dyn Embedder> = match embedder.unwrap_or(app.embedder) {
                EmbedderKind::Hash => Arc::new(HashEmbedder::default()),
                EmbedderKind::Gemini => Arc::new(GeminiEmbedder::new(gemini.clone())?),
            };

            tracing::info!(storage = %storage.display(), embedder = %embedder.model_id(), "opening index");
            let index = open_index(&storage, embedder.as_ref())
                .await
                .context("cannot open the vector index")?;
            let client = GeminiClient::new(gemini)?;
            let generation = client.default_config();
            let llm: Arc<dyn LLMProvider> = Arc::new(client);

            let chat = ChatService::build(
                &ChatConfig::from_env()?,
                index,
                embedder,
                llm,
                generation,
            );
            let indexed = chat.indexed_chunks().await?;
            if indexed == 0 {
                println!(
                    "{} The index at {} is empty; every question will be answered as not found. Run `charter ingest` first.",
                    "⚠️".yellow(),
                    storage.display()
                );
            } else {
                println!("{} {} chunks indexed", "✅".green(), indexed);
            }

            let server = ChatServer::new(
                &bind.unwrap_or(app.bind.clone()),
                port.unwrap_or(app.port),
                Arc::new(chat),
            )
            .with_max_body_size(max_body_size.unwrap_or(app.max_body_size));
            println!(
                "{} Listening on {}",
                "🚀".cyan(),
                format!("http://{}", server.addr()).bold()
            );
            server.serve().await?;
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_embedder(kind: EmbedderKind) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match kind {
        EmbedderKind::Hash => Arc::new(HashEmbedder::default()),
        EmbedderKind::Gemini => {
            Arc::new(GeminiEmbedder::from_env().context("the Gemini embedder needs an API key")?)
        }
    };
    Ok(embedder)
}

fn print_report(report: &IngestionReport) {
    println!("{} Ingestion complete", "✅".green());
    println!("  {:<16} {}", "Source:".bold(), report.source);
    println!("  {:<16} {}", "Pages:".bold(), report.documents);
    println!("  {:<16} {}", "Chunks:".bold(), report.chunks);
    println!(
        "  {:<16} {} ({} dims)",
        "Embedding model:".bold(),
        report.embedding_model,
        report.dimensions
    );
    println!("  {:<16} {}", "Fingerprint:".bold(), report.fingerprint.dimmed());
    println!("  {:<16} {}", "Stored in:".bold(), report.storage.cyan());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_flags() {
        let cli = Cli::try_parse_from([
            "charter",
            "ingest",
            "constitution.pdf",
            "--backend",
            "qdrant",
            "--force",
        ])
        .unwrap();
        match cli.command {
            Commands::Ingest {
                source,
                backend,
                force,
                chunk_size,
                overlap,
                batch_size,
                ..
            } => {
                assert_eq!(source, PathBuf::from("constitution.pdf"));
                assert_eq!(backend, Some(Backend::Qdrant));
                assert!(force);
                assert_eq!((chunk_size, overlap), (1000, 100));
                assert_eq!(batch_size, DEFAULT_BATCH_SIZE);
            }
            Commands::Serve { .. } => panic!("expected ingest"),
        }
    }

    #[test]
    fn test_serve_flags() {
        let cli = Cli::try_parse_from([
            "charter",
            "serve",
            "--port",
            "9000",
            "--max-body-size",
            "1024",
        ])
        .unwrap();
        match cli.command {
            Commands::Serve {
                port,
                bind,
                max_body_size,
                ..
            } => {
                assert_eq!(port, Some(9000));
                assert!(bind.is_none());
                assert_eq!(max_body_size, Some(1024));
            }
            Commands::Ingest { .. } => panic!("expected serve"),
        }
    }

    #[test]
    fn test_unknown_embedder_rejected() {
        assert!(Cli::try_parse_from(["charter", "serve", "--embedder", "openai"]).is_err());
    }
}
