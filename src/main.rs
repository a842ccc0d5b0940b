//! # askdoc CLI
//!
//! The `askdoc` binary is the shell around the retrieval pipeline. It
//! plays the part of the upload endpoint for a single local user: reads a
//! file from disk, kicks off background ingestion, and runs the ask flow.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askdoc init` | Create the SQLite database and run schema migrations |
//! | `askdoc ingest <file>` | Ingest a PDF or docx into searchable passages |
//! | `askdoc ask "<question>"` | Ask a question, optionally scoped to one document |
//! | `askdoc list` | List uploaded documents and their processing state |
//! | `askdoc status <id>` | Show one document's state and chunk count |
//! | `askdoc delete <id>` | Delete a document and its chunks |
//!
//! ## Examples
//!
//! ```bash
//! askdoc init --config ./config/askdoc.toml
//! askdoc ingest ./report.pdf
//! askdoc ask "what does the report conclude?" --doc <id>
//! askdoc ask "summarize the key risks"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use askdoc::config::{load_config, Config};
use askdoc::extract::{MEDIA_DOCX, MEDIA_PDF};
use askdoc::models::ConversationTurn;
use askdoc::services::Services;
use askdoc::{ask, db, ingest, migrate};

/// Single local user owning everything the CLI ingests.
const LOCAL_USER: &str = "local";

/// askdoc — ask natural-language questions about your own documents.
#[derive(Parser)]
#[command(
    name = "askdoc",
    about = "askdoc — a local-first document question-answering pipeline",
    version,
    long_about = "askdoc ingests PDF and Word documents into searchable passages \
    (with OCR fallback for image-only PDFs), retrieves the passages relevant to a \
    question, and asks a local generation service for a grounded answer with \
    sources and a confidence score."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/askdoc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Running
    /// it multiple times is safe.
    Init,

    /// Ingest a document file.
    ///
    /// Reads the file, starts background ingestion (extract → chunk →
    /// embed → index), and waits for the report. The media type is
    /// inferred from the file extension unless overridden.
    Ingest {
        /// Path to a .pdf or .docx file.
        file: PathBuf,

        /// Override the declared media type.
        #[arg(long)]
        media_type: Option<String>,
    },

    /// Ask a question against ingested content.
    Ask {
        /// The question text.
        question: String,

        /// Restrict retrieval to one document id.
        #[arg(long)]
        doc: Option<String>,

        /// Path to a JSON conversation transcript
        /// (array of {"role": "user"|"assistant", "text": "..."}).
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// List uploaded documents and their processing state.
    List,

    /// Show one document's processing state and chunk count.
    Status {
        /// Document id.
        id: String,
    },

    /// Delete a document and cascade its chunks.
    Delete {
        /// Document id.
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("askdoc=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Ingest { file, media_type } => run_ingest(config, &file, media_type).await,
        Commands::Ask {
            question,
            doc,
            history,
        } => run_ask(config, &question, doc.as_deref(), history.as_deref()).await,
        Commands::List => run_list(config).await,
        Commands::Status { id } => run_status(config, &id).await,
        Commands::Delete { id } => run_delete(config, &id).await,
    }
}

async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    pool.close().await;
    println!("initialized {}", config.db.path.display());
    Ok(())
}

async fn run_ingest(config: Config, file: &Path, media_type: Option<String>) -> Result<()> {
    let media_type = match media_type {
        Some(mt) => mt,
        None => infer_media_type(file)?,
    };

    let bytes = std::fs::read(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    let services = Arc::new(Services::init(config).await?);

    let (document_id, handle) =
        ingest::spawn_ingest(services, LOCAL_USER, &file_name, &media_type, bytes).await?;
    println!("accepted {} as document {}", file_name, document_id);

    let report = handle.await?;
    println!("  processed: {}", report.state.as_str());
    println!("  chunks: {} of {}", report.chunks_created, report.chunk_count);
    println!("  indexed: {}", report.chunks_indexed);

    Ok(())
}

async fn run_ask(
    config: Config,
    question: &str,
    doc: Option<&str>,
    history_path: Option<&Path>,
) -> Result<()> {
    let history = match history_path {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };

    let services = Services::init(config).await?;
    let answer = ask::ask(&services, LOCAL_USER, question, doc, &history).await?;

    println!("{}", answer.text);
    println!();
    println!("confidence: {}", answer.confidence);
    if !answer.sources.is_empty() {
        println!("sources:");
        for (i, source) in answer.sources.iter().enumerate() {
            println!(
                "  {}. [{:.2}] document {} chunk {} ({})",
                i + 1,
                source.score,
                source.document_id,
                source.chunk_index,
                source.served_by.as_str()
            );
        }
    }

    Ok(())
}

async fn run_list(config: Config) -> Result<()> {
    let services = Services::init(config).await?;
    let docs = services.store.list_documents(LOCAL_USER).await?;

    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    for doc in docs {
        println!(
            "{}  {:<9}  {:>8} bytes  {}",
            doc.id,
            doc.processed.as_str(),
            doc.byte_size,
            doc.file_name
        );
    }

    Ok(())
}

async fn run_status(config: Config, id: &str) -> Result<()> {
    let services = Services::init(config).await?;
    let doc = match services.store.get_document(id).await? {
        Some(doc) => doc,
        None => bail!("document not found: {}", id),
    };
    let chunks = services.store.chunk_count(id).await?;

    println!("id:         {}", doc.id);
    println!("file:       {}", doc.file_name);
    println!("media type: {}", doc.media_type);
    println!("size:       {} bytes", doc.byte_size);
    println!("processed:  {}", doc.processed.as_str());
    println!("chunks:     {}", chunks);

    Ok(())
}

async fn run_delete(config: Config, id: &str) -> Result<()> {
    let services = Services::init(config).await?;

    let filter = askdoc::index::IndexFilter {
        user_id: LOCAL_USER.to_string(),
        document_id: Some(id.to_string()),
    };
    services.index.delete_document(&filter).await;
    services.store.delete_document(id).await?;

    println!("deleted {}", id);
    Ok(())
}

fn infer_media_type(file: &Path) -> Result<String> {
    match file
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("pdf") => Ok(MEDIA_PDF.to_string()),
        Some("docx") => Ok(MEDIA_DOCX.to_string()),
        other => bail!(
            "cannot infer media type from extension {:?}; pass --media-type",
            other.unwrap_or("")
        ),
    }
}

fn load_history(path: &Path) -> Result<Vec<ConversationTurn>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file: {}", path.display()))?;
    let history: Vec<ConversationTurn> =
        serde_json::from_str(&content).with_context(|| "Failed to parse history JSON")?;
    Ok(history)
}
