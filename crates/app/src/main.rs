use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_rag_core::{
    discover_pdf_files, ChunkStore, DocumentRecord, DocumentStatusStore, EmbeddingConfig,
    FileSystemSource, HttpEmbeddingClient, IngestionOutcome, IngestionPipeline, MemoryStore,
    RestTableStore, SearchEngine, SearchQuery, SearchResponse,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Table-store base URL (PostgREST-style row filters).
    #[arg(long, env = "PDF_RAG_STORE_URL", default_value = "http://localhost:3000")]
    store_url: String,

    /// Table-store API key, sent as both apikey header and bearer token.
    #[arg(long, env = "PDF_RAG_STORE_KEY")]
    store_key: Option<String>,

    /// Embedding service base URL (Ollama-compatible).
    #[arg(long, env = "PDF_RAG_EMBEDDING_URL", default_value = "http://localhost:11434")]
    embedding_url: String,

    /// Embedding model name.
    #[arg(long, env = "PDF_RAG_EMBEDDING_MODEL", default_value = "bge-large")]
    embedding_model: String,

    /// Expected embedding dimension; drift is logged, not fatal.
    #[arg(long, default_value = "1024")]
    embedding_dimensions: usize,

    /// Directory the upload collaborator writes document payloads into.
    #[arg(long, env = "PDF_RAG_UPLOADS_DIR", default_value = "uploads/pdfs")]
    uploads_dir: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Register every PDF under a folder and process each into chunks.
    Ingest {
        /// Folder searched recursively for PDF files.
        #[arg(long)]
        folder: PathBuf,
        /// Department tag applied to every registered document.
        #[arg(long)]
        department: Option<String>,
    },
    /// Process (or reprocess) one already-registered document.
    Process {
        /// Document id in the table store.
        #[arg(long)]
        document_id: Uuid,
        /// Payload path relative to the uploads directory.
        #[arg(long)]
        storage_path: String,
    },
    /// Query the corpus with hybrid keyword + vector search.
    Search {
        /// Search query text.
        #[arg(long)]
        query: String,
        /// Number of results to return (clamped to 1-10).
        #[arg(long, default_value = "5")]
        max_results: usize,
        /// Restrict results to one department.
        #[arg(long)]
        department: Option<String>,
    },
    /// Reconcile documents stuck in the processing state.
    Repair,
    /// Ingest a folder into an in-memory store and run one query against it.
    Demo {
        /// Folder searched recursively for PDF files.
        #[arg(long)]
        folder: PathBuf,
        /// Search query text.
        #[arg(long)]
        query: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "pdf-rag boot"
    );

    let embedder = Arc::new(HttpEmbeddingClient::new(EmbeddingConfig {
        endpoint: cli.embedding_url.clone(),
        model: cli.embedding_model.clone(),
        dimensions: cli.embedding_dimensions,
        ..EmbeddingConfig::default()
    }));

    match cli.command {
        Command::Ingest { folder, department } => {
            let store = Arc::new(RestTableStore::new(&cli.store_url, cli.store_key.clone())?);
            ingest_folder(store, embedder, &folder, department).await
        }
        Command::Process {
            document_id,
            storage_path,
        } => {
            let store = Arc::new(RestTableStore::new(&cli.store_url, cli.store_key.clone())?);
            let source = Arc::new(FileSystemSource::new(&cli.uploads_dir));
            let pipeline = IngestionPipeline::new(store, embedder, source);

            let outcome = pipeline.process_document(document_id, &storage_path).await;
            print_outcome(&storage_path, &outcome);
            Ok(())
        }
        Command::Search {
            query,
            max_results,
            department,
        } => {
            let store = Arc::new(RestTableStore::new(&cli.store_url, cli.store_key.clone())?);
            run_search(store, embedder, &query, max_results, department).await
        }
        Command::Repair => {
            let store = Arc::new(RestTableStore::new(&cli.store_url, cli.store_key.clone())?);
            let source = Arc::new(FileSystemSource::new(&cli.uploads_dir));
            let pipeline = IngestionPipeline::new(store, embedder, source);

            let actions = pipeline.reconcile_stale().await?;
            if actions.is_empty() {
                println!("nothing to repair");
            }
            for action in actions {
                println!(
                    "{} -> {} ({} chunks)",
                    action.document_id,
                    action.status.as_str(),
                    action.chunks
                );
            }
            Ok(())
        }
        Command::Demo { folder, query } => {
            let store = Arc::new(MemoryStore::new());
            ingest_folder(store.clone(), embedder.clone(), &folder, None).await?;
            run_search(store, embedder, &query, 5, None).await
        }
    }
}

async fn ingest_folder<S>(
    store: Arc<S>,
    embedder: Arc<HttpEmbeddingClient>,
    folder: &Path,
    department: Option<String>,
) -> anyhow::Result<()>
where
    S: ChunkStore + DocumentStatusStore + 'static,
{
    let files = discover_pdf_files(folder);
    if files.is_empty() {
        println!("no pdf files under {}", folder.display());
        return Ok(());
    }

    let source = Arc::new(FileSystemSource::new(folder));
    let pipeline = IngestionPipeline::new(store.clone(), embedder, source);

    let mut completed = 0usize;
    let mut failed = 0usize;
    for path in files {
        let storage_path = path
            .strip_prefix(folder)
            .unwrap_or(&path)
            .to_string_lossy()
            .to_string();
        let original_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| storage_path.clone());

        let document = DocumentRecord::new(storage_path.clone(), original_name, department.clone());
        store.insert_document(&document).await?;

        let outcome = pipeline.process_document(document.id, &storage_path).await;
        if outcome.success {
            completed += 1;
        } else {
            failed += 1;
        }
        print_outcome(&storage_path, &outcome);
    }

    println!(
        "{completed} completed, {failed} failed at {}",
        Utc::now().to_rfc3339()
    );
    Ok(())
}

async fn run_search<S>(
    store: Arc<S>,
    embedder: Arc<HttpEmbeddingClient>,
    query: &str,
    max_results: usize,
    department: Option<String>,
) -> anyhow::Result<()>
where
    S: ChunkStore + 'static,
{
    let engine = SearchEngine::new(store, embedder)?;
    let mut search_query = SearchQuery::new(query).with_max_results(max_results);
    if let Some(department) = department {
        search_query = search_query.with_department(department);
    }

    let response = engine.search(&search_query).await?;
    print_response(&response);
    Ok(())
}

fn print_outcome(storage_path: &str, outcome: &IngestionOutcome) {
    if outcome.success {
        match &outcome.error {
            Some(error) => println!(
                "{storage_path}: completed with {} chunks (run cut short: {error})",
                outcome.chunks_processed
            ),
            None => println!(
                "{storage_path}: completed with {} chunks",
                outcome.chunks_processed
            ),
        }
    } else {
        println!(
            "{storage_path}: failed ({})",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
}

fn print_response(response: &SearchResponse) {
    if response.degraded {
        warn!("embedding service unavailable, results are keyword-only");
    }
    if response.hits.is_empty() {
        println!(
            "no documents matched \"{}\", try different keywords",
            response.query
        );
        return;
    }

    println!("results for \"{}\"", response.query);
    for (position, hit) in response.hits.iter().enumerate() {
        println!(
            "{}. {} (score: {:.3})",
            position + 1,
            hit.document_title,
            hit.score
        );
        if let Some(department) = &hit.department {
            println!("   department: {department}");
        }
        println!("   {}", hit.chunk_text);
    }
}
