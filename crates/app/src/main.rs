use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use rag_assistant_core::{
    build_or_load, collect_documents, load_directory_csv, Assistant, CharacterNgramEmbedder,
    Embedder, ExpertDirectory, IndexOrigin, IndexRetriever, IngestionOptions, KeywordClassifier,
    OllamaClient, OllamaConfig, OllamaEmbedder, OllamaGenerator, Session, VectorIndex,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_GENERATION_MODEL, DEFAULT_OLLAMA_URL, PREVIEW_CHARS,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type CliAssistant =
    Assistant<IndexRetriever<Box<dyn Embedder>>, OllamaGenerator, KeywordClassifier>;

#[derive(Parser)]
#[command(name = "rag-assistant", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory of the persisted vector index; built only when absent
    #[arg(long, env = "RAG_INDEX_DIR", default_value = "./company_docs_index")]
    index_dir: PathBuf,

    /// Document to ingest (PDF, TXT or MD); repeat or comma-separate for several
    #[arg(long = "doc", env = "RAG_DOCS", value_delimiter = ',')]
    docs: Vec<PathBuf>,

    /// Folder scanned recursively for documents to ingest
    #[arg(long, env = "RAG_DOCS_DIR")]
    docs_dir: Option<PathBuf>,

    /// Expert contact CSV with Name, Role, Email, Topic columns
    #[arg(long, env = "RAG_EXPERTS")]
    experts: Option<PathBuf>,

    /// JSON topic keyword table; the built-in table is used when omitted
    #[arg(long, env = "RAG_TOPICS")]
    topics: Option<PathBuf>,

    /// Ollama base URL
    #[arg(long, env = "OLLAMA_URL", default_value = DEFAULT_OLLAMA_URL)]
    ollama_url: String,

    /// Embedding model, used both for ingestion and queries
    #[arg(long, env = "RAG_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Generation model
    #[arg(long, env = "RAG_GENERATION_MODEL", default_value = DEFAULT_GENERATION_MODEL)]
    generation_model: String,

    /// Number of chunks retrieved per question
    #[arg(long, env = "RAG_TOP_K", default_value = "4")]
    top_k: usize,

    /// Maximum characters per chunk
    #[arg(long, env = "RAG_CHUNK_SIZE", default_value = "500")]
    chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, env = "RAG_CHUNK_OVERLAP", default_value = "50")]
    chunk_overlap: usize,

    /// Timeout for each model request, in seconds
    #[arg(long, env = "RAG_REQUEST_TIMEOUT_SECS", default_value = "120")]
    request_timeout_secs: u64,

    /// Use the offline character n-gram embedder instead of Ollama embeddings
    #[arg(long, env = "RAG_OFFLINE", default_value_t = false)]
    offline: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Build the vector index from the configured documents, unless it already exists.
    Ingest,
    /// Answer a single question and exit.
    Ask {
        /// Question to answer
        #[arg(long)]
        question: String,
    },
    /// Interactive chat on stdin. Commands: /history, /transcript, /clear, /quit.
    Chat,
}

impl Cli {
    fn ollama_client(&self) -> anyhow::Result<OllamaClient> {
        let config = OllamaConfig {
            base_url: self.ollama_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        };
        OllamaClient::new(&config).context("failed to configure the Ollama client")
    }

    fn embedder(&self, client: &OllamaClient) -> Box<dyn Embedder> {
        if self.offline {
            Box::new(CharacterNgramEmbedder::default())
        } else {
            Box::new(OllamaEmbedder::new(client.clone(), &self.embedding_model))
        }
    }

    fn documents(&self) -> Vec<PathBuf> {
        collect_documents(&self.docs, self.docs_dir.as_deref())
    }

    fn ingestion_options(&self) -> IngestionOptions {
        IngestionOptions {
            chunk_max_chars: self.chunk_size,
            chunk_overlap_chars: self.chunk_overlap,
        }
    }

    async fn open_index(
        &self,
        embedder: &dyn Embedder,
    ) -> anyhow::Result<(VectorIndex, IndexOrigin)> {
        let documents = self.documents();
        build_or_load(&documents, &self.index_dir, embedder, &self.ingestion_options())
            .await
            .with_context(|| format!("failed to prepare index at {}", self.index_dir.display()))
    }

    fn expert_directory(&self) -> anyhow::Result<ExpertDirectory> {
        match &self.experts {
            Some(path) => load_directory_csv(path)
                .with_context(|| format!("failed to load experts from {}", path.display())),
            None => {
                warn!("no expert directory configured; answers will not include contacts");
                Ok(ExpertDirectory::default())
            }
        }
    }

    fn classifier(&self) -> anyhow::Result<KeywordClassifier> {
        match &self.topics {
            Some(path) => KeywordClassifier::from_json_file(path)
                .with_context(|| format!("failed to load topics from {}", path.display())),
            None => Ok(KeywordClassifier::default()),
        }
    }

    async fn assistant(&self) -> anyhow::Result<CliAssistant> {
        let client = self.ollama_client()?;
        let embedder = self.embedder(&client);
        let (index, origin) = self.open_index(embedder.as_ref()).await?;
        info!(?origin, chunk_count = index.len(), "index ready");

        let generator = OllamaGenerator::new(client, &self.generation_model);
        Ok(Assistant::new(
            IndexRetriever::new(index, embedder),
            generator,
            self.classifier()?,
            self.expert_directory()?,
        )
        .with_top_k(self.top_k))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "rag-assistant boot"
    );

    match &cli.command {
        Command::Ingest => {
            let client = cli.ollama_client()?;
            let embedder = cli.embedder(&client);
            let (index, origin) = cli.open_index(embedder.as_ref()).await?;
            let manifest = index.manifest();

            match origin {
                IndexOrigin::Built => println!(
                    "{} chunks ingested into {} at {}",
                    index.len(),
                    cli.index_dir.display(),
                    Utc::now().to_rfc3339()
                ),
                IndexOrigin::Loaded => println!(
                    "index at {} already exists: {} chunks, model={}, created_at={}",
                    cli.index_dir.display(),
                    manifest.chunk_count,
                    manifest.embedding_model,
                    manifest.created_at.to_rfc3339()
                ),
            }
        }
        Command::Ask { question } => {
            let assistant = cli.assistant().await?;
            let mut session = Session::new();
            let reply = assistant.respond(&mut session, question).await?;
            println!("{}", reply.text);
        }
        Command::Chat => {
            let assistant = cli.assistant().await?;
            run_chat(&assistant).await?;
        }
    }

    Ok(())
}

async fn run_chat(assistant: &CliAssistant) -> anyhow::Result<()> {
    let mut session = Session::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Ask your question about the company. /history, /transcript, /clear, /quit");
    prompt_marker()?;

    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear_history();
                println!("chat history cleared");
            }
            "/history" => {
                for preview in session.previews(PREVIEW_CHARS).iter().rev() {
                    println!("{preview}");
                }
            }
            "/transcript" => {
                for entry in session.history() {
                    println!("{}: {}\n", entry.role.label(), entry.message);
                }
            }
            question => match assistant.respond(&mut session, question).await {
                Ok(reply) => println!("{}\n", reply.text),
                Err(error) => {
                    warn!(error = %error, "question failed");
                    println!("Sorry, I couldn't answer that right now: {error}\n");
                }
            },
        }
        prompt_marker()?;
    }

    Ok(())
}

fn prompt_marker() -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()
}
