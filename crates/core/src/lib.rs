pub mod chunking;
pub mod classifier;
pub mod directory;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod memory;
pub mod models;
pub mod ollama;
pub mod orchestrator;
pub mod prompt;
pub mod store;
pub mod traits;

pub use chunking::{build_chunks, normalize_page_text, split_with_overlap, ChunkingConfig};
pub use classifier::{KeywordClassifier, TopicKeywords};
pub use directory::{build_directory, load_directory_csv, ExpertDirectory, ExpertRecord, ExpertRow};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{ChatError, IngestError, ModelError, SearchError};
pub use extractor::{extract_page_texts, DocumentKind, PageExtractor, PageText};
pub use ingest::{
    build_or_load, chunk_documents, collect_documents, discover_documents, embed_chunks,
    IndexOrigin, EMBED_BATCH_SIZE,
};
pub use memory::{truncate_preview, ConversationMemory, Session, MEMORY_CAPACITY, PREVIEW_CHARS};
pub use models::{
    Chunk, HistoryEntry, IndexManifest, IndexedChunk, IngestionOptions, MemoryEntry, Reply,
    ReplyKind, RetrievedChunk, Role,
};
pub use ollama::{
    OllamaClient, OllamaConfig, OllamaEmbedder, OllamaGenerator, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_GENERATION_MODEL, DEFAULT_OLLAMA_URL,
};
pub use orchestrator::{is_greeting, Assistant, DEFAULT_TOP_K};
pub use prompt::{assemble, PromptInput, PromptText};
pub use store::{IndexRetriever, VectorIndex};
pub use traits::{Generator, Retriever, TopicClassifier};
