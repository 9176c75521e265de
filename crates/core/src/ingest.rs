use crate::chunking::{build_chunks, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::ModelError;
use crate::extractor::{extract_page_texts, DocumentKind};
use crate::models::{Chunk, IndexedChunk, IngestionOptions};
use crate::store::VectorIndex;
use crate::IngestError;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Chunks sent to the embedder per request.
pub const EMBED_BATCH_SIZE: usize = 32;

/// Finds every supported document under `folder`, sorted by path.
pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        if DocumentKind::from_path(entry.path()).is_some() {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Explicit documents first, then whatever `folder` holds. A file named
/// twice, by any spelling of its path, is kept once.
pub fn collect_documents(explicit: &[PathBuf], folder: Option<&Path>) -> Vec<PathBuf> {
    let discovered = folder.map(discover_documents).unwrap_or_default();
    let mut seen = HashSet::new();

    explicit
        .iter()
        .cloned()
        .chain(discovered)
        .filter(|path| seen.insert(fs::canonicalize(path).unwrap_or_else(|_| path.clone())))
        .collect()
}

pub fn source_label(path: &Path) -> Result<String, IngestError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })
}

/// Extracts and chunks every document. Any unreadable document aborts the
/// whole run.
pub fn chunk_documents(
    doc_paths: &[PathBuf],
    options: &IngestionOptions,
) -> Result<Vec<Chunk>, IngestError> {
    if doc_paths.is_empty() {
        return Err(IngestError::InvalidArgument(
            "no documents given for ingestion".to_string(),
        ));
    }
    ChunkingConfig::from(options).validate()?;

    let mut chunks = Vec::new();
    let mut cursor = 0u64;

    for path in doc_paths {
        let source = source_label(path)?;
        let pages = extract_page_texts(path)?;
        let before = chunks.len();

        for page in pages {
            let (page_chunks, next_cursor) =
                build_chunks(&source, page.number, &page.text, options, cursor)?;
            cursor = next_cursor;
            chunks.extend(page_chunks);
        }

        info!(source = %source, chunk_count = chunks.len() - before, "chunked document");
    }

    Ok(chunks)
}

pub async fn embed_chunks<E>(
    embedder: &E,
    chunks: Vec<Chunk>,
) -> Result<Vec<IndexedChunk>, IngestError>
where
    E: Embedder + ?Sized,
{
    let total = chunks.len();
    let mut indexed = Vec::with_capacity(total);

    for batch in chunks.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;
        if embeddings.len() != batch.len() {
            return Err(IngestError::Model(ModelError::BackendResponse {
                backend: embedder.model_name().to_string(),
                details: format!(
                    "expected {} embeddings, received {}",
                    batch.len(),
                    embeddings.len()
                ),
            }));
        }

        indexed.extend(
            batch
                .iter()
                .cloned()
                .zip(embeddings)
                .map(|(chunk, embedding)| IndexedChunk { chunk, embedding }),
        );
        debug!(embedded = indexed.len(), total, "embedded batch");
    }

    Ok(indexed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    Built,
    Loaded,
}

/// Loads the index at `index_location` if it exists; otherwise ingests
/// `doc_paths`, embeds every chunk, and persists the result there.
pub async fn build_or_load<E>(
    doc_paths: &[PathBuf],
    index_location: &Path,
    embedder: &E,
    options: &IngestionOptions,
) -> Result<(VectorIndex, IndexOrigin), IngestError>
where
    E: Embedder + ?Sized,
{
    if index_location.exists() {
        let index = VectorIndex::load(index_location)?;
        let found = &index.manifest().embedding_model;
        if found != embedder.model_name() {
            return Err(IngestError::EmbeddingModelMismatch {
                expected: embedder.model_name().to_string(),
                found: found.clone(),
            });
        }

        info!(
            path = %index_location.display(),
            chunk_count = index.len(),
            "loaded existing index, skipping ingestion"
        );
        return Ok((index, IndexOrigin::Loaded));
    }

    info!(
        path = %index_location.display(),
        documents = doc_paths.len(),
        model = embedder.model_name(),
        "building index"
    );

    let chunks = chunk_documents(doc_paths, options)?;
    let indexed = embed_chunks(embedder, chunks).await?;
    let index = VectorIndex::new(embedder.model_name(), indexed)?;
    index.persist(index_location)?;

    info!(chunk_count = index.len(), "index persisted");
    Ok((index, IndexOrigin::Built))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::extractor::fixtures::write_blank_pdf;
    use async_trait::async_trait;
    use std::fs::File;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct CountingEmbedder {
        inner: CharacterNgramEmbedder,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.inner.embed_sync(text))
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ModelError> {
            Err(ModelError::EmptyResponse {
                model: "failing".to_string(),
            })
        }
    }

    /// Records the size of every batch it is handed. With `drop_last` set it
    /// answers one vector short.
    #[derive(Default)]
    struct BatchRecordingEmbedder {
        inner: CharacterNgramEmbedder,
        batches: Mutex<Vec<usize>>,
        drop_last: bool,
    }

    #[async_trait]
    impl Embedder for BatchRecordingEmbedder {
        fn model_name(&self) -> &str {
            "batch-recording"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
            Ok(self.inner.embed_sync(text))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
            self.batches.lock().unwrap().push(texts.len());
            let mut vectors: Vec<Vec<f32>> =
                texts.iter().map(|text| self.inner.embed_sync(text)).collect();
            if self.drop_last {
                vectors.pop();
            }
            Ok(vectors)
        }
    }

    fn numbered_chunks(count: u64) -> Vec<Chunk> {
        (0..count)
            .map(|index| Chunk {
                chunk_id: format!("chunk-{index}"),
                source: "policy.txt".to_string(),
                page: 1,
                chunk_index: index,
                text: format!("Rule {index}: keep receipts."),
            })
            .collect()
    }

    fn write_docs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let policy = dir.join("policy.txt");
        fs::write(
            &policy,
            "All travel must be pre-approved.\u{000C}Expenses are filed within 30 days.",
        )?;
        let handbook = dir.join("handbook.md");
        fs::write(&handbook, "Badges are issued on the first day.".repeat(30))?;
        Ok(vec![policy, handbook])
    }

    #[test]
    fn discover_documents_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        fs::write(nested.join("b.txt"), "text")?;
        fs::write(nested.join("c.xlsx"), "not a document")?;

        let files = discover_documents(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn chunks_carry_the_file_name_as_source() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let docs = write_docs(dir.path())?;

        let chunks = chunk_documents(&docs, &IngestionOptions::default())?;
        assert_eq!(chunks[0].source, "policy.txt");
        assert_eq!(chunks[0].page, 1);
        assert_eq!(chunks[1].page, 2);
        assert!(chunks.iter().any(|chunk| chunk.source == "handbook.md"));
        assert!(chunks.iter().all(|chunk| chunk.text.chars().count() <= 500));

        let indices: Vec<u64> = chunks.iter().map(|chunk| chunk.chunk_index).collect();
        assert_eq!(indices, (0..chunks.len() as u64).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn ingestion_fails_without_documents() {
        let result = chunk_documents(&[], &IngestionOptions::default());
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn second_build_performs_no_ingestion() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let docs = write_docs(dir.path())?;
        let location = dir.path().join("index");
        let embedder = CountingEmbedder::default();
        let options = IngestionOptions::default();

        let (first, origin) = build_or_load(&docs, &location, &embedder, &options).await?;
        let calls_after_build = embedder.calls.load(Ordering::SeqCst);
        assert_eq!(origin, IndexOrigin::Built);
        assert_eq!(calls_after_build, first.len());

        let (second, origin) = build_or_load(&docs, &location, &embedder, &options).await?;
        assert_eq!(origin, IndexOrigin::Loaded);
        assert_eq!(second.len(), first.len());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_after_build);
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_document_leaves_no_index() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut docs = write_docs(dir.path())?;
        docs.push(dir.path().join("missing.pdf"));
        let location = dir.path().join("index");

        let result = build_or_load(
            &docs,
            &location,
            &CharacterNgramEmbedder::default(),
            &IngestionOptions::default(),
        )
        .await;

        assert!(result.is_err());
        assert!(!location.exists());
        Ok(())
    }

    #[tokio::test]
    async fn embedding_failure_leaves_no_index() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let docs = write_docs(dir.path())?;
        let location = dir.path().join("index");

        let options = IngestionOptions::default();
        let result = build_or_load(&docs, &location, &FailingEmbedder, &options).await;

        assert!(matches!(result, Err(IngestError::Model(_))));
        assert!(!location.exists());
        Ok(())
    }

    #[tokio::test]
    async fn index_from_another_model_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let docs = write_docs(dir.path())?;
        let location = dir.path().join("index");
        let options = IngestionOptions::default();

        build_or_load(&docs, &location, &CountingEmbedder::default(), &options).await?;
        let other = CharacterNgramEmbedder::default();
        let result = build_or_load(&docs, &location, &other, &options).await;

        assert!(matches!(
            result,
            Err(IngestError::EmbeddingModelMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn documents_named_twice_are_collected_once() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let docs = write_docs(dir.path())?;
        let spelled_differently = dir.path().join(".").join("policy.txt");

        let collected = collect_documents(
            &[docs[0].clone(), spelled_differently, docs[0].clone()],
            Some(dir.path()),
        );

        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0], docs[0]);
        assert!(collected.iter().any(|path| path.ends_with("handbook.md")));
        Ok(())
    }

    #[tokio::test]
    async fn chunks_are_embedded_in_batches() -> Result<(), Box<dyn std::error::Error>> {
        let embedder = BatchRecordingEmbedder::default();
        let total = EMBED_BATCH_SIZE as u64 + 5;

        let indexed = embed_chunks(&embedder, numbered_chunks(total)).await?;

        assert_eq!(indexed.len(), total as usize);
        assert_eq!(indexed[total as usize - 1].chunk.chunk_index, total - 1);
        assert_eq!(*embedder.batches.lock().unwrap(), vec![EMBED_BATCH_SIZE, 5]);
        Ok(())
    }

    #[tokio::test]
    async fn short_batch_response_is_an_error() {
        let embedder = BatchRecordingEmbedder {
            drop_last: true,
            ..Default::default()
        };

        let result = embed_chunks(&embedder, numbered_chunks(3)).await;

        assert!(matches!(
            result,
            Err(IngestError::Model(ModelError::BackendResponse { .. }))
        ));
    }

    #[tokio::test]
    async fn textless_pdf_does_not_block_ingestion() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let cover = dir.path().join("cover.pdf");
        write_blank_pdf(&cover)?;
        let policy = dir.path().join("policy.txt");
        fs::write(&policy, "All travel must be pre-approved.")?;
        let location = dir.path().join("index");

        let (index, origin) = build_or_load(
            &[cover, policy],
            &location,
            &CharacterNgramEmbedder::default(),
            &IngestionOptions::default(),
        )
        .await?;

        assert_eq!(origin, IndexOrigin::Built);
        assert_eq!(index.len(), 1);
        assert_eq!(index.entries()[0].chunk.source, "policy.txt");
        assert!(location.exists());
        Ok(())
    }
}
