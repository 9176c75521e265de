use crate::embeddings::{cosine_similarity, Embedder};
use crate::error::{IngestError, SearchError};
use crate::models::{IndexManifest, IndexedChunk, RetrievedChunk};
use crate::traits::Retriever;
use async_trait::async_trait;
use chrono::Utc;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const CHUNKS_FILE: &str = "chunks.json";

/// Embedded chunks held in memory, persisted as a directory of JSON files.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    manifest: IndexManifest,
    entries: Vec<IndexedChunk>,
}

impl VectorIndex {
    pub fn new(embedding_model: &str, entries: Vec<IndexedChunk>) -> Result<Self, IngestError> {
        let dimensions = entries.first().map(|entry| entry.embedding.len()).unwrap_or(0);
        if let Some(bad) = entries
            .iter()
            .find(|entry| entry.embedding.len() != dimensions)
        {
            return Err(IngestError::InvalidArgument(format!(
                "embedding dimension {} != {} for chunk {}",
                bad.embedding.len(),
                dimensions,
                bad.chunk.chunk_id
            )));
        }

        Ok(Self {
            manifest: IndexManifest {
                embedding_model: embedding_model.to_string(),
                dimensions,
                chunk_count: entries.len(),
                created_at: Utc::now(),
            },
            entries,
        })
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn entries(&self) -> &[IndexedChunk] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Brute-force cosine ranking over every stored chunk.
    pub fn search(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        if query_vector.len() != self.manifest.dimensions {
            return Err(SearchError::DimensionMismatch {
                expected: self.manifest.dimensions,
                found: query_vector.len(),
            });
        }

        let mut scored: Vec<RetrievedChunk> = self
            .entries
            .iter()
            .map(|entry| RetrievedChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(query_vector, &entry.embedding),
            })
            .collect();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(k);
        Ok(scored)
    }

    /// Writes into a sibling staging directory, then renames it to
    /// `location` so a failed write never leaves an index behind.
    pub fn persist(&self, location: &Path) -> Result<(), IngestError> {
        if location.exists() {
            return Err(IngestError::InvalidArgument(format!(
                "refusing to overwrite existing index at {}",
                location.display()
            )));
        }

        let staging = staging_path(location)?;
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        if let Some(parent) = location.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir(&staging)?;

        let written = write_json(&staging.join(MANIFEST_FILE), &self.manifest)
            .and_then(|()| write_json(&staging.join(CHUNKS_FILE), &self.entries));
        if let Err(error) = written {
            let _ = fs::remove_dir_all(&staging);
            return Err(error);
        }

        fs::rename(&staging, location)?;
        Ok(())
    }

    pub fn load(location: &Path) -> Result<Self, IngestError> {
        let manifest: IndexManifest = read_json(&location.join(MANIFEST_FILE))?;
        let entries: Vec<IndexedChunk> = read_json(&location.join(CHUNKS_FILE))?;

        if entries.len() != manifest.chunk_count {
            return Err(IngestError::CorruptIndex {
                path: location.display().to_string(),
                details: format!(
                    "manifest lists {} chunks but {} were stored",
                    manifest.chunk_count,
                    entries.len()
                ),
            });
        }

        if let Some(bad) = entries
            .iter()
            .find(|entry| entry.embedding.len() != manifest.dimensions)
        {
            return Err(IngestError::CorruptIndex {
                path: location.display().to_string(),
                details: format!(
                    "chunk {} has dimension {}, manifest says {}",
                    bad.chunk.chunk_id,
                    bad.embedding.len(),
                    manifest.dimensions
                ),
            });
        }

        Ok(Self { manifest, entries })
    }
}

fn staging_path(location: &Path) -> Result<PathBuf, IngestError> {
    let name = location
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(location.display().to_string()))?;
    Ok(location.with_file_name(format!("{name}.partial")))
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), IngestError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, IngestError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Embeds the query with the same model the index was built with and ranks
/// stored chunks against it.
pub struct IndexRetriever<E> {
    index: VectorIndex,
    embedder: E,
}

impl<E: Embedder> IndexRetriever<E> {
    pub fn new(index: VectorIndex, embedder: E) -> Self {
        Self { index, embedder }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }
}

#[async_trait]
impl<E: Embedder> Retriever for IndexRetriever<E> {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, SearchError> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query).await?;
        let hits = self.index.search(&query_vector, k)?;
        tracing::debug!(hits = hits.len(), k, "retrieved chunks");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::Chunk;
    use tempfile::tempdir;

    fn indexed(embedder: &CharacterNgramEmbedder, index: u64, text: &str) -> IndexedChunk {
        IndexedChunk {
            chunk: Chunk {
                chunk_id: format!("chunk-{index}"),
                source: "policy.pdf".to_string(),
                page: 1,
                chunk_index: index,
                text: text.to_string(),
            },
            embedding: embedder.embed_sync(text),
        }
    }

    fn sample_index() -> VectorIndex {
        let embedder = CharacterNgramEmbedder::default();
        VectorIndex::new(
            embedder.model_name(),
            vec![
                indexed(&embedder, 0, "Printer toner is stored in room 4."),
                indexed(&embedder, 1, "All travel must be pre-approved."),
                indexed(&embedder, 2, "Parking permits renew every January."),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn retrieval_ranks_by_similarity() {
        let retriever = IndexRetriever::new(sample_index(), CharacterNgramEmbedder::default());
        let hits = retriever.retrieve("travel pre-approved", 2).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.chunk_id, "chunk-1");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn empty_index_returns_no_hits() {
        let index = VectorIndex::new("char-trigram-hash", Vec::new()).unwrap();
        let retriever = IndexRetriever::new(index, CharacterNgramEmbedder::default());
        assert!(retriever.retrieve("anything", 4).await.unwrap().is_empty());
    }

    #[test]
    fn wrong_query_dimension_is_rejected() {
        let result = sample_index().search(&[1.0, 0.0], 4);
        assert!(matches!(result, Err(SearchError::DimensionMismatch { .. })));
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let embedder = CharacterNgramEmbedder::default();
        let mut short = indexed(&embedder, 1, "short");
        short.embedding.truncate(3);
        let result = VectorIndex::new("m", vec![indexed(&embedder, 0, "full"), short]);
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
    }

    #[test]
    fn persisted_index_loads_back() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let location = dir.path().join("company_docs");
        let index = sample_index();

        index.persist(&location)?;
        let loaded = VectorIndex::load(&location)?;

        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.manifest(), index.manifest());
        assert!(!dir.path().join("company_docs.partial").exists());
        Ok(())
    }

    #[test]
    fn persist_refuses_to_overwrite() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = sample_index();
        assert!(index.persist(dir.path()).is_err());
        Ok(())
    }

    #[test]
    fn truncated_chunk_file_is_reported_corrupt() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let location = dir.path().join("index");
        sample_index().persist(&location)?;
        fs::write(location.join(CHUNKS_FILE), "[]")?;

        assert!(matches!(
            VectorIndex::load(&location),
            Err(IngestError::CorruptIndex { .. })
        ));
        Ok(())
    }
}
