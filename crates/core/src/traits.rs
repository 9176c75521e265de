use crate::error::{ModelError, SearchError};
use crate::models::RetrievedChunk;
use crate::prompt::PromptText;
use async_trait::async_trait;

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Returns up to `k` chunks ordered by descending similarity to `query`.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, SearchError>;
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &PromptText) -> Result<String, ModelError>;
}

pub trait TopicClassifier: Send + Sync {
    fn classify(&self, question: &str) -> Option<&str>;
}
