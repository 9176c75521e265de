use crate::embeddings::Embedder;
use crate::error::ModelError;
use crate::prompt::PromptText;
use crate::traits::Generator;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;
use url::Url;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_EMBEDDING_MODEL: &str = "mxbai-embed-large";
pub const DEFAULT_GENERATION_MODEL: &str = "llama3.1";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const BACKEND: &str = "ollama";

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Shared HTTP plumbing for the Ollama REST API.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    client: Client,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Result<Self, ModelError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            base_url: parse_base_url(&config.base_url)?,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ModelError> {
        Ok(self.base_url.join(path)?)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ModelError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let response = self.client.post(url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(ModelError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("{status}: {}", details.trim()),
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ModelError> {
    let trimmed = raw.trim();
    // `Url::join` replaces the last segment unless the base ends with a slash.
    if trimmed.ends_with('/') {
        Ok(Url::parse(trimmed)?)
    } else {
        Ok(Url::parse(&format!("{trimmed}/"))?)
    }
}

pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| ModelError::EmptyResponse {
            model: self.model.clone(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let response: EmbedResponse = self.client.post_json("api/embed", &request).await?;
        checked_embeddings(response, texts.len(), &self.model)
    }
}

/// Ollama answers `/api/embed` with one vector per input, in input order.
fn checked_embeddings(
    response: EmbedResponse,
    expected: usize,
    model: &str,
) -> Result<Vec<Vec<f32>>, ModelError> {
    let vectors = response.embeddings;
    if vectors.is_empty() || vectors.iter().any(|vector| vector.is_empty()) {
        return Err(ModelError::EmptyResponse {
            model: model.to_string(),
        });
    }
    if vectors.len() != expected {
        return Err(ModelError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("expected {expected} embeddings, got {}", vectors.len()),
        });
    }
    Ok(vectors)
}

pub struct OllamaGenerator {
    client: OllamaClient,
    model: String,
}

impl OllamaGenerator {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &PromptText) -> Result<String, ModelError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: prompt.as_str(),
            stream: false,
        };
        let response: GenerateResponse = self.client.post_json("api/generate", &request).await?;
        Ok(answer_text(response, &self.model))
    }
}

/// A blank answer is still an answer; it is passed through unchanged.
fn answer_text(response: GenerateResponse, model: &str) -> String {
    if response.response.trim().is_empty() {
        warn!(model, "generator returned a blank answer");
    }
    response.response
}
