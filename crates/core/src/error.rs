use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("unsupported document type: {0}")]
    UnsupportedDocument(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index at {path} is unusable: {details}")]
    CorruptIndex { path: String, details: String },

    #[error("index was built with embedding model {found}, but {expected} is configured")]
    EmbeddingModelMismatch { expected: String, found: String },

    #[error("embedding failed: {0}")]
    Model(#[from] ModelError),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("model {model} returned an empty response")]
    EmptyResponse { model: String },
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("query embedding failed: {0}")]
    Model(#[from] ModelError),

    #[error("query vector dim {found} is not {expected}")]
    DimensionMismatch { expected: usize, found: usize },
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("retrieval failed: {0}")]
    Search(#[from] SearchError),

    #[error("generation failed: {0}")]
    Generation(#[source] ModelError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
