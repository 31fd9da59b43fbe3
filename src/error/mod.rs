use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Completion client errors
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Retry budget exhausted after {attempts} attempts: {last_error}")]
    TransientCallExhausted { attempts: u32, last_error: String },

    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl CompletionError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Client errors that will fail identically on every attempt are not retried.
    pub fn is_transient(&self) -> bool {
        match self {
            CompletionError::Configuration { .. } => false,
            CompletionError::TransientCallExhausted { .. } => false,
            CompletionError::Api { status, .. } => !matches!(status, 400 | 401 | 403 | 404 | 422),
            CompletionError::MalformedResponse { .. }
            | CompletionError::Timeout { .. }
            | CompletionError::Http(_) => true,
        }
    }
}

/// Append-only log errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to persist incomplete record {example_id}: missing {missing}")]
    IncompleteRecord { example_id: String, missing: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Embedding backend errors
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid embedding response: {message}")]
    InvalidResponse { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A dataset line that cannot become an example
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize)]
#[error("line {line}: {reason}")]
pub struct DataIntegrityError {
    pub line: usize,
    pub reason: String,
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for completion calls
pub type CompletionResult<T> = Result<T, CompletionError>;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for embedding operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;
