use std::env;
use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderConfig,
    pub models: ModelConfig,
    pub embedding: EmbeddingConfig,
    pub paths: PathConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub runner: RunnerConfig,
}

/// Which completion service the credentials point at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    OpenRouter,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::OpenRouter => "openrouter",
        }
    }
}

/// Chat completion endpoint configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub api_key: String,
    pub base_url: String,
}

/// Model identifiers and sampling settings
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub rewrite_model: String,
    pub judge_model: String,
    pub temperature: f64,
    pub top_p: f64,
}

/// Embedding backend selection
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingBackend {
    /// OpenAI-compatible `/embeddings` endpoint
    Remote,
    /// Deterministic local feature hashing
    Hashing,
}

/// Embedding configuration for the scoring engine
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub model: String,
    pub base_url: String,
    pub dimensions: usize,
    pub batch_size: usize,
}

/// Input and output file locations
#[derive(Debug, Clone)]
pub struct PathConfig {
    pub sample: PathBuf,
    pub outputs: PathBuf,
    pub judgments: PathBuf,
    pub metrics: PathBuf,
    pub run_config: PathBuf,
    /// Sample loading diagnostics
    pub data_stats: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request and retry configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

/// Experiment runner pacing
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub pacing_ms: u64,
    pub snapshot_every: usize,
}

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let provider = ProviderConfig::from_env()?;

        let models = ModelConfig {
            rewrite_model: env::var("MODEL_REWRITE").unwrap_or_else(|_| "gpt-4.1".to_string()),
            judge_model: env::var("MODEL_JUDGE").unwrap_or_else(|_| "gpt-4.1".to_string()),
            temperature: parse_var("TEMPERATURE", 0.0),
            top_p: parse_var("TOP_P", 1.0),
        };

        let embedding = EmbeddingConfig {
            backend: match env::var("EMBEDDING_BACKEND")
                .unwrap_or_else(|_| "remote".to_string())
                .to_lowercase()
                .as_str()
            {
                "hashing" | "local" => EmbeddingBackend::Hashing,
                _ => EmbeddingBackend::Remote,
            },
            model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            base_url: env::var("EMBEDDING_BASE_URL").unwrap_or_else(|_| provider.base_url.clone()),
            dimensions: parse_var("EMBEDDING_DIM", 384),
            batch_size: parse_var::<usize>("EMBEDDING_BATCH_SIZE", 16).max(1),
        };

        let results_dir =
            PathBuf::from(env::var("RESULTS_DIR").unwrap_or_else(|_| "./results".to_string()));
        let paths = PathConfig::under(&results_dir).with_overrides();

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: parse_var("REQUEST_TIMEOUT_MS", 60_000),
            max_attempts: parse_var::<u32>("MAX_ATTEMPTS", 5).max(1),
            retry_base_delay_ms: parse_var("RETRY_BASE_DELAY_MS", 1_000),
            retry_max_delay_ms: parse_var("RETRY_MAX_DELAY_MS", 20_000),
        };

        let runner = RunnerConfig {
            pacing_ms: parse_var("PACING_MS", 200),
            snapshot_every: parse_var::<usize>("SNAPSHOT_EVERY", 10).max(1),
        };

        Ok(Config {
            provider,
            models,
            embedding,
            paths,
            logging,
            request,
            runner,
        })
    }
}

impl ProviderConfig {
    /// Resolve credentials. `OPENAI_API_KEY` wins over `OPENROUTER_API_KEY`.
    pub fn from_env() -> Result<Self, AppError> {
        if let Some(api_key) = non_empty_var("OPENAI_API_KEY") {
            return Ok(Self {
                provider: Provider::OpenAi,
                api_key,
                base_url: env::var("OPENAI_BASE_URL").unwrap_or_else(|_| OPENAI_BASE_URL.to_string()),
            });
        }

        if let Some(api_key) = non_empty_var("OPENROUTER_API_KEY") {
            return Ok(Self {
                provider: Provider::OpenRouter,
                api_key,
                base_url: env::var("OPENROUTER_BASE_URL")
                    .unwrap_or_else(|_| OPENROUTER_BASE_URL.to_string()),
            });
        }

        Err(AppError::Config {
            message: "Missing OPENAI_API_KEY or OPENROUTER_API_KEY in environment".to_string(),
        })
    }
}

impl PathConfig {
    /// Default layout rooted at a results directory
    pub fn under(results_dir: &Path) -> Self {
        Self {
            sample: results_dir.join("sample.jsonl"),
            outputs: results_dir.join("model_outputs").join("llm_outputs.jsonl"),
            judgments: results_dir.join("metrics").join("judgments.jsonl"),
            metrics: results_dir.join("metrics").join("metrics.json"),
            run_config: results_dir.join("config.json"),
            data_stats: results_dir.join("data_stats.json"),
        }
    }

    fn with_overrides(mut self) -> Self {
        if let Ok(p) = env::var("SAMPLE_PATH") {
            self.sample = PathBuf::from(p);
        }
        if let Ok(p) = env::var("OUTPUTS_PATH") {
            self.outputs = PathBuf::from(p);
        }
        if let Ok(p) = env::var("JUDGMENTS_PATH") {
            self.judgments = PathBuf::from(p);
        }
        if let Ok(p) = env::var("METRICS_PATH") {
            self.metrics = PathBuf::from(p);
        }
        if let Ok(p) = env::var("RUN_CONFIG_PATH") {
            self.run_config = PathBuf::from(p);
        }
        self
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            max_attempts: 5,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 20_000,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 200,
            snapshot_every: 10,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
