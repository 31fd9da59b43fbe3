//! # Rewrite vs. Clarification Evaluation
//!
//! Runs a controlled experiment over conversational follow-up questions and
//! compares four query-rewriting strategies:
//!
//! - **no_rewrite**: the raw question, unchanged
//! - **direct_rewrite**: one model call rewrites the question
//! - **always_clarify**: ask a clarification question, simulate the user's
//!   answer, then rewrite
//! - **gated_clarify**: a decision call picks between the two above
//!
//! Each example costs exactly five model calls. Completed examples are
//! appended to a JSONL run log so an interrupted run resumes cleanly.
//!
//! ## Pipeline
//!
//! ```text
//! sample.jsonl → ExperimentRunner → RewriteProtocol → CompletionClient (HTTP)
//!                      ↓
//!              llm_outputs.jsonl → JudgmentCollector → judgments.jsonl
//!                      ↓
//!              ScoringEngine + stats → metrics.json
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use rewrite_clarify_eval::{Config, CompletionClient, ExperimentRunner, RewriteProtocol, RunStore};
//! use rewrite_clarify_eval::dataset::load_sample;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let (examples, _) = load_sample(&config.paths.sample).await?;
//!     let client = CompletionClient::from_config(&config.provider, &config.request)?;
//!     let protocol = RewriteProtocol::new(client, &config.models);
//!     let runner = ExperimentRunner::new(protocol, RunStore::new(&config.paths.outputs), &config);
//!     let summary = runner.run(&examples).await?;
//!     println!("processed {}", summary.processed);
//!     Ok(())
//! }
//! ```

/// Metric summaries, paired tests and the metrics report.
pub mod analysis;
/// Command-line subcommands.
pub mod cli;
/// Chat completion client with retry and typed replies.
pub mod completion;
/// Configuration loaded from the environment.
pub mod config;
/// Sample loading and data-integrity diagnostics.
pub mod dataset;
/// Error types and result aliases.
pub mod error;
/// LLM-as-judge scoring with a persistent cache.
pub mod judge;
/// Prompt templates for every model call.
pub mod prompts;
/// The four-method rewrite protocol and its data model.
pub mod protocol;
/// Resumable experiment runner.
pub mod runner;
/// Lexical and embedding metrics.
pub mod scoring;
/// Descriptive statistics and the paired t-test.
pub mod stats;
/// Append-only JSONL stores.
pub mod store;

pub use completion::CompletionClient;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use protocol::{Example, Method, Record, RewriteProtocol};
pub use runner::ExperimentRunner;
pub use store::RunStore;
