//! Command-line surface: run, judge, analyze, or all three in order.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use crate::analysis::{analyze, render_table, write_report, AnalysisReport};
use crate::completion::CompletionClient;
use crate::config::Config;
use crate::dataset::{load_sample, write_diagnostics};
use crate::error::AppResult;
use crate::judge::{load_judgments, JudgeSummary, JudgmentCollector};
use crate::protocol::RewriteProtocol;
use crate::runner::{ExperimentRunner, RunSummary};
use crate::scoring::{build_embedder, ScoringEngine};
use crate::store::RunStore;

/// Rewrite-vs-clarification experiment runner and metrics pipeline
#[derive(Parser, Debug)]
#[command(name = "rewrite-clarify-eval", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the four-method protocol over the sample, resuming where it stopped
    Run {
        /// Sample file (defaults to SAMPLE_PATH)
        #[arg(long)]
        sample: Option<PathBuf>,

        /// Process at most this many sample examples
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Collect judge scores for every recorded output
    Judge,

    /// Score outputs, run the paired tests and write metrics
    Analyze {
        /// Use only judgments already on disk
        #[arg(long)]
        skip_judge: bool,
    },

    /// Run, judge and analyze
    All,
}

/// Execute a parsed command
pub async fn execute(command: Command, config: &Config) -> AppResult<()> {
    match command {
        Command::Run { sample, limit } => {
            run_experiment(config, sample, limit).await?;
        }
        Command::Judge => {
            judge_outputs(config).await?;
        }
        Command::Analyze { skip_judge } => {
            analyze_outputs(config, skip_judge).await?;
        }
        Command::All => {
            run_experiment(config, None, None).await?;
            analyze_outputs(config, false).await?;
        }
    }
    Ok(())
}

async fn run_experiment(
    config: &Config,
    sample: Option<PathBuf>,
    limit: Option<usize>,
) -> AppResult<RunSummary> {
    let sample_path = sample.unwrap_or_else(|| config.paths.sample.clone());
    let (mut examples, diagnostics) = load_sample(&sample_path).await?;
    write_diagnostics(&config.paths.data_stats, &diagnostics).await?;
    if let Some(limit) = limit {
        examples.truncate(limit);
    }

    let client = CompletionClient::from_config(&config.provider, &config.request)?;
    info!(
        provider = config.provider.provider.as_str(),
        base_url = %config.provider.base_url,
        model = %config.models.rewrite_model,
        "Completion client initialized"
    );

    let protocol = RewriteProtocol::new(client, &config.models);
    let store = RunStore::new(&config.paths.outputs);
    let runner = ExperimentRunner::new(protocol, store, config);

    Ok(runner.run(&examples).await?)
}

async fn judge_outputs(config: &Config) -> AppResult<JudgeSummary> {
    let records = RunStore::new(&config.paths.outputs).records().await?;
    let client = CompletionClient::from_config(&config.provider, &config.request)?;
    let mut collector =
        JudgmentCollector::open(client, &config.models.judge_model, &config.paths.judgments)
            .await?;

    Ok(collector.judge_all(&records).await?)
}

async fn analyze_outputs(config: &Config, skip_judge: bool) -> AppResult<AnalysisReport> {
    if !skip_judge {
        judge_outputs(config).await?;
    }

    let records = RunStore::new(&config.paths.outputs).records().await?;
    let judgments = load_judgments(&config.paths.judgments, &config.models.judge_model).await?;

    let embedder = build_embedder(&config.embedding, &config.provider, &config.request)?;
    let engine = ScoringEngine::new(embedder);
    let report = analyze(&engine, &records, &judgments, &config.models.judge_model).await?;

    write_report(&config.paths.metrics, &report).await?;
    println!("{}", render_table(&report));

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_options() {
        let cli = Cli::try_parse_from([
            "rewrite-clarify-eval",
            "run",
            "--sample",
            "data/sample.jsonl",
            "--limit",
            "25",
        ])
        .unwrap();

        assert_eq!(
            cli.command,
            Command::Run {
                sample: Some(PathBuf::from("data/sample.jsonl")),
                limit: Some(25),
            }
        );
    }

    #[test]
    fn test_parse_analyze_skip_judge() {
        let cli = Cli::try_parse_from(["rewrite-clarify-eval", "analyze", "--skip-judge"]).unwrap();
        assert_eq!(cli.command, Command::Analyze { skip_judge: true });

        let cli = Cli::try_parse_from(["rewrite-clarify-eval", "all"]).unwrap();
        assert_eq!(cli.command, Command::All);
    }

    #[test]
    fn test_unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["rewrite-clarify-eval", "plot"]).is_err());
    }
}
