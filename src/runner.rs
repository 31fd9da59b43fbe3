//! Resumable experiment runner.
//!
//! Processes the sample strictly one example at a time. Examples already in
//! the run store are skipped, so an interrupted run resumes where it stopped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::{Config, ModelConfig, RunnerConfig};
use crate::error::{StoreError, StoreResult};
use crate::protocol::{Example, ExampleId, RewriteProtocol};
use crate::store::RunStore;

/// Log progress every this many sample positions
const PROGRESS_EVERY: usize = 10;

/// Settings a run was produced with, written next to the outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub model_rewrite: String,
    pub model_judge: String,
    pub temperature: f64,
    pub top_p: f64,
    pub sample_size: usize,
    pub completed: usize,
    pub timestamp: DateTime<Utc>,
}

/// An example abandoned during this run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedExample {
    pub example_id: ExampleId,
    pub reason: String,
}

/// Outcome counts for one invocation of the runner
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: Vec<FailedExample>,
}

/// Drives the rewrite protocol over a sample and persists each record
pub struct ExperimentRunner {
    protocol: RewriteProtocol,
    store: RunStore,
    models: ModelConfig,
    settings: RunnerConfig,
    snapshot_path: PathBuf,
    run_id: Uuid,
}

impl ExperimentRunner {
    /// Create a runner from application config
    pub fn new(protocol: RewriteProtocol, store: RunStore, config: &Config) -> Self {
        Self::with_settings(
            protocol,
            store,
            config.models.clone(),
            config.runner.clone(),
            config.paths.run_config.clone(),
        )
    }

    pub fn with_settings(
        protocol: RewriteProtocol,
        store: RunStore,
        models: ModelConfig,
        settings: RunnerConfig,
        snapshot_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            protocol,
            store,
            models,
            settings,
            snapshot_path: snapshot_path.into(),
            run_id: Uuid::new_v4(),
        }
    }

    /// Process every example not yet in the store.
    ///
    /// Per-example model failures are logged and skipped; store failures abort.
    pub async fn run(&self, examples: &[Example]) -> StoreResult<RunSummary> {
        let mut done: HashSet<ExampleId> = self.store.load().await?.into_keys().collect();
        let mut summary = RunSummary::default();
        let pacing = Duration::from_millis(self.settings.pacing_ms);

        info!(
            run_id = %self.run_id,
            sample_size = examples.len(),
            already_done = done.len(),
            "Experiment run starting"
        );

        for (index, example) in examples.iter().enumerate() {
            let example_id = example.id();

            if done.contains(&example_id) {
                summary.skipped += 1;
                continue;
            }

            match self.protocol.run(example).await {
                Ok(record) => {
                    self.store.append(&record).await?;
                    done.insert(example_id);
                    summary.processed += 1;

                    if summary.processed % self.settings.snapshot_every.max(1) == 0 {
                        self.write_snapshot(examples.len(), done.len()).await?;
                    }

                    if !pacing.is_zero() {
                        tokio::time::sleep(pacing).await;
                    }
                }
                Err(e) => {
                    error!(example_id = %example_id, error = %e, "Example abandoned");
                    summary.failed.push(FailedExample {
                        example_id,
                        reason: e.to_string(),
                    });
                }
            }

            if (index + 1) % PROGRESS_EVERY == 0 {
                info!(
                    position = index + 1,
                    total = examples.len(),
                    processed = summary.processed,
                    failed = summary.failed.len(),
                    "Progress"
                );
            }
        }

        self.write_snapshot(examples.len(), done.len()).await?;

        info!(
            run_id = %self.run_id,
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            outputs = %self.store.path().display(),
            "Experiment run finished"
        );

        Ok(summary)
    }

    async fn write_snapshot(&self, sample_size: usize, completed: usize) -> StoreResult<()> {
        let snapshot = RunSnapshot {
            run_id: self.run_id,
            model_rewrite: self.models.rewrite_model.clone(),
            model_judge: self.models.judge_model.clone(),
            temperature: self.models.temperature,
            top_p: self.models.top_p,
            sample_size,
            completed,
            timestamp: Utc::now(),
        };

        write_json(&self.snapshot_path, &snapshot).await
    }
}

/// Pretty-print a JSON document to `path`, creating parent directories
pub(crate) async fn write_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let io_error = |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
    }

    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, json).await.map_err(io_error)
}
