//! Append-only persistence for experiment records and judgments.
//!
//! Both logs are newline-delimited JSON. The run store is the resumption point
//! for the experiment runner: any example already present is never reprocessed.

mod jsonl;

pub use jsonl::{JsonlLog, Keyed};

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{StoreError, StoreResult};
use crate::protocol::{ExampleId, Record};

impl Keyed for Record {
    type Key = ExampleId;

    fn key(&self) -> ExampleId {
        self.example_id.clone()
    }
}

/// Log of completed experiment records keyed by example identity.
#[derive(Debug, Clone)]
pub struct RunStore {
    log: JsonlLog<Record>,
}

impl RunStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            log: JsonlLog::new(path),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        self.log.path()
    }

    /// Replay the log into an identity → record mapping
    pub async fn load(&self) -> StoreResult<HashMap<ExampleId, Record>> {
        self.log.load().await
    }

    /// Records in the order they were completed
    pub async fn records(&self) -> StoreResult<Vec<Record>> {
        self.log.load_entries().await
    }

    /// Persist a record. Incomplete records are rejected.
    pub async fn append(&self, record: &Record) -> StoreResult<()> {
        let missing = record.missing_methods();
        if !missing.is_empty() {
            return Err(StoreError::IncompleteRecord {
                example_id: record.example_id.to_string(),
                missing: missing
                    .iter()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        self.log.append(record).await
    }
}
