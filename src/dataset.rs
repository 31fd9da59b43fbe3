//! Sample loading with data-integrity diagnostics.
//!
//! The sample is newline-delimited JSON using the QReCC field names
//! (`Conversation_no`, `Turn_no`, `Context`, `Question`, `Rewrite`); snake-case
//! names are accepted too. Invalid lines are excluded and reported, never fatal.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{DataIntegrityError, StoreError, StoreResult};
use crate::protocol::Example;
use crate::runner::write_json;

/// What happened to each line of the sample
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SampleDiagnostics {
    pub total_lines: usize,
    pub loaded: usize,
    pub duplicates: usize,
    pub excluded: Vec<DataIntegrityError>,
}

#[derive(Debug, Deserialize)]
struct RawSample {
    #[serde(default, alias = "Conversation_no", alias = "conversation_no")]
    conversation_id: Option<Value>,
    #[serde(default, alias = "Turn_no", alias = "turn_no")]
    turn_id: Option<Value>,
    #[serde(default, alias = "Context")]
    context: Option<Vec<String>>,
    #[serde(default, alias = "Question")]
    question: Option<String>,
    #[serde(default, alias = "Rewrite", alias = "gold_rewrite")]
    rewrite: Option<String>,
}

/// Parse sample content, keeping the first occurrence of each identity
pub fn parse_sample(content: &str) -> (Vec<Example>, SampleDiagnostics) {
    let mut examples = Vec::new();
    let mut diagnostics = SampleDiagnostics::default();
    let mut seen = HashSet::new();

    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        diagnostics.total_lines += 1;
        let line_no = index + 1;

        match parse_line(line, line_no) {
            Ok(example) => {
                if seen.insert(example.id()) {
                    examples.push(example);
                } else {
                    diagnostics.duplicates += 1;
                }
            }
            Err(e) => {
                warn!(line = line_no, reason = %e.reason, "Excluding sample line");
                diagnostics.excluded.push(e);
            }
        }
    }

    diagnostics.loaded = examples.len();
    (examples, diagnostics)
}

/// Read and parse a sample file
pub async fn load_sample(path: &Path) -> StoreResult<(Vec<Example>, SampleDiagnostics)> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;

    let (examples, diagnostics) = parse_sample(&content);
    info!(
        path = %path.display(),
        loaded = diagnostics.loaded,
        excluded = diagnostics.excluded.len(),
        duplicates = diagnostics.duplicates,
        "Sample loaded"
    );
    Ok((examples, diagnostics))
}

/// Persist the diagnostics of a sample load as pretty JSON
pub async fn write_diagnostics(path: &Path, diagnostics: &SampleDiagnostics) -> StoreResult<()> {
    write_json(path, diagnostics).await?;
    debug!(path = %path.display(), "Sample diagnostics written");
    Ok(())
}

fn parse_line(line: &str, line_no: usize) -> Result<Example, DataIntegrityError> {
    let fail = |reason: String| DataIntegrityError {
        line: line_no,
        reason,
    };

    let raw: RawSample =
        serde_json::from_str(line).map_err(|e| fail(format!("invalid JSON: {}", e)))?;

    let conversation_id = id_part(raw.conversation_id)
        .ok_or_else(|| fail("missing conversation identifier".to_string()))?;
    let turn_id =
        id_part(raw.turn_id).ok_or_else(|| fail("missing turn identifier".to_string()))?;
    let question = non_blank(raw.question).ok_or_else(|| fail("missing Question".to_string()))?;
    let rewrite = non_blank(raw.rewrite).ok_or_else(|| fail("missing Rewrite".to_string()))?;

    Ok(Example::new(
        conversation_id,
        turn_id,
        raw.context.unwrap_or_default(),
        question,
        rewrite,
    ))
}

fn id_part(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
