//! LLM-as-judge intent-preservation scores with a persistent cache.
//!
//! Judgments are appended to their own log and keyed by example, method,
//! judge model and prompt version. A cached key is never judged twice;
//! entries written under another model or prompt version are ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info};

use crate::completion::{CallOptions, CompletionClient, JudgeReply};
use crate::error::{AppError, AppResult, StoreResult};
use crate::prompts::{format_context, judge_prompt, JUDGE_PROMPT, JUDGE_PROMPT_VERSION};
use crate::protocol::{ExampleId, Method, Record, UsageSummary};
use crate::store::{JsonlLog, Keyed};

const JUDGE_MAX_TOKENS: u32 = 200;

/// Cache identity of a judgment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JudgmentKey {
    pub example_id: ExampleId,
    pub method: Method,
    pub judge_model: String,
    pub prompt_version: String,
}

impl fmt::Display for JudgmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}#{}",
            self.example_id, self.method, self.judge_model, self.prompt_version
        )
    }
}

/// One judge score for one method's rewrite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub example_id: ExampleId,
    pub method: Method,
    pub score: u8,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub usage: UsageSummary,
    #[serde(default)]
    pub judge_model: String,
    #[serde(default)]
    pub prompt_version: String,
    pub timestamp: DateTime<Utc>,
}

impl Keyed for Judgment {
    type Key = JudgmentKey;

    fn key(&self) -> JudgmentKey {
        JudgmentKey {
            example_id: self.example_id.clone(),
            method: self.method,
            judge_model: self.judge_model.clone(),
            prompt_version: self.prompt_version.clone(),
        }
    }
}

/// A judgment that could not be obtained
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedJudgment {
    pub example_id: ExampleId,
    pub method: Method,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JudgeSummary {
    pub judged: usize,
    pub cached: usize,
    pub failed: Vec<FailedJudgment>,
}

/// Load the judgments produced by `judge_model` under the current prompt version
pub async fn load_judgments(
    path: impl Into<PathBuf>,
    judge_model: &str,
) -> StoreResult<Vec<Judgment>> {
    let log: JsonlLog<Judgment> = JsonlLog::new(path);
    let entries = log.load_entries().await?;
    let total = entries.len();

    let current: Vec<Judgment> = entries
        .into_iter()
        .filter(|j| j.judge_model == judge_model && j.prompt_version == JUDGE_PROMPT_VERSION)
        .collect();

    let stale = total - current.len();
    if stale > 0 {
        info!(
            stale,
            judge_model,
            prompt_version = JUDGE_PROMPT_VERSION,
            "Ignoring judgments from another judge model or prompt version"
        );
    }

    Ok(current)
}

/// Obtains and caches judge scores
pub struct JudgmentCollector {
    client: CompletionClient,
    options: CallOptions,
    log: JsonlLog<Judgment>,
    cache: HashMap<JudgmentKey, Judgment>,
}

impl JudgmentCollector {
    /// Open the judgment log, warming the cache from current-version entries
    pub async fn open(
        client: CompletionClient,
        judge_model: &str,
        path: impl Into<PathBuf>,
    ) -> StoreResult<Self> {
        let path = path.into();
        let cache = load_judgments(path.clone(), judge_model)
            .await?
            .into_iter()
            .map(|j| (j.key(), j))
            .collect();

        Ok(Self {
            client,
            options: CallOptions::new(judge_model)
                .with_temperature(0.0)
                .with_max_tokens(JUDGE_MAX_TOKENS),
            log: JsonlLog::new(path),
            cache,
        })
    }

    fn key(&self, example_id: &ExampleId, method: Method) -> JudgmentKey {
        JudgmentKey {
            example_id: example_id.clone(),
            method,
            judge_model: self.options.model.clone(),
            prompt_version: JUDGE_PROMPT_VERSION.to_string(),
        }
    }

    pub fn cached(&self, example_id: &ExampleId, method: Method) -> Option<&Judgment> {
        self.cache.get(&self.key(example_id, method))
    }

    /// Judgments currently held, in no particular order
    pub fn judgments(&self) -> Vec<Judgment> {
        self.cache.values().cloned().collect()
    }

    /// Judge one method's rewrite for a record, using the cache when possible
    pub async fn judge(&mut self, record: &Record, method: Method) -> AppResult<Judgment> {
        if let Some(hit) = self.cached(&record.example_id, method) {
            return Ok(hit.clone());
        }

        let output = record.output(method).ok_or_else(|| AppError::Internal {
            message: format!("record {} has no {} output", record.example_id, method),
        })?;

        let user = judge_prompt(
            &format_context(&record.context),
            &record.question,
            &output.rewrite,
            &record.gold_rewrite,
        );
        let reply = self
            .client
            .request_structured::<JudgeReply>(JUDGE_PROMPT, &user, &self.options)
            .await?;

        let judgment = Judgment {
            example_id: record.example_id.clone(),
            method,
            score: reply.data.score,
            rationale: reply.data.rationale.clone(),
            usage: UsageSummary::from_completion(&reply),
            judge_model: self.options.model.clone(),
            prompt_version: JUDGE_PROMPT_VERSION.to_string(),
            timestamp: Utc::now(),
        };

        self.log.append(&judgment).await?;
        self.cache.insert(judgment.key(), judgment.clone());
        Ok(judgment)
    }

    /// Judge every method of every complete record.
    ///
    /// Model failures are recorded and skipped; store failures abort.
    pub async fn judge_all(&mut self, records: &[Record]) -> StoreResult<JudgeSummary> {
        let mut summary = JudgeSummary::default();

        for record in records.iter().filter(|r| r.is_complete()) {
            for method in Method::ALL {
                if self.cached(&record.example_id, method).is_some() {
                    summary.cached += 1;
                    continue;
                }

                match self.judge(record, method).await {
                    Ok(_) => summary.judged += 1,
                    Err(AppError::Store(e)) => return Err(e),
                    Err(e) => {
                        error!(
                            example_id = %record.example_id,
                            method = %method,
                            error = %e,
                            "Judgment failed"
                        );
                        summary.failed.push(FailedJudgment {
                            example_id: record.example_id.clone(),
                            method,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            judged = summary.judged,
            cached = summary.cached,
            failed = summary.failed.len(),
            path = %self.log.path().display(),
            "Judging finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{ChatResponse, MockChatTransport, RetryPolicy, TokenUsage};
    use crate::protocol::{ClarificationDecision, Example, MethodOutput};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn record(conversation: &str) -> Record {
        let example = Example::new(
            conversation,
            "1",
            vec!["Who directed Inception?".to_string()],
            "What else has he made?",
            "What else has Christopher Nolan made?",
        );
        let decision = ClarificationDecision {
            needs_clarification: false,
            confidence: 0.8,
            rationale: String::new(),
            usage: UsageSummary::default(),
        };
        Method::ALL
            .into_iter()
            .fold(Record::new(&example, decision), |r, m| {
                r.with_output(MethodOutput::new(m, format!("{} rewrite", m)))
            })
    }

    fn scoring_client(times: usize, score: u8) -> CompletionClient {
        let mut mock = MockChatTransport::new();
        mock.expect_chat()
            .withf(|req| req.options.temperature == 0.0 && req.options.model == "judge-m")
            .times(times)
            .returning(move |_| {
                Ok(ChatResponse {
                    content: format!(r#"{{"score": {}, "rationale": "ok"}}"#, score),
                    usage: TokenUsage::default(),
                })
            });
        CompletionClient::new(Arc::new(mock), RetryPolicy::immediate(2))
    }

    #[tokio::test]
    async fn test_judge_all_then_cache_hits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("judgments.jsonl");
        let records = vec![record("1"), record("2")];

        let mut collector = JudgmentCollector::open(scoring_client(8, 4), "judge-m", &path)
            .await
            .unwrap();
        let summary = collector.judge_all(&records).await.unwrap();
        assert_eq!(summary.judged, 8);
        assert_eq!(summary.cached, 0);

        // Reopen with a client that must not be called
        let mut reopened = JudgmentCollector::open(scoring_client(0, 4), "judge-m", &path)
            .await
            .unwrap();
        let summary = reopened.judge_all(&records).await.unwrap();
        assert_eq!(summary.judged, 0);
        assert_eq!(summary.cached, 8);
        assert!(reopened.judgments().iter().all(|j| j.score == 4));
    }

    #[tokio::test]
    async fn test_other_judge_model_is_rejudged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("judgments.jsonl");
        let stale = Judgment {
            example_id: ExampleId::new("1", "1"),
            method: Method::NoRewrite,
            score: 2,
            rationale: String::new(),
            usage: UsageSummary::default(),
            judge_model: "old-judge".to_string(),
            prompt_version: JUDGE_PROMPT_VERSION.to_string(),
            timestamp: Utc::now(),
        };
        JsonlLog::<Judgment>::new(&path).append(&stale).await.unwrap();

        assert!(load_judgments(&path, "judge-m").await.unwrap().is_empty());

        let mut collector = JudgmentCollector::open(scoring_client(1, 5), "judge-m", &path)
            .await
            .unwrap();
        let judgment = collector.judge(&record("1"), Method::NoRewrite).await.unwrap();
        assert_eq!(judgment.score, 5);
        assert_eq!(judgment.prompt_version, JUDGE_PROMPT_VERSION);
    }

    #[tokio::test]
    async fn test_failed_judgment_is_reported_not_fatal() {
        let dir = tempdir().unwrap();
        let mut mock = MockChatTransport::new();
        mock.expect_chat().returning(|_| {
            Ok(ChatResponse {
                content: r#"{"score": 9}"#.to_string(),
                usage: TokenUsage::default(),
            })
        });
        let client = CompletionClient::new(Arc::new(mock), RetryPolicy::immediate(2));

        let mut collector = JudgmentCollector::open(client, "judge-m", dir.path().join("j.jsonl"))
            .await
            .unwrap();
        let summary = collector.judge_all(&[record("1")]).await.unwrap();

        assert_eq!(summary.judged, 0);
        assert_eq!(summary.failed.len(), 4);
        assert!(collector.judgments().is_empty());
    }
}
