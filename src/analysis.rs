//! Per-method summaries, paired tests and clarification rates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

use crate::error::{EmbeddingResult, StoreResult};
use crate::judge::Judgment;
use crate::protocol::{ExampleId, Method, Record};
use crate::runner::write_json;
use crate::scoring::{MetricRow, MetricScores, ScoringEngine};
use crate::stats::{mean, paired_t_test, population_std, sample_std, PairedTestResult};

/// Baseline side of every paired test
pub const BASELINE: Method = Method::DirectRewrite;
/// Treatment side of every paired test
pub const TREATMENT: Method = Method::GatedClarify;

pub const JUDGE_SCORE: &str = "judge_score";

type MetricFn = fn(&MetricScores) -> f64;

const AUTOMATIC_METRICS: [(&str, MetricFn); 3] = [
    ("lexical_overlap", lexical_of),
    ("lcs_fmeasure", lcs_of),
    ("embedding_cosine", cosine_of),
];

fn lexical_of(s: &MetricScores) -> f64 {
    s.lexical_overlap
}

fn lcs_of(s: &MetricScores) -> f64 {
    s.lcs_fmeasure
}

fn cosine_of(s: &MetricScores) -> f64 {
    s.embedding_cosine
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub std: f64,
}

impl MetricSummary {
    /// Automatic metrics report the sample std
    fn of(values: &[f64]) -> Self {
        Self {
            mean: mean(values),
            std: sample_std(values),
        }
    }

    /// Judge scores report the population std
    fn of_judge(values: &[f64]) -> Self {
        Self {
            mean: mean(values),
            std: population_std(values),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSummary {
    pub n: usize,
    pub lexical_overlap: MetricSummary,
    pub lcs_fmeasure: MetricSummary,
    pub embedding_cosine: MetricSummary,
    /// Absent when no example has a judgment for this method
    pub judge_score: Option<MetricSummary>,
    pub judge_n: usize,
    pub mean_calls: f64,
    pub mean_total_tokens: f64,
}

/// The metrics document written by `analyze`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub n_examples: usize,
    pub judge_model: String,
    pub embedder: String,
    pub summary: BTreeMap<Method, MethodSummary>,
    pub paired_tests: BTreeMap<String, PairedTestResult>,
    pub clarification_rate: BTreeMap<Method, f64>,
    pub timestamp: DateTime<Utc>,
}

/// Share of examples whose output went through clarification, per method.
///
/// The fixed methods are constant by construction; the gated rate is the
/// fraction of gated outputs with `used_clarification` set.
pub fn clarification_rate<'a>(
    records: impl IntoIterator<Item = &'a Record>,
) -> BTreeMap<Method, f64> {
    let gated: Vec<bool> = records
        .into_iter()
        .filter_map(|r| r.output(Method::GatedClarify))
        .map(|o| o.clarified())
        .collect();

    let gated_rate = if gated.is_empty() {
        0.0
    } else {
        gated.iter().filter(|used| **used).count() as f64 / gated.len() as f64
    };

    BTreeMap::from([
        (Method::NoRewrite, 0.0),
        (Method::DirectRewrite, 0.0),
        (Method::AlwaysClarify, 1.0),
        (Method::GatedClarify, gated_rate),
    ])
}

/// Score the records and assemble the full report
pub async fn analyze(
    engine: &ScoringEngine,
    records: &[Record],
    judgments: &[Judgment],
    judge_model: &str,
) -> EmbeddingResult<AnalysisReport> {
    let rows = engine.score_records(records).await?;
    Ok(build_report(
        records,
        &rows,
        judgments,
        judge_model,
        engine.embedder_id(),
    ))
}

/// Assemble the report from precomputed metric rows.
///
/// Only complete records take part; judgments for other examples are ignored.
pub fn build_report(
    records: &[Record],
    rows: &[MetricRow],
    judgments: &[Judgment],
    judge_model: &str,
    embedder: &str,
) -> AnalysisReport {
    let complete: Vec<&Record> = records.iter().filter(|r| r.is_complete()).collect();
    let mut order: Vec<ExampleId> = complete.iter().map(|r| r.example_id.clone()).collect();
    order.sort();
    let included: HashSet<&ExampleId> = order.iter().collect();

    let scores: HashMap<(&ExampleId, Method), &MetricScores> = rows
        .iter()
        .filter(|row| included.contains(&row.example_id))
        .map(|row| ((&row.example_id, row.method), &row.scores))
        .collect();
    let judged: HashMap<(&ExampleId, Method), f64> = judgments
        .iter()
        .filter(|j| included.contains(&j.example_id))
        .map(|j| ((&j.example_id, j.method), f64::from(j.score)))
        .collect();

    let summary = Method::ALL
        .into_iter()
        .map(|method| {
            let method_rows: Vec<&MetricScores> = order
                .iter()
                .filter_map(|id| scores.get(&(id, method)).copied())
                .collect();
            let column = |f: MetricFn| -> Vec<f64> { method_rows.iter().map(|s| f(s)).collect() };
            let judge_values: Vec<f64> = order
                .iter()
                .filter_map(|id| judged.get(&(id, method)).copied())
                .collect();
            let usage: Vec<_> = complete
                .iter()
                .filter_map(|r| r.output(method).map(|o| o.usage))
                .collect();

            let method_summary = MethodSummary {
                n: method_rows.len(),
                lexical_overlap: MetricSummary::of(&column(lexical_of)),
                lcs_fmeasure: MetricSummary::of(&column(lcs_of)),
                embedding_cosine: MetricSummary::of(&column(cosine_of)),
                judge_score: (!judge_values.is_empty()).then(|| MetricSummary::of_judge(&judge_values)),
                judge_n: judge_values.len(),
                mean_calls: mean(&usage.iter().map(|u| f64::from(u.calls)).collect::<Vec<_>>()),
                mean_total_tokens: mean(
                    &usage
                        .iter()
                        .map(|u| f64::from(u.tokens.total_tokens))
                        .collect::<Vec<_>>(),
                ),
            };
            (method, method_summary)
        })
        .collect();

    let mut paired_tests = BTreeMap::new();
    for (name, metric) in AUTOMATIC_METRICS {
        let pairs: Vec<(f64, f64)> = order
            .iter()
            .filter_map(|id| {
                let a = scores.get(&(id, BASELINE))?;
                let b = scores.get(&(id, TREATMENT))?;
                Some((metric(a), metric(b)))
            })
            .collect();
        paired_tests.insert(name.to_string(), paired_t_test(&pairs));
    }

    let judge_pairs: Vec<(f64, f64)> = order
        .iter()
        .filter_map(|id| Some((*judged.get(&(id, BASELINE))?, *judged.get(&(id, TREATMENT))?)))
        .collect();
    paired_tests.insert(JUDGE_SCORE.to_string(), paired_t_test(&judge_pairs));

    AnalysisReport {
        n_examples: order.len(),
        judge_model: judge_model.to_string(),
        embedder: embedder.to_string(),
        summary,
        paired_tests,
        clarification_rate: clarification_rate(complete),
        timestamp: Utc::now(),
    }
}

/// Write the report as pretty-printed JSON
pub async fn write_report(path: &Path, report: &AnalysisReport) -> StoreResult<()> {
    write_json(path, report).await?;
    info!(path = %path.display(), n_examples = report.n_examples, "Metrics written");
    Ok(())
}

/// Plain-text comparison table for the terminal
pub fn render_table(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<16} {:>5} {:>9} {:>9} {:>9} {:>9} {:>9} {:>8}",
        "method", "n", "lexical", "lcs_f", "emb_cos", "judge", "clarify", "calls"
    );

    for (method, s) in &report.summary {
        let judge = s
            .judge_score
            .map(|j| format!("{:.3}", j.mean))
            .unwrap_or_else(|| "-".to_string());
        let rate = report.clarification_rate.get(method).copied().unwrap_or(0.0);
        let _ = writeln!(
            out,
            "{:<16} {:>5} {:>9.3} {:>9.3} {:>9.3} {:>9} {:>9.3} {:>8.2}",
            method.as_str(),
            s.n,
            s.lexical_overlap.mean,
            s.lcs_fmeasure.mean,
            s.embedding_cosine.mean,
            judge,
            rate,
            s.mean_calls,
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} vs {} (paired, n = {})",
        TREATMENT, BASELINE, report.n_examples
    );
    for (metric, test) in &report.paired_tests {
        let fmt_opt = |v: Option<f64>| v.map(|x| format!("{:.4}", x)).unwrap_or_else(|| "n/a".to_string());
        let _ = writeln!(
            out,
            "  {:<18} t = {:>9}  p = {:>8}  d = {:>8.4}  (n = {})",
            metric,
            fmt_opt(test.t_stat),
            fmt_opt(test.p_value),
            test.cohens_d,
            test.n,
        );
    }

    out
}
