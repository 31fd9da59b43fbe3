use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::completion::{Completion, TokenUsage};

// ============================================================================
// Identity and input
// ============================================================================

/// Joint conversation/turn identity, rendered as `"{conversation}_{turn}"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExampleId(String);

impl ExampleId {
    /// Assumes neither part contains `_`; QReCC ids are numeric, so
    /// `("1_2", "3")` and `("1", "2_3")` never both occur.
    pub fn new(conversation_id: &str, turn_id: &str) -> Self {
        Self(format!("{}_{}", conversation_id, turn_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExampleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One follow-up question with its conversation history and gold rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub conversation_id: String,
    pub turn_id: String,
    /// Prior utterances, oldest first, alternating user/assistant.
    pub context: Vec<String>,
    pub question: String,
    pub gold_rewrite: String,
}

impl Example {
    pub fn new(
        conversation_id: impl Into<String>,
        turn_id: impl Into<String>,
        context: Vec<String>,
        question: impl Into<String>,
        gold_rewrite: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            turn_id: turn_id.into(),
            context,
            question: question.into(),
            gold_rewrite: gold_rewrite.into(),
        }
    }

    pub fn id(&self) -> ExampleId {
        ExampleId::new(&self.conversation_id, &self.turn_id)
    }
}

// ============================================================================
// Methods and outputs
// ============================================================================

/// The four compared rewrite strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// The question as asked.
    NoRewrite,
    /// A single rewrite call.
    DirectRewrite,
    /// Always ask, simulate the answer, rewrite.
    AlwaysClarify,
    /// Clarify only when the decision call says so.
    GatedClarify,
}

impl Method {
    /// All methods in report order
    pub const ALL: [Method; 4] = [
        Method::NoRewrite,
        Method::DirectRewrite,
        Method::AlwaysClarify,
        Method::GatedClarify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::NoRewrite => "no_rewrite",
            Method::DirectRewrite => "direct_rewrite",
            Method::AlwaysClarify => "always_clarify",
            Method::GatedClarify => "gated_clarify",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "no_rewrite" => Ok(Method::NoRewrite),
            "direct_rewrite" => Ok(Method::DirectRewrite),
            "always_clarify" => Ok(Method::AlwaysClarify),
            "gated_clarify" => Ok(Method::GatedClarify),
            _ => Err(format!("Unknown method: {}", s)),
        }
    }
}

/// Tokens, wall-clock time, and call count consumed by one output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    #[serde(flatten)]
    pub tokens: TokenUsage,
    pub duration_s: f64,
    pub calls: u32,
}

impl UsageSummary {
    pub fn from_completion<T>(completion: &Completion<T>) -> Self {
        Self {
            tokens: completion.usage,
            duration_s: completion.duration_s,
            calls: 1,
        }
    }

    pub fn combine(self, other: UsageSummary) -> Self {
        Self {
            tokens: self.tokens + other.tokens,
            duration_s: self.duration_s + other.duration_s,
            calls: self.calls + other.calls,
        }
    }
}

/// Result of one method on one example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodOutput {
    pub method: Method,
    pub rewrite: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification_question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification_answer: Option<String>,
    /// Set for the clarifying methods only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_clarification: Option<bool>,
    #[serde(default)]
    pub usage: UsageSummary,
}

impl MethodOutput {
    pub fn new(method: Method, rewrite: impl Into<String>) -> Self {
        Self {
            method,
            rewrite: rewrite.into(),
            clarification_question: None,
            clarification_answer: None,
            used_clarification: None,
            usage: UsageSummary::default(),
        }
    }

    pub fn with_clarification(
        mut self,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        self.clarification_question = Some(question.into());
        self.clarification_answer = Some(answer.into());
        self
    }

    pub fn with_used_clarification(mut self, used: bool) -> Self {
        self.used_clarification = Some(used);
        self
    }

    pub fn with_usage(mut self, usage: UsageSummary) -> Self {
        self.usage = usage;
        self
    }

    /// Whether this output went through a clarification exchange
    pub fn clarified(&self) -> bool {
        self.used_clarification.unwrap_or(false)
    }
}

/// Outcome of the clarification decision call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationDecision {
    pub needs_clarification: bool,
    pub confidence: f64,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub usage: UsageSummary,
}

// ============================================================================
// Record
// ============================================================================

/// One example's complete experiment result. Persisted once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub example_id: ExampleId,
    pub conversation_id: String,
    pub turn_id: String,
    pub context: Vec<String>,
    pub question: String,
    pub gold_rewrite: String,
    pub decision: ClarificationDecision,
    pub outputs: BTreeMap<Method, MethodOutput>,
    pub timestamp: DateTime<Utc>,
}

impl Record {
    /// Start a record for an example; outputs are added by the protocol
    pub fn new(example: &Example, decision: ClarificationDecision) -> Self {
        Self {
            example_id: example.id(),
            conversation_id: example.conversation_id.clone(),
            turn_id: example.turn_id.clone(),
            context: example.context.clone(),
            question: example.question.clone(),
            gold_rewrite: example.gold_rewrite.clone(),
            decision,
            outputs: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_output(mut self, output: MethodOutput) -> Self {
        self.outputs.insert(output.method, output);
        self
    }

    pub fn output(&self, method: Method) -> Option<&MethodOutput> {
        self.outputs.get(&method)
    }

    pub fn missing_methods(&self) -> Vec<Method> {
        Method::ALL
            .into_iter()
            .filter(|m| !self.outputs.contains_key(m))
            .collect()
    }

    /// All four methods present
    pub fn is_complete(&self) -> bool {
        self.missing_methods().is_empty()
    }
}
