use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

use crate::error::{CompletionError, CompletionResult};

/// Message in a chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Per-call sampling options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallOptions {
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

impl CallOptions {
    /// Options for a model with greedy decoding defaults
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.0,
            top_p: 1.0,
            max_tokens: 512,
        }
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set nucleus sampling threshold
    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = top_p;
        self
    }

    /// Set max output tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A single request handed to the transport
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub options: CallOptions,
    /// Ask the provider for a JSON object response
    pub json_mode: bool,
}

impl ChatRequest {
    /// System + user prompt pair
    pub fn new(system: &str, user: &str, options: &CallOptions) -> Self {
        Self {
            messages: vec![Message::system(system), Message::user(user)],
            options: options.clone(),
            json_mode: false,
        }
    }

    /// Enable JSON output mode
    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }
}

/// Raw transport response
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    pub usage: TokenUsage,
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = *self + rhs;
    }
}

/// Parsed output of one successful call
#[derive(Debug, Clone, PartialEq)]
pub struct Completion<T> {
    pub data: T,
    pub usage: TokenUsage,
    pub duration_s: f64,
}

/// A typed reply shape for one kind of call.
///
/// Deserialization enforces presence of required fields; `validate` enforces
/// value constraints. Either failing is a malformed response.
pub trait StructuredReply: DeserializeOwned + Send {
    /// Check value constraints after deserialization
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// `{"rewrite": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteReply {
    pub rewrite: String,
}

impl StructuredReply for RewriteReply {
    fn validate(&self) -> Result<(), String> {
        require_text("rewrite", &self.rewrite)
    }
}

/// `{"needs_clarification": bool, "confidence": 0..1, "rationale": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionReply {
    pub needs_clarification: bool,
    pub confidence: f64,
    #[serde(default)]
    pub rationale: String,
}

impl StructuredReply for DecisionReply {
    fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!(
                "confidence must be within [0, 1], got {}",
                self.confidence
            ));
        }
        Ok(())
    }
}

/// `{"clarification_question": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationReply {
    pub clarification_question: String,
}

impl StructuredReply for ClarificationReply {
    fn validate(&self) -> Result<(), String> {
        require_text("clarification_question", &self.clarification_question)
    }
}

/// `{"user_answer": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedAnswerReply {
    pub user_answer: String,
}

impl StructuredReply for SimulatedAnswerReply {
    fn validate(&self) -> Result<(), String> {
        require_text("user_answer", &self.user_answer)
    }
}

/// `{"score": 1..5, "rationale": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeReply {
    pub score: u8,
    #[serde(default)]
    pub rationale: String,
}

impl StructuredReply for JudgeReply {
    fn validate(&self) -> Result<(), String> {
        if !(1..=5).contains(&self.score) {
            return Err(format!("score must be within 1..=5, got {}", self.score));
        }
        Ok(())
    }
}

fn require_text(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("field `{}` is empty", field))
    } else {
        Ok(())
    }
}

/// Parse and validate a structured reply from raw completion text
pub fn parse_reply<T: StructuredReply>(completion: &str) -> CompletionResult<T> {
    let json = extract_json(completion)
        .map_err(|message| CompletionError::MalformedResponse { message })?;

    let reply: T = serde_json::from_str(json).map_err(|e| CompletionError::MalformedResponse {
        message: format!("Failed to parse reply: {}", e),
    })?;

    reply
        .validate()
        .map_err(|message| CompletionError::MalformedResponse { message })?;

    Ok(reply)
}

/// Extract JSON from a completion string, handling markdown code blocks.
///
/// Attempts extraction in this order:
/// 1. Raw JSON object
/// 2. ```json ... ``` code blocks
/// 3. ``` ... ``` code blocks
/// 4. The outermost `{ ... }` span inside surrounding prose
pub fn extract_json(completion: &str) -> Result<&str, String> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') {
        return Ok(trimmed);
    }

    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty or malformed".to_string());
    }

    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty or malformed".to_string());
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return Ok(&trimmed[start..=end]);
        }
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}
