//! Centralized prompt definitions for the rewrite protocol and the judge.
//!
//! System prompts are constants; user prompts are built by the functions at the
//! bottom of this module so the exact wording lives in one place.

/// Bump when any judge wording changes; judgments are keyed on it.
pub const JUDGE_PROMPT_VERSION: &str = "intent-v1";

/// System prompt for the direct rewrite call.
pub const REWRITE_PROMPT: &str = r#"You rewrite a conversational user question into a standalone question.
Preserve the user's intent and include any context needed to understand it without the conversation.

Your response MUST be valid JSON in this exact format:
{
  "rewrite": "the standalone question"
}

Always respond with valid JSON only, no other text."#;

/// System prompt for the clarification decision call.
pub const DECIDE_PROMPT: &str = r#"You decide whether a clarification question is needed to preserve the user's intent.
If the question has multiple plausible referents or is missing information, ask for clarification.

Your response MUST be valid JSON in this exact format:
{
  "needs_clarification": true,
  "confidence": 0.8,
  "rationale": "short reason"
}

Guidelines:
- needs_clarification is a boolean
- confidence should be between 0.0 and 1.0
- keep the rationale to one sentence

Always respond with valid JSON only, no other text."#;

/// System prompt for generating the clarification question.
pub const CLARIFY_PROMPT: &str = r#"You ask a single concise clarification question that resolves the ambiguity in the user's question.
Be brief and avoid extra commentary.

Your response MUST be valid JSON in this exact format:
{
  "clarification_question": "your question"
}

Always respond with valid JSON only, no other text."#;

/// System prompt for the simulated user answering the clarification.
pub const ANSWER_PROMPT: &str = r#"You are the user. Answer the clarification question concisely, based on the conversation and your true intent.

Your response MUST be valid JSON in this exact format:
{
  "user_answer": "your answer"
}

Always respond with valid JSON only, no other text."#;

/// System prompt for rewriting after a clarification exchange.
pub const REWRITE_WITH_ANSWER_PROMPT: &str = r#"You rewrite the user's question into a standalone question, using the clarification answer to resolve ambiguity.

Your response MUST be valid JSON in this exact format:
{
  "rewrite": "the standalone question"
}

Always respond with valid JSON only, no other text."#;

/// System prompt for the intent-preservation judge.
pub const JUDGE_PROMPT: &str = r#"You evaluate whether a rewritten question preserves the user's intent.
Score from 1 (intent changed) to 5 (intent fully preserved).
A reference rewrite is provided for orientation only; do not reward or penalize wording that differs from it.

Your response MUST be valid JSON in this exact format:
{
  "score": 4,
  "rationale": "short reason"
}

Guidelines:
- score is an integer from 1 to 5
- keep the rationale to one sentence

Always respond with valid JSON only, no other text."#;

/// Render prior turns as alternating `User:` / `Assistant:` lines.
pub fn format_context(context: &[String]) -> String {
    if context.is_empty() {
        return "(no prior context)".to_string();
    }

    context
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let role = if i % 2 == 0 { "User" } else { "Assistant" };
            format!("{}: {}", role, text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// User prompt shared by the direct rewrite, decision, and clarification calls
pub fn question_prompt(context: &str, question: &str) -> String {
    format!("Conversation:\n{}\n\nCurrent question: {}", context, question)
}

/// User prompt for the simulated answer. Only this call sees the gold rewrite.
pub fn answer_prompt(context: &str, gold: &str, clarification_question: &str) -> String {
    format!(
        "Conversation:\n{}\n\nYour true intent: {}\n\nClarification question: {}",
        context, gold, clarification_question
    )
}

/// User prompt for the rewrite conditioned on the clarification exchange
pub fn rewrite_with_answer_prompt(
    context: &str,
    question: &str,
    clarification_question: &str,
    answer: &str,
) -> String {
    format!(
        "Conversation:\n{}\n\nCurrent question: {}\n\nClarification question: {}\n\nUser answer: {}",
        context, question, clarification_question, answer
    )
}

/// User prompt for judging one candidate rewrite
pub fn judge_prompt(context: &str, question: &str, candidate: &str, gold: &str) -> String {
    format!(
        "Conversation:\n{}\n\nCurrent question: {}\n\nCandidate rewrite: {}\n\nReference rewrite (for orientation only): {}",
        context, question, candidate, gold
    )
}
