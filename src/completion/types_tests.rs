//! Unit tests for completion types.
//!
//! Tests request construction, usage accounting, and validation of the
//! typed reply shapes for every call kind.

use super::*;
use crate::error::CompletionError;

// Message tests
#[test]
fn test_message_constructors() {
    let msg = Message::system("You rewrite questions");
    assert_eq!(msg.role, MessageRole::System);
    assert_eq!(msg.content, "You rewrite questions");

    let msg = Message::user("Current question: why?");
    assert_eq!(msg.role, MessageRole::User);
}

#[test]
fn test_assistant_role_is_rejected() {
    let err = serde_json::from_str::<Message>(r#"{"role":"assistant","content":"hi"}"#);
    assert!(err.is_err());
}

#[test]
fn test_message_role_serializes_lowercase() {
    let json = serde_json::to_string(&Message::user("hi")).unwrap();
    assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
}

// CallOptions tests
#[test]
fn test_call_options_builder() {
    let opts = CallOptions::new("gpt-4.1")
        .with_temperature(0.7)
        .with_top_p(0.9)
        .with_max_tokens(200);
    assert_eq!(opts.model, "gpt-4.1");
    assert_eq!(opts.temperature, 0.7);
    assert_eq!(opts.top_p, 0.9);
    assert_eq!(opts.max_tokens, 200);
}

#[test]
fn test_call_options_defaults() {
    let opts = CallOptions::new("m");
    assert_eq!(opts.temperature, 0.0);
    assert_eq!(opts.top_p, 1.0);
    assert_eq!(opts.max_tokens, 512);
}

// ChatRequest tests
#[test]
fn test_chat_request_new() {
    let opts = CallOptions::new("m");
    let req = ChatRequest::new("sys", "usr", &opts).with_json_mode(true);
    assert_eq!(req.messages.len(), 2);
    assert_eq!(req.messages[0], Message::system("sys"));
    assert_eq!(req.messages[1], Message::user("usr"));
    assert!(req.json_mode);
}

// TokenUsage tests
#[test]
fn test_token_usage_add() {
    let a = TokenUsage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    };
    let mut b = TokenUsage {
        prompt_tokens: 1,
        completion_tokens: 2,
        total_tokens: 3,
    };
    b += a;
    assert_eq!(b.prompt_tokens, 11);
    assert_eq!(b.completion_tokens, 7);
    assert_eq!(b.total_tokens, 18);
}

#[test]
fn test_token_usage_missing_fields_default() {
    let usage: TokenUsage = serde_json::from_str(r#"{"prompt_tokens": 4}"#).unwrap();
    assert_eq!(usage.prompt_tokens, 4);
    assert_eq!(usage.total_tokens, 0);
}

// Reply parsing tests
#[test]
fn test_parse_rewrite_reply() {
    let reply: RewriteReply =
        parse_reply(r#"{"rewrite": "What other movies has Christopher Nolan made?"}"#).unwrap();
    assert_eq!(reply.rewrite, "What other movies has Christopher Nolan made?");
}

#[test]
fn test_parse_rewrite_reply_missing_field_is_malformed() {
    let err = parse_reply::<RewriteReply>(r#"{"standalone": "x"}"#).unwrap_err();
    assert!(matches!(err, CompletionError::MalformedResponse { .. }));
}

#[test]
fn test_parse_rewrite_reply_blank_is_malformed() {
    let err = parse_reply::<RewriteReply>(r#"{"rewrite": "   "}"#).unwrap_err();
    assert!(matches!(err, CompletionError::MalformedResponse { .. }));
}

#[test]
fn test_parse_decision_reply() {
    let reply: DecisionReply = parse_reply(
        r#"{"needs_clarification": true, "confidence": 0.72, "rationale": "two referents"}"#,
    )
    .unwrap();
    assert!(reply.needs_clarification);
    assert_eq!(reply.confidence, 0.72);
    assert_eq!(reply.rationale, "two referents");
}

#[test]
fn test_parse_decision_reply_rationale_optional() {
    let reply: DecisionReply =
        parse_reply(r#"{"needs_clarification": false, "confidence": 1.0}"#).unwrap();
    assert!(!reply.needs_clarification);
    assert!(reply.rationale.is_empty());
}

#[test]
fn test_parse_decision_reply_missing_flag_is_malformed() {
    let err = parse_reply::<DecisionReply>(r#"{"confidence": 0.4}"#).unwrap_err();
    assert!(matches!(err, CompletionError::MalformedResponse { .. }));
}

#[test]
fn test_parse_decision_reply_confidence_out_of_range() {
    let err =
        parse_reply::<DecisionReply>(r#"{"needs_clarification": true, "confidence": 85}"#)
            .unwrap_err();
    assert!(err.to_string().contains("confidence"));
}

#[test]
fn test_parse_clarification_and_answer_replies() {
    let q: ClarificationReply =
        parse_reply(r#"{"clarification_question": "Which film do you mean?"}"#).unwrap();
    assert_eq!(q.clarification_question, "Which film do you mean?");

    let a: SimulatedAnswerReply = parse_reply(r#"{"user_answer": "Inception."}"#).unwrap();
    assert_eq!(a.user_answer, "Inception.");
}

#[test]
fn test_parse_judge_reply_bounds() {
    let ok: JudgeReply = parse_reply(r#"{"score": 5, "rationale": "same intent"}"#).unwrap();
    assert_eq!(ok.score, 5);

    assert!(parse_reply::<JudgeReply>(r#"{"score": 0}"#).is_err());
    assert!(parse_reply::<JudgeReply>(r#"{"score": 6}"#).is_err());
    assert!(parse_reply::<JudgeReply>(r#"{"score": "high"}"#).is_err());
}

// extract_json tests
#[test]
fn test_extract_json_raw() {
    assert_eq!(extract_json("  {\"a\": 1}  ").unwrap(), "{\"a\": 1}");
}

#[test]
fn test_extract_json_fenced() {
    let text = "Here you go:\n```json\n{\"rewrite\": \"x\"}\n```";
    assert_eq!(extract_json(text).unwrap(), "{\"rewrite\": \"x\"}");

    let text = "```\n{\"rewrite\": \"y\"}\n```";
    assert_eq!(extract_json(text).unwrap(), "{\"rewrite\": \"y\"}");
}

#[test]
fn test_extract_json_embedded_in_prose() {
    let text = "Sure! {\"rewrite\": \"z\"} Hope that helps.";
    assert_eq!(extract_json(text).unwrap(), "{\"rewrite\": \"z\"}");
}

#[test]
fn test_extract_json_none() {
    assert!(extract_json("no json here").is_err());
}
