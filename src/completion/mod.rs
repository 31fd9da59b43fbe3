//! Chat completion client with typed replies and retry.
//!
//! The transport performs one HTTP exchange; [`CompletionClient`] layers the
//! [`RetryPolicy`] and reply parsing on top of it.

mod client;
mod retry;
mod transport;
mod types;

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

pub use client::CompletionClient;
pub use retry::RetryPolicy;
pub use transport::{ChatTransport, OpenAiTransport};
pub use types::{
    extract_json, parse_reply, CallOptions, ChatRequest, ChatResponse, ClarificationReply,
    Completion, DecisionReply, JudgeReply, Message, MessageRole, RewriteReply,
    SimulatedAnswerReply, StructuredReply, TokenUsage,
};

#[cfg(test)]
pub(crate) use transport::MockChatTransport;
