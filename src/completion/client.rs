use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::retry::RetryPolicy;
use super::transport::{ChatTransport, OpenAiTransport};
use super::types::{parse_reply, CallOptions, ChatRequest, ChatResponse, Completion, StructuredReply};
use crate::config::{ProviderConfig, RequestConfig};
use crate::error::{CompletionError, CompletionResult};

/// Client that sends prompts to a chat model and retries transient failures
#[derive(Clone)]
pub struct CompletionClient {
    transport: Arc<dyn ChatTransport>,
    retry: RetryPolicy,
}

impl CompletionClient {
    /// Create a client over an arbitrary transport
    pub fn new(transport: Arc<dyn ChatTransport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    /// Create a client for the configured OpenAI-compatible provider
    pub fn from_config(
        provider: &ProviderConfig,
        request: &RequestConfig,
    ) -> CompletionResult<Self> {
        let transport = OpenAiTransport::new(provider, request)?;
        Ok(Self::new(
            Arc::new(transport),
            RetryPolicy::from_config(request),
        ))
    }

    /// The retry policy in effect
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Send a prompt and parse the reply into `T`.
    ///
    /// Parse and validation failures count as transient and consume an attempt.
    pub async fn request_structured<T: StructuredReply>(
        &self,
        system: &str,
        user: &str,
        options: &CallOptions,
    ) -> CompletionResult<Completion<T>> {
        let request = ChatRequest::new(system, user, options).with_json_mode(true);
        self.execute(&request, |response| parse_reply::<T>(&response.content))
            .await
    }

    /// Send a prompt and return the raw reply text
    pub async fn request_text(
        &self,
        system: &str,
        user: &str,
        options: &CallOptions,
    ) -> CompletionResult<Completion<String>> {
        let request = ChatRequest::new(system, user, options);
        self.execute(&request, |response| Ok(response.content.clone()))
            .await
    }

    async fn execute<T, F>(&self, request: &ChatRequest, parse: F) -> CompletionResult<Completion<T>>
    where
        F: Fn(&ChatResponse) -> CompletionResult<T>,
    {
        let model = &request.options.model;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let start = Instant::now();

            let outcome = match self.transport.chat(request).await {
                Ok(response) => parse(&response).map(|data| (data, response.usage)),
                Err(e) => Err(e),
            };

            match outcome {
                Ok((data, usage)) => {
                    let duration_s = start.elapsed().as_secs_f64();
                    info!(
                        model = %model,
                        attempt,
                        latency_ms = (duration_s * 1000.0) as u64,
                        total_tokens = usage.total_tokens,
                        "Model call succeeded"
                    );
                    return Ok(Completion {
                        data,
                        usage,
                        duration_s,
                    });
                }
                Err(e) if !e.is_transient() => {
                    warn!(model = %model, attempt, error = %e, "Model call failed permanently");
                    return Err(e);
                }
                Err(e) => {
                    if !self.retry.should_retry(attempt) {
                        warn!(model = %model, attempt, error = %e, "Retry budget exhausted");
                        return Err(CompletionError::TransientCallExhausted {
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }

                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        model = %model,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying model call"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::transport::MockChatTransport;
    use crate::completion::types::{RewriteReply, TokenUsage};

    fn ok_response(content: &str) -> ChatResponse {
        ChatResponse {
            content: content.to_string(),
            usage: TokenUsage {
                prompt_tokens: 12,
                completion_tokens: 8,
                total_tokens: 20,
            },
        }
    }

    fn client(mock: MockChatTransport, attempts: u32) -> CompletionClient {
        CompletionClient::new(Arc::new(mock), RetryPolicy::immediate(attempts))
    }

    #[tokio::test]
    async fn test_structured_request_parses_reply() {
        let mut mock = MockChatTransport::new();
        mock.expect_chat()
            .withf(|req| req.json_mode && req.options.model == "gpt-4.1")
            .times(1)
            .returning(|_| Ok(ok_response(r#"{"rewrite": "Standalone?"}"#)));

        let completion = client(mock, 5)
            .request_structured::<RewriteReply>("sys", "usr", &CallOptions::new("gpt-4.1"))
            .await
            .unwrap();

        assert_eq!(completion.data.rewrite, "Standalone?");
        assert_eq!(completion.usage.total_tokens, 20);
        assert!(completion.duration_s >= 0.0);
    }

    #[tokio::test]
    async fn test_malformed_reply_is_retried_then_succeeds() {
        let mut mock = MockChatTransport::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_chat()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ok_response("not json at all")));
        mock.expect_chat()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ok_response(r#"{"rewrite": "third time"}"#)));

        let completion = client(mock, 5)
            .request_structured::<RewriteReply>("s", "u", &CallOptions::new("m"))
            .await
            .unwrap();
        assert_eq!(completion.data.rewrite, "third time");
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_transient_call_exhausted() {
        let mut mock = MockChatTransport::new();
        mock.expect_chat().times(3).returning(|_| {
            Err(CompletionError::Api {
                status: 429,
                message: "rate limited".to_string(),
            })
        });

        let err = client(mock, 3)
            .request_structured::<RewriteReply>("s", "u", &CallOptions::new("m"))
            .await
            .unwrap_err();

        match err {
            CompletionError::TransientCallExhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("429"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let mut mock = MockChatTransport::new();
        mock.expect_chat().times(1).returning(|_| {
            Err(CompletionError::Api {
                status: 401,
                message: "invalid key".to_string(),
            })
        });

        let err = client(mock, 5)
            .request_text("s", "u", &CallOptions::new("m"))
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_text_request_returns_raw_content() {
        let mut mock = MockChatTransport::new();
        mock.expect_chat()
            .withf(|req| !req.json_mode)
            .times(1)
            .returning(|_| Ok(ok_response("plain words")));

        let completion = client(mock, 1)
            .request_text("s", "u", &CallOptions::new("m"))
            .await
            .unwrap();
        assert_eq!(completion.data, "plain words");
    }
}
