use tracing::debug;

use super::types::{
    ClarificationDecision, Example, Method, MethodOutput, Record, UsageSummary,
};
use crate::completion::{
    CallOptions, ClarificationReply, CompletionClient, DecisionReply, RewriteReply,
    SimulatedAnswerReply,
};
use crate::config::ModelConfig;
use crate::error::CompletionResult;
use crate::prompts::{
    answer_prompt, format_context, question_prompt, rewrite_with_answer_prompt, ANSWER_PROMPT,
    CLARIFY_PROMPT, DECIDE_PROMPT, REWRITE_PROMPT, REWRITE_WITH_ANSWER_PROMPT,
};

/// Output length cap for every protocol call
const PROTOCOL_MAX_TOKENS: u32 = 200;

/// Model calls issued per example, independent of the decision
pub const CALLS_PER_EXAMPLE: u32 = 5;

/// Produces all four method outputs for one example.
///
/// The always-clarify chain runs even when the decision says no, so the
/// always and gated methods share identical clarification turns.
#[derive(Clone)]
pub struct RewriteProtocol {
    client: CompletionClient,
    rewrite_options: CallOptions,
    decision_options: CallOptions,
}

impl RewriteProtocol {
    /// Create a protocol using the rewrite model settings
    pub fn new(client: CompletionClient, models: &ModelConfig) -> Self {
        let rewrite_options = CallOptions::new(&models.rewrite_model)
            .with_temperature(models.temperature)
            .with_top_p(models.top_p)
            .with_max_tokens(PROTOCOL_MAX_TOKENS);
        // The decision is always greedy regardless of the rewrite temperature
        let decision_options = CallOptions::new(&models.rewrite_model)
            .with_temperature(0.0)
            .with_top_p(models.top_p)
            .with_max_tokens(PROTOCOL_MAX_TOKENS);

        Self::with_options(client, rewrite_options, decision_options)
    }

    pub fn with_options(
        client: CompletionClient,
        rewrite_options: CallOptions,
        decision_options: CallOptions,
    ) -> Self {
        Self {
            client,
            rewrite_options,
            decision_options,
        }
    }

    /// Run the five-call protocol. Any failed call abandons the example.
    pub async fn run(&self, example: &Example) -> CompletionResult<Record> {
        let example_id = example.id();
        let context = format_context(&example.context);
        let user = question_prompt(&context, &example.question);

        // 1. Direct rewrite
        let direct = self
            .client
            .request_structured::<RewriteReply>(REWRITE_PROMPT, &user, &self.rewrite_options)
            .await?;
        let direct_output = MethodOutput::new(Method::DirectRewrite, direct.data.rewrite.clone())
            .with_usage(UsageSummary::from_completion(&direct));

        // 2. Clarification decision (no gold)
        let decided = self
            .client
            .request_structured::<DecisionReply>(DECIDE_PROMPT, &user, &self.decision_options)
            .await?;
        let decision = ClarificationDecision {
            needs_clarification: decided.data.needs_clarification,
            confidence: decided.data.confidence,
            rationale: decided.data.rationale.clone(),
            usage: UsageSummary::from_completion(&decided),
        };
        debug!(
            example_id = %example_id,
            needs_clarification = decision.needs_clarification,
            confidence = decision.confidence,
            "Clarification decision"
        );

        // 3. Always-clarify chain: question, simulated answer, final rewrite
        let clarify = self
            .client
            .request_structured::<ClarificationReply>(CLARIFY_PROMPT, &user, &self.rewrite_options)
            .await?;
        let clarification_question = clarify.data.clarification_question.clone();

        let answer = self
            .client
            .request_structured::<SimulatedAnswerReply>(
                ANSWER_PROMPT,
                &answer_prompt(&context, &example.gold_rewrite, &clarification_question),
                &self.rewrite_options,
            )
            .await?;
        let clarification_answer = answer.data.user_answer.clone();

        let final_rewrite = self
            .client
            .request_structured::<RewriteReply>(
                REWRITE_WITH_ANSWER_PROMPT,
                &rewrite_with_answer_prompt(
                    &context,
                    &example.question,
                    &clarification_question,
                    &clarification_answer,
                ),
                &self.rewrite_options,
            )
            .await?;

        let always_output = MethodOutput::new(Method::AlwaysClarify, final_rewrite.data.rewrite.clone())
            .with_clarification(clarification_question, clarification_answer)
            .with_used_clarification(true)
            .with_usage(
                UsageSummary::from_completion(&clarify)
                    .combine(UsageSummary::from_completion(&answer))
                    .combine(UsageSummary::from_completion(&final_rewrite)),
            );

        // 4. Gated derivation, 5. baseline
        let gated_output = derive_gated(&decision, &direct_output, &always_output);
        let baseline = MethodOutput::new(Method::NoRewrite, example.question.clone());

        Ok(Record::new(example, decision)
            .with_output(baseline)
            .with_output(direct_output)
            .with_output(always_output)
            .with_output(gated_output))
    }
}

/// Pick the gated output from already-computed branches without further calls.
///
/// Usage charges the decision call plus whichever branch was taken.
pub fn derive_gated(
    decision: &ClarificationDecision,
    direct: &MethodOutput,
    always: &MethodOutput,
) -> MethodOutput {
    let branch = if decision.needs_clarification {
        always
    } else {
        direct
    };

    let mut gated = MethodOutput::new(Method::GatedClarify, branch.rewrite.clone())
        .with_used_clarification(decision.needs_clarification)
        .with_usage(decision.usage.combine(branch.usage));

    if decision.needs_clarification {
        gated.clarification_question = always.clarification_question.clone();
        gated.clarification_answer = always.clarification_answer.clone();
    }

    gated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{ChatRequest, ChatResponse, MockChatTransport, RetryPolicy, TokenUsage};
    use crate::error::CompletionError;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const GOLD: &str = "What other movies has Christopher Nolan made?";

    fn nolan() -> Example {
        Example::new(
            "1",
            "2",
            vec!["Who directed Inception?".to_string(), "Christopher Nolan.".to_string()],
            "What other movies has he made?",
            GOLD,
        )
    }

    fn reply(request: &ChatRequest, needs_clarification: bool) -> ChatResponse {
        let system = request.messages[0].content.as_str();
        let content = if system == REWRITE_PROMPT {
            r#"{"rewrite": "What other movies has Christopher Nolan made?"}"#.to_string()
        } else if system == DECIDE_PROMPT {
            format!(
                r#"{{"needs_clarification": {}, "confidence": 0.8, "rationale": "r"}}"#,
                needs_clarification
            )
        } else if system == CLARIFY_PROMPT {
            r#"{"clarification_question": "Do you mean Christopher Nolan?"}"#.to_string()
        } else if system == ANSWER_PROMPT {
            r#"{"user_answer": "Yes, Christopher Nolan."}"#.to_string()
        } else {
            r#"{"rewrite": "Which other films did Christopher Nolan direct?"}"#.to_string()
        };
        ChatResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
        }
    }

    fn protocol(mock: MockChatTransport) -> RewriteProtocol {
        let client = CompletionClient::new(Arc::new(mock), RetryPolicy::immediate(1));
        let models = ModelConfig {
            rewrite_model: "rewrite-model".to_string(),
            judge_model: "judge-model".to_string(),
            temperature: 0.7,
            top_p: 1.0,
        };
        RewriteProtocol::new(client, &models)
    }

    #[tokio::test]
    async fn test_exactly_five_calls_when_no_clarification_needed() {
        let mut mock = MockChatTransport::new();
        mock.expect_chat()
            .times(CALLS_PER_EXAMPLE as usize)
            .returning(|req| Ok(reply(req, false)));

        let record = protocol(mock).run(&nolan()).await.unwrap();
        assert!(record.is_complete());
        assert!(!record.decision.needs_clarification);
    }

    #[tokio::test]
    async fn test_gated_equals_direct_when_decision_false() {
        let mut mock = MockChatTransport::new();
        mock.expect_chat()
            .times(5)
            .returning(|req| Ok(reply(req, false)));

        let record = protocol(mock).run(&nolan()).await.unwrap();
        let direct = record.output(Method::DirectRewrite).unwrap();
        let gated = record.output(Method::GatedClarify).unwrap();

        assert_eq!(gated.rewrite, direct.rewrite);
        assert_eq!(gated.used_clarification, Some(false));
        assert!(gated.clarification_question.is_none());
        // The always chain still ran
        let always = record.output(Method::AlwaysClarify).unwrap();
        assert_eq!(always.usage.calls, 3);
        assert_eq!(gated.usage.calls, 2);
    }

    #[tokio::test]
    async fn test_gated_equals_always_when_decision_true() {
        let mut mock = MockChatTransport::new();
        mock.expect_chat()
            .times(5)
            .returning(|req| Ok(reply(req, true)));

        let record = protocol(mock).run(&nolan()).await.unwrap();
        let always = record.output(Method::AlwaysClarify).unwrap();
        let gated = record.output(Method::GatedClarify).unwrap();

        assert_eq!(gated.rewrite, always.rewrite);
        assert_eq!(gated.clarification_question, always.clarification_question);
        assert_eq!(gated.clarification_answer, always.clarification_answer);
        assert_eq!(gated.used_clarification, Some(true));
        assert_eq!(gated.usage.calls, 4);
    }

    #[tokio::test]
    async fn test_no_rewrite_is_question_unchanged() {
        let mut mock = MockChatTransport::new();
        mock.expect_chat().returning(|req| Ok(reply(req, false)));

        let record = protocol(mock).run(&nolan()).await.unwrap();
        let baseline = record.output(Method::NoRewrite).unwrap();
        assert_eq!(baseline.rewrite, "What other movies has he made?");
        assert_eq!(baseline.usage.calls, 0);
    }

    #[tokio::test]
    async fn test_gold_only_reaches_simulated_answer_call() {
        let mut mock = MockChatTransport::new();
        mock.expect_chat().returning(|req| {
            let system = req.messages[0].content.as_str();
            let sees_gold = req.messages[1].content.contains(GOLD);
            assert_eq!(sees_gold, system == ANSWER_PROMPT, "gold leaked to {system}");
            Ok(reply(req, true))
        });

        protocol(mock).run(&nolan()).await.unwrap();
    }

    #[tokio::test]
    async fn test_decision_call_is_greedy() {
        let mut mock = MockChatTransport::new();
        mock.expect_chat().returning(|req| {
            let expected = if req.messages[0].content == DECIDE_PROMPT {
                0.0
            } else {
                0.7
            };
            assert_eq!(req.options.temperature, expected);
            assert_eq!(req.options.max_tokens, PROTOCOL_MAX_TOKENS);
            Ok(reply(req, false))
        });

        protocol(mock).run(&nolan()).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_call_abandons_example() {
        let mut mock = MockChatTransport::new();
        mock.expect_chat().returning(|req| {
            if req.messages[0].content == ANSWER_PROMPT {
                Err(CompletionError::Api {
                    status: 503,
                    message: "overloaded".to_string(),
                })
            } else {
                Ok(reply(req, true))
            }
        });

        let err = protocol(mock).run(&nolan()).await.unwrap_err();
        assert!(matches!(err, CompletionError::TransientCallExhausted { .. }));
    }

    #[test]
    fn test_derive_gated_is_pure_selection() {
        let direct = MethodOutput::new(Method::DirectRewrite, "direct");
        let always = MethodOutput::new(Method::AlwaysClarify, "always")
            .with_clarification("q", "a")
            .with_used_clarification(true);
        let mut decision = ClarificationDecision {
            needs_clarification: false,
            confidence: 0.4,
            rationale: String::new(),
            usage: UsageSummary::default(),
        };

        let gated = derive_gated(&decision, &direct, &always);
        assert_eq!(gated.method, Method::GatedClarify);
        assert_eq!(gated.rewrite, "direct");

        decision.needs_clarification = true;
        let gated = derive_gated(&decision, &direct, &always);
        assert_eq!(gated.rewrite, "always");
        assert_eq!(gated.clarification_answer.as_deref(), Some("a"));
    }
}
