//! The decision engine behind the tool loop.

use std::sync::Arc;

use async_trait::async_trait;
use lumen_common::{truncate_chars, LumenError, ObservationRecord, Result};
use lumen_llm::{retry_transient, ChatMessage, LlmClient, LlmRequest, RetryPolicy};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::tools::{ToolCall, ToolDescriptor};

const REASONER_SYSTEM_PROMPT: &str = r#"You are a professional research assistant. You gather information from several sources, judge its reliability, and stop once you have enough evidence to answer.

Workflow:
1. Understand the question and its scope
2. Decide which tools to use and in what order
3. Collect information from multiple sources
4. Cross-check facts between sources

Tool tips:
- web_search: current events, general information
- wikipedia: background and overviews
- arxiv_search: scientific research
- web_scraper: detailed content from a specific URL
- data_analyzer: numerical analysis
- citation_checker: verifying a claim against a source

Respond with exactly one JSON object and nothing else, either
{"action": "tool_call", "tool": "<tool name>", "arguments": {...}}
or
{"action": "complete", "answer": "<draft answer>"}"#;

/// What the reasoner wants to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    ToolCall(ToolCall),
    Complete { answer_draft: String },
}

/// Everything the reasoner sees when making one decision.
#[derive(Debug, Clone, Copy)]
pub struct ReasoningContext<'a> {
    pub query: &'a str,
    /// Earlier conversation turns, oldest first
    pub history: &'a [ChatMessage],
    pub tools: &'a [ToolDescriptor],
    /// Observations gathered so far in this run
    pub observations: &'a [ObservationRecord],
    /// Zero-based index of this decision
    pub iteration: u32,
}

#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Decide the next step. Unparseable output fails with
    /// [`LumenError::ReasonerParse`].
    async fn decide(&self, context: &ReasoningContext<'_>) -> Result<Decision>;
}

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum RawDecision {
    ToolCall {
        tool: String,
        #[serde(default)]
        arguments: Value,
    },
    Complete {
        answer: String,
    },
}

/// Parse a model reply into a [`Decision`]. Tolerates prose or code fences
/// around the JSON object.
pub fn parse_decision(text: &str) -> Result<Decision> {
    let json = extract_json_object(text)
        .ok_or_else(|| LumenError::ReasonerParse(format!("no JSON object in: {}", truncate_chars(text, 200))))?;

    let raw: RawDecision =
        serde_json::from_str(json).map_err(|e| LumenError::ReasonerParse(e.to_string()))?;

    match raw {
        RawDecision::Complete { answer } => Ok(Decision::Complete {
            answer_draft: answer,
        }),
        RawDecision::ToolCall { tool, arguments } => ToolCall::from_parts(&tool, arguments)
            .map(Decision::ToolCall)
            .map_err(|e| LumenError::ReasonerParse(format!("invalid call to '{tool}': {e}"))),
    }
}

/// The span from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Reasoner backed by a chat model.
pub struct LlmReasoner {
    client: Arc<dyn LlmClient>,
    retry: RetryPolicy,
    max_observation_chars: usize,
}

impl LlmReasoner {
    pub fn new(client: Arc<dyn LlmClient>, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            max_observation_chars: 1500,
        }
    }

    fn build_request(&self, context: &ReasoningContext<'_>) -> LlmRequest {
        let tools = context
            .tools
            .iter()
            .map(|t| format!("- {}: {}\n  arguments: {}", t.name, t.description, t.parameters))
            .collect::<Vec<_>>()
            .join("\n");
        let system = format!("{REASONER_SYSTEM_PROMPT}\n\nAVAILABLE TOOLS:\n{tools}");

        let mut user = format!("QUESTION: {}", context.query);
        if !context.observations.is_empty() {
            user.push_str("\n\nOBSERVATIONS SO FAR:");
            for (i, obs) in context.observations.iter().enumerate() {
                let status = if obs.is_error { " (failed)" } else { "" };
                user.push_str(&format!(
                    "\n\n[{}] {}{} {}\n{}",
                    i + 1,
                    obs.tool,
                    status,
                    obs.input,
                    truncate_chars(&obs.output, self.max_observation_chars)
                ));
            }
        }
        user.push_str("\n\nWhat is the next step?");

        let mut messages = context.history.to_vec();
        messages.push(ChatMessage::user(user));

        LlmRequest {
            system_prompt: Some(system),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }
}

#[async_trait]
impl Reasoner for LlmReasoner {
    async fn decide(&self, context: &ReasoningContext<'_>) -> Result<Decision> {
        let request = self.build_request(context);
        let response = retry_transient(&self.retry, "reasoner", || {
            self.client.complete(request.clone())
        })
        .await?;

        let decision = parse_decision(&response.content)?;
        debug!(iteration = context.iteration, decision = ?decision, "Reasoner decided");
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tool_descriptors;
    use lumen_llm::LlmResponse;
    use std::sync::Mutex;

    #[test]
    fn parses_tool_call() {
        let decision = parse_decision(
            r#"{"action": "tool_call", "tool": "wikipedia", "arguments": {"topic": "Quantum entanglement"}}"#,
        )
        .unwrap();
        assert_eq!(
            decision,
            Decision::ToolCall(ToolCall::Wikipedia {
                topic: "Quantum entanglement".into()
            })
        );
    }

    #[test]
    fn parses_completion_inside_code_fence() {
        let decision =
            parse_decision("```json\n{\"action\": \"complete\", \"answer\": \"Done.\"}\n```").unwrap();
        assert_eq!(
            decision,
            Decision::Complete {
                answer_draft: "Done.".into()
            }
        );
    }

    #[test]
    fn malformed_output_is_a_parse_error() {
        for text in [
            "I think we should search the web",
            r#"{"action": "dance"}"#,
            r#"{"action": "tool_call", "tool": "rm_rf", "arguments": {}}"#,
            r#"{"action": "tool_call", "tool": "web_search", "arguments": {"max_results": 3}}"#,
        ] {
            let err = parse_decision(text).unwrap_err();
            assert!(matches!(err, LumenError::ReasonerParse(_)), "{text}: {err}");
            assert!(!err.is_transient());
        }
    }

    struct RecordingClient {
        reply: String,
        requests: Mutex<Vec<LlmRequest>>,
    }

    #[async_trait]
    impl LlmClient for RecordingClient {
        async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
            self.requests.lock().unwrap().push(request);
            Ok(LlmResponse {
                content: self.reply.clone(),
                model: "mock".into(),
                usage: None,
                finish_reason: None,
            })
        }
        fn model_name(&self) -> &str {
            "mock"
        }
    }

    #[tokio::test]
    async fn request_carries_history_tools_and_observations() {
        let client = Arc::new(RecordingClient {
            reply: r#"{"action": "complete", "answer": "ok"}"#.into(),
            requests: Mutex::new(Vec::new()),
        });
        let reasoner = LlmReasoner::new(client.clone(), RetryPolicy::default());

        let history = vec![
            ChatMessage::user("What is Rust?"),
            ChatMessage::assistant("A systems language."),
        ];
        let tools = tool_descriptors();
        let observations = vec![ObservationRecord::new(
            "wikipedia",
            serde_json::json!({"topic": "Rust"}),
            "Rust is a multi-paradigm programming language.",
        )];

        let decision = reasoner
            .decide(&ReasoningContext {
                query: "Who created Rust?",
                history: &history,
                tools: &tools,
                observations: &observations,
                iteration: 1,
            })
            .await
            .unwrap();
        assert!(matches!(decision, Decision::Complete { .. }));

        let requests = client.requests.lock().unwrap();
        let request = &requests[0];
        assert!(request.system_prompt.as_deref().unwrap().contains("arxiv_search"));
        assert_eq!(request.messages.len(), 3);
        let last = &request.messages[2].content;
        assert!(last.contains("Who created Rust?"));
        assert!(last.contains("[1] wikipedia"));
    }
}
