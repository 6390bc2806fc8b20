use std::time::Duration;

use async_trait::async_trait;
use lumen_common::{LumenError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{LlmClient, LlmRequest, LlmResponse, Role, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct OpenAiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    model: String,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Client for any OpenAI-compatible chat completions endpoint (OpenAI,
/// Ollama, vLLM, ...).
pub struct OpenAiClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
    default_temperature: Option<f32>,
    default_max_tokens: Option<u32>,
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<String>,
        model: String,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model,
            api_key,
            http_client,
            default_temperature: None,
            default_max_tokens: None,
        }
    }

    /// Sampling parameters applied when a request leaves them unset.
    pub fn with_sampling_defaults(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.default_temperature = Some(temperature);
        self.default_max_tokens = Some(max_tokens);
        self
    }

    fn role_to_string(role: &Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    fn build_body(&self, request: &LlmRequest) -> OpenAiRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(ref system) = request.system_prompt {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: Some(system.clone()),
            });
        }
        messages.extend(request.messages.iter().map(|msg| OpenAiMessage {
            role: Self::role_to_string(&msg.role).to_string(),
            content: Some(msg.content.clone()),
        }));

        OpenAiRequest {
            model: self.model.clone(),
            messages,
            temperature: request.temperature.or(self.default_temperature),
            max_tokens: request.max_tokens.or(self.default_max_tokens),
        }
    }
}

fn map_send_error(e: reqwest::Error) -> LumenError {
    if e.is_timeout() {
        LumenError::Timeout(format!("LLM request timed out: {e}"))
    } else if let Some(status) = e.status() {
        LumenError::llm_status(status.as_u16(), e.to_string())
    } else {
        LumenError::llm(format!("LLM request failed: {e}"))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_body(&request);

        let mut http_req = self.http_client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            http_req = http_req.bearer_auth(key);
        }

        let response = http_req.send().await.map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(|v| format!(" retry-after: {v}"))
                .unwrap_or_default();
            let body_text = response.text().await.unwrap_or_default();
            return Err(LumenError::llm_status(
                status.as_u16(),
                format!("{status}: {body_text}{retry_after}"),
            ));
        }

        let oai_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| LumenError::llm(format!("Failed to parse completion response: {e}")))?;

        let choice = oai_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LumenError::llm("No choices in completion response"))?;

        debug!(
            model = %oai_response.model,
            finish_reason = ?choice.finish_reason,
            "Completion received"
        );

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            model: oai_response.model,
            usage: oai_response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
            finish_reason: choice.finish_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChatMessage;

    fn client(base_url: Option<&str>) -> OpenAiClient {
        OpenAiClient::new(
            base_url.map(String::from),
            "gpt-4-turbo-preview".to_string(),
            Some("sk-test".to_string()),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn request_body_matches_openai_format() {
        let request = LlmRequest {
            system_prompt: Some("Be rigorous.".to_string()),
            messages: vec![ChatMessage::user("What is entanglement?")],
            temperature: Some(0.1),
            max_tokens: Some(4000),
        };

        let body = client(None).build_body(&request);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "gpt-4-turbo-preview");
        assert_eq!(json["max_tokens"], 4000);

        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "Be rigorous.");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "What is entanglement?");
    }

    #[test]
    fn request_body_omits_optional_fields() {
        let request = LlmRequest {
            system_prompt: None,
            messages: vec![ChatMessage::user("Hello")],
            temperature: None,
            max_tokens: None,
        };

        let body = client(None).build_body(&request);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn sampling_defaults_fill_unset_fields_only() {
        let client = client(None).with_sampling_defaults(0.1, 4000);

        let body = client.build_body(&LlmRequest::prompt("s", "u"));
        assert_eq!(body.temperature, Some(0.1));
        assert_eq!(body.max_tokens, Some(4000));

        let body = client.build_body(&LlmRequest::prompt("s", "u").with_temperature(0.3));
        assert_eq!(body.temperature, Some(0.3));
    }

    #[test]
    fn base_url_defaults_and_trims() {
        assert_eq!(client(None).base_url, "https://api.openai.com");
        assert_eq!(
            client(Some("http://localhost:11434/")).base_url,
            "http://localhost:11434"
        );
    }

    #[test]
    fn response_with_null_content_parses() {
        let raw = r#"{"model":"m","choices":[{"message":{"role":"assistant","content":null},"finish_reason":"stop"}]}"#;
        let parsed: OpenAiResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
        assert!(parsed.usage.is_none());
    }
}
