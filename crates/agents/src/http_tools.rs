//! Tool invocation over HTTP.
//!
//! Forwards each [`ToolCall`] as JSON to a tool server and turns its reply
//! into an [`ObservationRecord`].

use std::time::Duration;

use async_trait::async_trait;
use lumen_common::ObservationRecord;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tools::{ToolCall, ToolError, ToolInvoker};

/// Location of the tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_endpoint() -> String {
    "http://localhost:8090".into()
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Deserialize)]
struct ToolReply {
    #[serde(default)]
    output: String,
    #[serde(default)]
    error: Option<String>,
}

pub struct HttpToolInvoker {
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpToolInvoker {
    pub fn new(config: &ToolServerConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            http_client,
        }
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

fn map_send_error(tool: &str, e: reqwest::Error) -> ToolError {
    if e.is_timeout() || e.is_connect() {
        ToolError::transient(tool, e.to_string())
    } else {
        ToolError::terminal(tool, e.to_string())
    }
}

#[async_trait]
impl ToolInvoker for HttpToolInvoker {
    async fn invoke(&self, call: &ToolCall) -> Result<ObservationRecord, ToolError> {
        let tool = call.name();
        let url = format!("{}/invoke", self.endpoint);
        debug!(tool, url = %url, "Invoking tool");

        let response = self
            .http_client
            .post(&url)
            .json(call)
            .send()
            .await
            .map_err(|e| map_send_error(tool, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("{status}: {body}");
            return Err(if is_transient_status(status.as_u16()) {
                ToolError::transient(tool, message)
            } else {
                ToolError::terminal(tool, message)
            });
        }

        let reply: ToolReply = response
            .json()
            .await
            .map_err(|e| ToolError::terminal(tool, format!("Invalid tool reply: {e}")))?;

        if let Some(error) = reply.error {
            return Err(ToolError::terminal(tool, error));
        }

        debug!(tool, output_len = reply.output.len(), "Tool returned");
        Ok(ObservationRecord::new(tool, call.arguments(), reply.output))
    }
}
