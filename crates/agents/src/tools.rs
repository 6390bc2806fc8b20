//! The research tool contract.
//!
//! Tools are external collaborators. This module fixes their names and
//! argument schemas ([`ToolCall`]), describes them to the reasoner
//! ([`ToolDescriptor`]), and defines the invocation seam ([`ToolInvoker`]).

use async_trait::async_trait;
use lumen_common::{LumenError, ObservationRecord, ToolFailureKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// What `web_scraper` pulls out of a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractType {
    #[default]
    Text,
    Links,
    Images,
    Tables,
}

/// Kind of computation `data_analyzer` performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Statistics,
    Trends,
    Comparison,
    #[default]
    Summary,
}

/// A fully-typed tool invocation.
///
/// Serialized as `{"tool": "<name>", "arguments": {...}}`, the shape the
/// reasoner emits and the tool server accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
pub enum ToolCall {
    WebSearch {
        query: String,
        #[serde(default = "default_max_results")]
        max_results: u32,
    },
    Wikipedia {
        topic: String,
    },
    ArxivSearch {
        query: String,
        #[serde(default = "default_max_papers")]
        max_papers: u32,
    },
    WebScraper {
        url: String,
        #[serde(default)]
        extract_type: ExtractType,
    },
    DataAnalyzer {
        data: String,
        #[serde(default)]
        analysis_type: AnalysisType,
    },
    CitationChecker {
        claim: String,
        source: String,
    },
}

fn default_max_results() -> u32 {
    5
}

fn default_max_papers() -> u32 {
    3
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            Self::WebSearch { .. } => "web_search",
            Self::Wikipedia { .. } => "wikipedia",
            Self::ArxivSearch { .. } => "arxiv_search",
            Self::WebScraper { .. } => "web_scraper",
            Self::DataAnalyzer { .. } => "data_analyzer",
            Self::CitationChecker { .. } => "citation_checker",
        }
    }

    /// The argument object alone, as recorded in observations.
    pub fn arguments(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => map.remove("arguments").unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// Build a call from a tool name and a loose argument object.
    pub fn from_parts(tool: &str, arguments: Value) -> Result<Self, serde_json::Error> {
        let arguments = match arguments {
            Value::Null => json!({}),
            other => other,
        };
        serde_json::from_value(json!({ "tool": tool, "arguments": arguments }))
    }
}

/// A tool as presented to the reasoner.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON schema of the argument object
    pub parameters: Value,
}

/// Descriptors for the six research tools.
pub fn tool_descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "web_search",
            description: "Search the web. Returns top results with snippets and links. Use for current events and general knowledge.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "max_results": {"type": "integer", "default": 5}
                },
                "required": ["query"]
            }),
        },
        ToolDescriptor {
            name: "wikipedia",
            description: "Look up a topic on Wikipedia. Returns a summary. Good for background on topics, people and events.",
            parameters: json!({
                "type": "object",
                "properties": {"topic": {"type": "string"}},
                "required": ["topic"]
            }),
        },
        ToolDescriptor {
            name: "arxiv_search",
            description: "Search scientific papers on arXiv. Returns title, authors and abstract of matching papers.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "max_papers": {"type": "integer", "default": 3}
                },
                "required": ["query"]
            }),
        },
        ToolDescriptor {
            name: "web_scraper",
            description: "Fetch a specific URL and extract its text, links, images or tables.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string"},
                    "extract_type": {
                        "type": "string",
                        "enum": ["text", "links", "images", "tables"],
                        "default": "text"
                    }
                },
                "required": ["url"]
            }),
        },
        ToolDescriptor {
            name: "data_analyzer",
            description: "Analyze numeric or tabular data (JSON, CSV or text) for statistics, trends, comparisons or a summary.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "data": {"type": "string"},
                    "analysis_type": {
                        "type": "string",
                        "enum": ["statistics", "trends", "comparison", "summary"],
                        "default": "summary"
                    }
                },
                "required": ["data"]
            }),
        },
        ToolDescriptor {
            name: "citation_checker",
            description: "Assess whether a claim is supported by a source and how reliable that source is.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "claim": {"type": "string"},
                    "source": {"type": "string"}
                },
                "required": ["claim", "source"]
            }),
        },
    ]
}

/// A failed tool invocation.
#[derive(Debug, Clone, Error)]
#[error("{tool} failed ({kind:?}): {message}")]
pub struct ToolError {
    pub tool: String,
    pub kind: ToolFailureKind,
    pub message: String,
}

impl ToolError {
    pub fn transient(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            kind: ToolFailureKind::Transient,
            message: message.into(),
        }
    }

    pub fn terminal(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            kind: ToolFailureKind::Terminal,
            message: message.into(),
        }
    }
}

impl From<ToolError> for LumenError {
    fn from(e: ToolError) -> Self {
        LumenError::Tool {
            kind: e.kind,
            message: format!("{}: {}", e.tool, e.message),
        }
    }
}

/// Executes research tools.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, call: &ToolCall) -> Result<ObservationRecord, ToolError>;
}
