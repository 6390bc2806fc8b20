//! Data model shared by the memory, agent and coordinator crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Observations at or below this many characters carry no usable evidence.
pub const MIN_RELEVANT_OUTPUT_CHARS: usize = 50;

/// A provenance reference: either a URL or the identifier of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Source {
    Url(String),
    Tool(String),
}

impl Source {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    pub fn tool(name: impl Into<String>) -> Self {
        Self::Tool(name.into())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.write_str(url),
            Self::Tool(name) => write!(f, "Tool: {name}"),
        }
    }
}

/// One tool-call result captured during the reasoning loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationRecord {
    /// Name of the tool that produced this observation
    pub tool: String,

    /// Raw arguments the tool was invoked with
    pub input: serde_json::Value,

    /// Raw output text
    pub output: String,

    /// Whether the invocation failed
    #[serde(default)]
    pub is_error: bool,

    /// Derived: non-error output with enough content to be evidence
    pub relevant: bool,
}

impl ObservationRecord {
    pub fn new(
        tool: impl Into<String>,
        input: serde_json::Value,
        output: impl Into<String>,
    ) -> Self {
        let output = output.into();
        let relevant = output.trim().chars().count() > MIN_RELEVANT_OUTPUT_CHARS;
        Self {
            tool: tool.into(),
            input,
            output,
            is_error: false,
            relevant,
        }
    }

    /// Record a failed invocation so the reasoner can see what went wrong.
    pub fn failed(
        tool: impl Into<String>,
        input: serde_json::Value,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tool: tool.into(),
            input,
            output: message.into(),
            is_error: true,
            relevant: false,
        }
    }
}

/// Three-level quality judgment used by analysis and answer metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityRating {
    #[default]
    Low,
    Medium,
    High,
}

impl QualityRating {
    /// Lenient parse of model output such as `"High"`, `"medium"` or
    /// `"Low - sources are dated"`.
    pub fn parse_lenient(text: &str) -> Option<Self> {
        let lower = text.trim().to_lowercase();
        if lower.starts_with("high") {
            Some(Self::High)
        } else if lower.starts_with("medium") || lower.starts_with("moderate") {
            Some(Self::Medium)
        } else if lower.starts_with("low") {
            Some(Self::Low)
        } else {
            None
        }
    }
}

impl fmt::Display for QualityRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        };
        f.write_str(label)
    }
}

/// Current wall-clock time as Unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Truncate to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
