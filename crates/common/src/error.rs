//! Error types for lumen.

use thiserror::Error;

/// Whether a failed tool call may succeed if attempted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolFailureKind {
    Transient,
    Terminal,
}

#[derive(Error, Debug)]
pub enum LumenError {
    #[error("Tool error ({kind:?}): {message}")]
    Tool {
        kind: ToolFailureKind,
        message: String,
    },

    #[error("Reasoner output could not be parsed: {0}")]
    ReasonerParse(String),

    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("LLM error{}: {message}", .status.map(|s| format!(" {s}")).unwrap_or_default())]
    Llm {
        status: Option<u16>,
        message: String,
    },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LumenError {
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            status: None,
            message: message.into(),
        }
    }

    pub fn llm_status(status: u16, message: impl Into<String>) -> Self {
        Self::Llm {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Returns true when the failed call is worth attempting again.
    ///
    /// Model output that failed schema validation counts as transient: the
    /// same request can yield a well-formed answer on the next sample.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::SchemaValidation(_) => true,
            Self::Tool { kind, .. } => *kind == ToolFailureKind::Transient,
            Self::Llm { status: Some(code), .. } => *code == 408 || *code == 429 || *code >= 500,
            Self::Llm { status: None, message } => is_transient_message(message),
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            Self::ReasonerParse(_)
            | Self::Memory(_)
            | Self::Config(_)
            | Self::Serialization(_) => false,
        }
    }
}

/// Heuristic for provider errors that only carry a message.
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("429")
        || lower.contains("rate limit")
        || lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("server error")
        || lower.contains("bad gateway")
        || lower.contains("service unavailable")
        || lower.contains("gateway timeout")
        || lower.contains("connection reset")
}

pub type Result<T> = std::result::Result<T, LumenError>;
