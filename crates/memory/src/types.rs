//! Memory types and configuration.

use lumen_common::{now_millis, Source};
use serde::{Deserialize, Serialize};

/// One completed query/answer cycle. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// Unique ID
    pub id: String,

    /// Position in the session's interaction log, starting at 1
    pub sequence: u64,

    pub query: String,

    /// Final answer text
    pub response: String,

    /// Provenance, in discovery order
    #[serde(default)]
    pub sources: Vec<Source>,

    /// Serialized analysis result, if analysis ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<serde_json::Value>,

    /// Execution duration of the run that produced this interaction
    pub duration_ms: u64,

    /// Creation timestamp (Unix millis)
    pub created_at: u64,
}

impl Interaction {
    pub fn new(
        sequence: u64,
        query: impl Into<String>,
        response: impl Into<String>,
        metadata: InteractionMetadata,
    ) -> Self {
        let mut sources: Vec<Source> = Vec::with_capacity(metadata.sources.len());
        for source in metadata.sources {
            if !sources.contains(&source) {
                sources.push(source);
            }
        }

        Self {
            id: format!("int_{}", uuid::Uuid::new_v4()),
            sequence,
            query: query.into(),
            response: response.into(),
            sources,
            analysis: metadata.analysis,
            duration_ms: metadata.duration_ms,
            created_at: now_millis(),
        }
    }

    /// Text that represents this interaction in the semantic index.
    pub fn document_text(&self) -> String {
        format!("Query: {}\n\nResponse: {}", self.query, self.response)
    }
}

/// Metadata attached to an interaction when it is stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionMetadata {
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub analysis: Option<serde_json::Value>,
    #[serde(default)]
    pub duration_ms: u64,
}

/// Summary maintenance strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStrategy {
    /// One line per exchange, oldest dropped first
    #[default]
    Truncate,
    /// Rewritten by the language model after each exchange
    Llm,
}

/// Configuration for the memory system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Capacity K of the short-term buffer
    #[serde(default = "default_memory_window")]
    pub memory_window: usize,

    /// Whether the semantic index is maintained and queried
    #[serde(default = "default_true")]
    pub enable_long_term_memory: bool,

    /// Rebuild the semantic index every N interactions
    #[serde(default = "default_rebuild_interval")]
    pub rebuild_interval: u64,

    /// Default number of past interactions returned by semantic retrieval
    #[serde(default = "default_relevant_context_k")]
    pub relevant_context_k: usize,

    /// How the running summary is maintained
    #[serde(default)]
    pub summary_strategy: SummaryStrategy,

    /// Upper bound on the running summary length
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,

    /// Timeout for one embedding or summarization call
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Embedding model name
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
}

fn default_memory_window() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_rebuild_interval() -> u64 {
    5
}

fn default_relevant_context_k() -> usize {
    3
}

fn default_summary_max_chars() -> usize {
    2000
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".into()
}

fn default_embedding_dim() -> usize {
    384 // MiniLM dimension
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            memory_window: default_memory_window(),
            enable_long_term_memory: default_true(),
            rebuild_interval: default_rebuild_interval(),
            relevant_context_k: default_relevant_context_k(),
            summary_strategy: SummaryStrategy::default(),
            summary_max_chars: default_summary_max_chars(),
            call_timeout_ms: default_call_timeout_ms(),
            embedding_model: default_embedding_model(),
            embedding_dim: default_embedding_dim(),
        }
    }
}

/// Point-in-time view of the memory store, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub short_term_len: usize,
    pub total_interactions: u64,
    /// Interactions covered by the current semantic index
    pub indexed_interactions: usize,
    pub rebuild_count: u64,
    /// Interaction count at which the current index was built
    pub last_rebuild_at: Option<u64>,
    pub long_term_enabled: bool,
    pub summary_preview: String,
}
