//! Hybrid conversational memory for lumen.
//!
//! Two layers over one interaction log:
//!
//! - **Short-term**: the last K interactions, verbatim, plus a running summary
//! - **Long-term**: a semantic index over the whole log, rebuilt every R
//!   interactions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    MEMORY STORE                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  add_interaction ──┬──► Short-term buffer (FIFO, K)         │
//! │                    ├──► Interaction log (append-only)       │
//! │                    ├──► Running summary (replaced)          │
//! │                    │                                        │
//! │                    └──► every R appends:                    │
//! │                          embed log ──► new SemanticIndex    │
//! │                                        (atomic swap)        │
//! │                                                             │
//! │  get_relevant_context ──► embed query ──► cosine top-k      │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Between rebuilds the index may miss up to R - 1 of the newest
//! interactions.

pub mod embedding;
pub mod index;
pub mod retrieval;
pub mod store;
pub mod summary;
pub mod types;

pub use embedding::{Embedder, EmbeddingError, EmbeddingService};
pub use index::SemanticIndex;
pub use retrieval::format_context;
pub use store::MemoryStore;
pub use summary::{LlmSummarizer, Summarizer, TruncatingSummarizer};
pub use types::{Interaction, InteractionMetadata, MemoryConfig, MemoryStats, SummaryStrategy};
