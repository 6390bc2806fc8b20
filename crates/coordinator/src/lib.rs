//! Research pipeline orchestrator for lumen.
//!
//! Runs one query through six stages and always returns an answer:
//!
//! ```text
//! query
//!   │
//!   ▼
//! ┌──────────────────┐   relevant past interactions,
//! │ RetrievingMemory │   short-term history
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐   reasoner ◄──► tools
//! │  ExecutingTools  │   (iteration + time budget)
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐   collected data, sources
//! │    Extracting    │
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐   structured analysis ║ quality check
//! │    Analyzing     │   (optional, concurrent)
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐   sectioned answer, or raw-data fallback
//! │   Synthesizing   │
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  StoringMemory   │──► MemoryStore
//! └────────┬─────────┘
//!          ▼
//!     FinalAnswer
//! ```

pub mod answer;
pub mod config;
pub mod extraction;
pub mod orchestrator;
pub mod stage;

pub use answer::{AnswerMetadata, Degradation, FinalAnswer};
pub use config::PipelineConfig;
pub use extraction::{extract, ExtractedData};
pub use orchestrator::{PipelineOrchestrator, RunOptions};
pub use stage::PipelineStage;
