//! Common types shared across lumen crates.
//!
//! This crate provides the error taxonomy and the small data model that the
//! memory store, the agent stages and the pipeline orchestrator exchange.

pub mod error;
pub mod types;

pub use error::{LumenError, Result, ToolFailureKind};
pub use types::{
    now_millis, truncate_chars, ObservationRecord, QualityRating, Source,
    MIN_RELEVANT_OUTPUT_CHARS,
};
