//! Pipeline stages and the transition tracker.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

/// One step of a pipeline run. Stages only move forward, one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Init,
    RetrievingMemory,
    ExecutingTools,
    Extracting,
    Analyzing,
    Synthesizing,
    StoringMemory,
    Done,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 8] = [
        Self::Init,
        Self::RetrievingMemory,
        Self::ExecutingTools,
        Self::Extracting,
        Self::Analyzing,
        Self::Synthesizing,
        Self::StoringMemory,
        Self::Done,
    ];

    /// The stage that follows this one; `None` after `Done`.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::RetrievingMemory),
            Self::RetrievingMemory => Some(Self::ExecutingTools),
            Self::ExecutingTools => Some(Self::Extracting),
            Self::Extracting => Some(Self::Analyzing),
            Self::Analyzing => Some(Self::Synthesizing),
            Self::Synthesizing => Some(Self::StoringMemory),
            Self::StoringMemory => Some(Self::Done),
            Self::Done => None,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Init => "init",
            Self::RetrievingMemory => "retrieving_memory",
            Self::ExecutingTools => "executing_tools",
            Self::Extracting => "extracting",
            Self::Analyzing => "analyzing",
            Self::Synthesizing => "synthesizing",
            Self::StoringMemory => "storing_memory",
            Self::Done => "done",
        };
        f.write_str(label)
    }
}

/// Walks a run through the stages in order and times each one.
pub(crate) struct StageTracker {
    current: PipelineStage,
    entered_at: Instant,
    timings: Vec<(PipelineStage, Duration)>,
}

impl StageTracker {
    pub(crate) fn start() -> Self {
        Self {
            current: PipelineStage::Init,
            entered_at: Instant::now(),
            timings: Vec::with_capacity(PipelineStage::ALL.len()),
        }
    }

    pub(crate) fn current(&self) -> PipelineStage {
        self.current
    }

    /// Move to the next stage. A no-op once `Done` is reached.
    pub(crate) fn advance(&mut self) -> PipelineStage {
        let Some(next) = self.current.next() else {
            return self.current;
        };
        let spent = self.entered_at.elapsed();
        debug!(
            from = %self.current,
            to = %next,
            spent_ms = spent.as_millis() as u64,
            "Pipeline stage transition"
        );
        self.timings.push((self.current, spent));
        self.current = next;
        self.entered_at = Instant::now();
        next
    }

    /// Time spent in each completed stage, in order.
    pub(crate) fn timings(&self) -> &[(PipelineStage, Duration)] {
        &self.timings
    }
}
