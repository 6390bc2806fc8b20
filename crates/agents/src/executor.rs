//! Bounded, reasoner-driven tool loop.
//!
//! An explicit loop over a visible state record: iteration count, elapsed
//! time and accumulated observations. The loop ends when the reasoner
//! completes, when either budget is exhausted, or when the reasoner cannot
//! produce a usable decision. None of these is an error; the caller receives
//! whatever was gathered.

use std::sync::Arc;
use std::time::Duration;

use lumen_common::{LumenError, ObservationRecord};
use lumen_llm::ChatMessage;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::reasoner::{Decision, Reasoner, ReasoningContext};
use crate::tools::{tool_descriptors, ToolDescriptor, ToolInvoker};

/// Budgets for the tool loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Wall-clock budget for the whole loop
    #[serde(default = "default_max_execution_time_secs")]
    pub max_execution_time_secs: u64,

    /// Upper bound for a single tool call
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Maximum number of sources carried into the answer
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
}

fn default_max_iterations() -> u32 {
    5
}

fn default_max_execution_time_secs() -> u64 {
    300
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_max_sources() -> usize {
    10
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_execution_time_secs: default_max_execution_time_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
            max_sources: default_max_sources(),
        }
    }
}

impl AgentSettings {
    pub fn max_execution_time(&self) -> Duration {
        Duration::from_secs(self.max_execution_time_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The reasoner declared completion
    Completed,
    IterationBudget,
    TimeBudget,
    /// The reasoner's output could not be parsed
    MalformedDecision,
    /// The reasoner call failed after retries
    ReasonerFailed,
}

impl StopReason {
    pub fn is_budget(&self) -> bool {
        matches!(self, Self::IterationBudget | Self::TimeBudget)
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub observations: Vec<ObservationRecord>,
    /// Draft answer, present when the reasoner completed
    pub draft: Option<String>,
    /// Reasoner decisions made
    pub iterations: u32,
    pub stop_reason: StopReason,
    pub elapsed: Duration,
}

struct LoopState {
    iterations: u32,
    observations: Vec<ObservationRecord>,
    draft: Option<String>,
}

pub struct ToolExecutor {
    reasoner: Arc<dyn Reasoner>,
    tools: Arc<dyn ToolInvoker>,
    descriptors: Vec<ToolDescriptor>,
    settings: AgentSettings,
}

impl ToolExecutor {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        tools: Arc<dyn ToolInvoker>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            reasoner,
            tools,
            descriptors: tool_descriptors(),
            settings,
        }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Drive the reasoner/tool loop for `query` until a stop condition.
    #[instrument(skip(self, query, history), fields(query_len = query.len(), history = history.len()))]
    pub async fn run(&self, query: &str, history: &[ChatMessage]) -> ExecutionOutcome {
        let started = Instant::now();
        // A budget too large to represent is no deadline at all.
        let deadline = started.checked_add(self.settings.max_execution_time());
        let mut state = LoopState {
            iterations: 0,
            observations: Vec::new(),
            draft: None,
        };

        let stop_reason = loop {
            if state.iterations >= self.settings.max_iterations {
                break StopReason::IterationBudget;
            }

            let remaining = remaining_until(deadline);
            if remaining.is_zero() {
                break StopReason::TimeBudget;
            }

            let context = ReasoningContext {
                query,
                history,
                tools: &self.descriptors,
                observations: &state.observations,
                iteration: state.iterations,
            };

            let decision = match tokio::time::timeout(remaining, self.reasoner.decide(&context)).await {
                Err(_) => break StopReason::TimeBudget,
                Ok(Err(LumenError::ReasonerParse(message))) => {
                    warn!(iteration = state.iterations, error = %message, "Malformed reasoner output, ending tool loop");
                    break StopReason::MalformedDecision;
                }
                Ok(Err(e)) => {
                    warn!(iteration = state.iterations, error = %e, "Reasoner failed, ending tool loop");
                    break StopReason::ReasonerFailed;
                }
                Ok(Ok(decision)) => decision,
            };
            state.iterations += 1;

            let call = match decision {
                Decision::Complete { answer_draft } => {
                    state.draft = Some(answer_draft);
                    break StopReason::Completed;
                }
                Decision::ToolCall(call) => call,
            };

            let remaining = remaining_until(deadline);
            if remaining.is_zero() {
                break StopReason::TimeBudget;
            }
            let limit = remaining.min(self.settings.tool_timeout());
            let tool = call.name();

            debug!(iteration = state.iterations, tool, "Invoking tool");
            match tokio::time::timeout(limit, self.tools.invoke(&call)).await {
                Ok(Ok(observation)) => {
                    debug!(
                        tool,
                        output_len = observation.output.len(),
                        relevant = observation.relevant,
                        "Tool observation recorded"
                    );
                    state.observations.push(observation);
                }
                Ok(Err(e)) => {
                    warn!(tool, kind = ?e.kind, error = %e.message, "Tool call failed");
                    state
                        .observations
                        .push(ObservationRecord::failed(tool, call.arguments(), e.to_string()));
                }
                Err(_) if limit < remaining => {
                    warn!(tool, timeout_secs = self.settings.tool_timeout_secs, "Tool call timed out");
                    state.observations.push(ObservationRecord::failed(
                        tool,
                        call.arguments(),
                        format!("{tool} timed out after {}s", self.settings.tool_timeout_secs),
                    ));
                }
                Err(_) => {
                    // In-flight call dropped at the budget; its result is discarded.
                    warn!(tool, "Execution time budget exhausted during tool call");
                    break StopReason::TimeBudget;
                }
            }
        };

        let elapsed = started.elapsed();
        info!(
            iterations = state.iterations,
            observations = state.observations.len(),
            stop_reason = ?stop_reason,
            elapsed_ms = elapsed.as_millis() as u64,
            "Tool loop finished"
        );

        ExecutionOutcome {
            observations: state.observations,
            draft: state.draft,
            iterations: state.iterations,
            stop_reason,
            elapsed,
        }
    }
}

/// Time left before `deadline`; unbounded when there is none.
fn remaining_until(deadline: Option<Instant>) -> Duration {
    match deadline {
        Some(deadline) => deadline.saturating_duration_since(Instant::now()),
        None => Duration::MAX,
    }
}
