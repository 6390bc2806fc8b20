//! Research agent stages for lumen.
//!
//! - **Tools**: the fixed research tool set, its typed calls and the
//!   invocation contract (with an HTTP bridge to a tool server)
//! - **Reasoner**: decides the next tool call or declares completion
//! - **Executor**: the bounded reasoner/tool loop
//! - **Analysis**: structured findings and quality check, run concurrently
//! - **Synthesis**: the final answer document
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TOOL LOOP                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │   ┌──────────┐  ToolCall   ┌──────────────┐                 │
//! │   │ Reasoner │ ──────────► │ ToolInvoker  │                 │
//! │   └────▲─────┘             └──────┬───────┘                 │
//! │        │      observations        │                         │
//! │        └──────────────────────────┘                         │
//! │                                                             │
//! │   bounded by max_iterations and max_execution_time          │
//! └─────────────────────────────────────────────────────────────┘
//!            │
//!            ▼
//!   ┌──────────────────────────┐      ┌────────────────┐
//!   │ AnalysisStage            │ ───► │ SynthesisStage │
//!   │  structured ║ quality    │      └────────────────┘
//!   └──────────────────────────┘
//! ```

pub mod analysis;
pub mod executor;
pub mod http_tools;
pub mod reasoner;
pub mod synthesis;
pub mod tools;

pub use analysis::{AnalysisInput, AnalysisResult, AnalysisSettings, AnalysisStage, QualityCheck};
pub use executor::{AgentSettings, ExecutionOutcome, StopReason, ToolExecutor};
pub use http_tools::{HttpToolInvoker, ToolServerConfig};
pub use reasoner::{parse_decision, Decision, LlmReasoner, Reasoner, ReasoningContext};
pub use synthesis::{missing_sections, SynthesisInput, SynthesisSettings, SynthesisStage, REQUIRED_SECTIONS};
pub use tools::{
    tool_descriptors, AnalysisType, ExtractType, ToolCall, ToolDescriptor, ToolError, ToolInvoker,
};
