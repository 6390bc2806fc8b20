//! The six-stage research pipeline.
//!
//! `run` never fails: every stage failure maps to a [`Degradation`] and the
//! pipeline carries on with what it has. The only hard errors are at
//! construction time (invalid configuration, unknown provider or model).

use std::sync::Arc;
use std::time::Duration;

use lumen_agents::{
    AnalysisInput, AnalysisResult, AnalysisStage, LlmReasoner, Reasoner, StopReason,
    SynthesisInput, SynthesisStage, ToolExecutor, ToolInvoker,
};
use lumen_common::{now_millis, truncate_chars, LumenError, QualityRating, Result};
use lumen_llm::{build_llm_client, ChatMessage, LlmClient};
use lumen_memory::{
    format_context, EmbeddingService, Interaction, InteractionMetadata, LlmSummarizer,
    MemoryStore, SummaryStrategy,
};
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::answer::{AnswerMetadata, Degradation, FinalAnswer};
use crate::config::PipelineConfig;
use crate::extraction::{extract, ExtractedData};
use crate::stage::{PipelineStage, StageTracker};

/// Past responses are clipped to this many characters in the reasoner's
/// conversation history.
const HISTORY_RESPONSE_CHARS: usize = 1000;

/// Per-run overrides of the configured behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Overrides `analysis.enable_deep_analysis` when set
    pub enable_analysis: Option<bool>,
}

pub struct PipelineOrchestrator {
    config: PipelineConfig,
    memory: Arc<MemoryStore>,
    executor: ToolExecutor,
    analysis: AnalysisStage,
    synthesis: SynthesisStage,
}

impl PipelineOrchestrator {
    /// Assemble a pipeline from already-built parts.
    ///
    /// `llm` serves analysis and synthesis; `reasoner` drives the tool loop.
    pub fn new(
        config: PipelineConfig,
        memory: Arc<MemoryStore>,
        reasoner: Arc<dyn Reasoner>,
        tools: Arc<dyn ToolInvoker>,
        llm: Arc<dyn LlmClient>,
    ) -> Result<Self> {
        config.validate()?;

        let executor = ToolExecutor::new(reasoner, tools, config.agent.clone());
        let analysis = AnalysisStage::new(llm.clone(), config.retry.clone(), config.analysis.clone());
        let synthesis = SynthesisStage::new(llm, config.retry.clone(), config.synthesis.clone());

        info!(
            max_iterations = config.agent.max_iterations,
            memory_window = config.memory.memory_window,
            rebuild_interval = config.memory.rebuild_interval,
            deep_analysis = config.analysis.enable_deep_analysis,
            "Pipeline orchestrator initialized"
        );

        Ok(Self {
            config,
            memory,
            executor,
            analysis,
            synthesis,
        })
    }

    /// Build every part from configuration: the LLM client, the local
    /// embedding model, the memory store and the reasoner.
    pub fn from_config(config: PipelineConfig, tools: Arc<dyn ToolInvoker>) -> Result<Self> {
        config.validate()?;

        let llm = build_llm_client(&config.llm)?;
        let embedder = EmbeddingService::from_config(
            &config.memory.embedding_model,
            config.memory.embedding_dim,
        )
        .map_err(|e| LumenError::Config(e.to_string()))?;

        let memory = match config.memory.summary_strategy {
            SummaryStrategy::Truncate => MemoryStore::new(config.memory.clone(), Arc::new(embedder)),
            SummaryStrategy::Llm => MemoryStore::with_summarizer(
                config.memory.clone(),
                Arc::new(embedder),
                Arc::new(LlmSummarizer::new(llm.clone(), config.memory.summary_max_chars)),
            ),
        };

        let reasoner = Arc::new(LlmReasoner::new(llm.clone(), config.retry.clone()));
        Self::new(config, Arc::new(memory), reasoner, tools, llm)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub async fn run(&self, query: &str) -> FinalAnswer {
        self.run_with(query, RunOptions::default()).await
    }

    /// Run one query through every stage and return the answer document.
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn run_with(&self, query: &str, options: RunOptions) -> FinalAnswer {
        let started = Instant::now();
        let mut stages = StageTracker::start();
        let mut degradations = Vec::new();

        info!(query = %truncate_chars(query, 100), "Research run started");

        stages.advance();
        let past = self
            .memory
            .get_relevant_context(query, self.config.memory.relevant_context_k)
            .await;
        let history = chat_history(&self.memory.get_short_term_history().await);
        let past_context = format_context(&past, self.config.synthesis.max_past_context_chars);

        stages.advance();
        let outcome = self.executor.run(query, &history).await;
        if outcome.stop_reason == StopReason::ReasonerFailed {
            degrade(
                &mut degradations,
                stages.current(),
                Degradation::ReasonerFailed,
                "reasoner unavailable",
            );
        }

        stages.advance();
        let extracted = extract(&outcome.observations, self.config.agent.max_sources);

        stages.advance();
        let analysis_enabled = options
            .enable_analysis
            .unwrap_or(self.config.analysis.enable_deep_analysis);
        let analysis = if !analysis_enabled || extracted.is_empty() {
            degradations.push(Degradation::AnalysisSkipped);
            info!(enabled = analysis_enabled, "Analysis skipped");
            None
        } else {
            let input = AnalysisInput {
                query,
                data: &extracted.collected_data,
                sources: &extracted.sources,
            };
            match self.analysis.analyze(&input).await {
                Ok(result) => Some(result),
                Err(e) => {
                    degrade(
                        &mut degradations,
                        stages.current(),
                        Degradation::AnalysisFailed,
                        &e.to_string(),
                    );
                    None
                }
            }
        };

        stages.advance();
        let input = SynthesisInput {
            query,
            findings: &extracted.collected_data,
            analysis: analysis.as_ref(),
            past_context: &past_context,
        };
        let answer = match self.synthesis.synthesize(&input).await {
            Ok(answer) => answer,
            Err(e) => {
                degrade(
                    &mut degradations,
                    stages.current(),
                    Degradation::SynthesisFallback,
                    &e.to_string(),
                );
                fallback_answer(query, &extracted, outcome.draft.as_deref())
            }
        };

        stages.advance();
        let execution_time = started.elapsed();
        if let Err(reason) = self
            .store(query, &answer, &extracted, analysis.as_ref(), execution_time)
            .await
        {
            degrade(
                &mut degradations,
                stages.current(),
                Degradation::MemoryStoreFailed,
                &reason,
            );
        }

        stages.advance();
        let timings: Vec<String> = stages
            .timings()
            .iter()
            .map(|(stage, spent)| format!("{stage}={}ms", spent.as_millis()))
            .collect();
        info!(
            steps = outcome.observations.len(),
            stop_reason = ?outcome.stop_reason,
            sources = extracted.sources.len(),
            degraded = !degradations.is_empty(),
            stages = %timings.join(" "),
            "Research run complete"
        );

        FinalAnswer {
            query: query.to_string(),
            answer,
            sources: extracted.sources,
            metadata: AnswerMetadata {
                execution_time_ms: execution_time.as_millis() as u64,
                steps: outcome.observations.len(),
                stop_reason: outcome.stop_reason,
                confidence: analysis.as_ref().map(|a| a.confidence_score),
                quality: analysis
                    .as_ref()
                    .map(|a| a.data_quality)
                    .unwrap_or(QualityRating::Low),
                timestamp: now_millis(),
                degradations,
            },
            analysis,
        }
    }

    /// Record the run in memory. The append itself never fails; this guards
    /// against a panicking embedder or summarizer and bounds the wait.
    async fn store(
        &self,
        query: &str,
        answer: &str,
        extracted: &ExtractedData,
        analysis: Option<&AnalysisResult>,
        execution_time: Duration,
    ) -> std::result::Result<(), String> {
        let analysis = match analysis.map(serde_json::to_value).transpose() {
            Ok(value) => value,
            Err(e) => return Err(format!("analysis not serializable: {e}")),
        };
        let metadata = InteractionMetadata {
            sources: extracted.sources.clone(),
            analysis,
            duration_ms: execution_time.as_millis() as u64,
        };

        let memory = self.memory.clone();
        let query = query.to_string();
        let answer = answer.to_string();
        let handle = tokio::spawn(async move {
            memory.add_interaction(&query, &answer, metadata).await;
        });

        // Summary and rebuild are each bounded by the call timeout.
        let limit = Duration::from_millis(self.config.memory.call_timeout_ms.saturating_mul(2))
            + Duration::from_secs(1);
        match tokio::time::timeout(limit, handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("memory append aborted: {e}")),
            Err(_) => Err(format!(
                "memory append still running after {}ms",
                limit.as_millis()
            )),
        }
    }
}

fn degrade(
    degradations: &mut Vec<Degradation>,
    stage: PipelineStage,
    degradation: Degradation,
    reason: &str,
) {
    warn!(%stage, ?degradation, reason, "Pipeline degraded");
    degradations.push(degradation);
}

/// Short-term interactions as alternating user/assistant turns, oldest first.
fn chat_history(interactions: &[Arc<Interaction>]) -> Vec<ChatMessage> {
    interactions
        .iter()
        .flat_map(|interaction| {
            [
                ChatMessage::user(interaction.query.clone()),
                ChatMessage::assistant(truncate_chars(&interaction.response, HISTORY_RESPONSE_CHARS)),
            ]
        })
        .collect()
}

/// Answer used when synthesis fails: the raw evidence, else the reasoner's
/// draft, else an explanation. Never empty.
fn fallback_answer(query: &str, extracted: &ExtractedData, draft: Option<&str>) -> String {
    if !extracted.is_empty() {
        return format!(
            "## Executive Summary\nSynthesis was unavailable for \"{query}\"; \
             the research data gathered is shown unprocessed below.\n\n\
             ## Collected Data\n{}",
            extracted.collected_data
        );
    }
    match draft.map(str::trim).filter(|d| !d.is_empty()) {
        Some(draft) => draft.to_string(),
        None => format!(
            "Unable to research \"{query}\": no data could be gathered and no answer \
             could be synthesized. Check the tool server and language model \
             configuration, then try again."
        ),
    }
}
