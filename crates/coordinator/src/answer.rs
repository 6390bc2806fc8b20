//! The final answer document.

use std::fmt::Write as _;

use lumen_agents::{AnalysisResult, StopReason};
use lumen_common::{QualityRating, Source};
use serde::{Deserialize, Serialize};

/// A fallback the pipeline took instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Degradation {
    /// Disabled by configuration or nothing to analyze
    AnalysisSkipped,
    AnalysisFailed,
    /// Answer built from raw data instead of synthesis
    SynthesisFallback,
    MemoryStoreFailed,
    ReasonerFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerMetadata {
    pub execution_time_ms: u64,
    /// Tool invocations made by the reasoner loop
    pub steps: usize,
    pub stop_reason: StopReason,
    pub confidence: Option<f64>,
    /// `Low` when no analysis ran
    pub quality: QualityRating,
    /// Unix millis at completion
    pub timestamp: u64,
    #[serde(default)]
    pub degradations: Vec<Degradation>,
}

/// What `run` returns, on every path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub query: String,
    /// Answer body, without the source list or metadata block
    pub answer: String,
    pub sources: Vec<Source>,
    pub analysis: Option<AnalysisResult>,
    pub metadata: AnswerMetadata,
}

impl FinalAnswer {
    pub fn is_degraded(&self) -> bool {
        !self.metadata.degradations.is_empty()
    }

    /// Full document: body, numbered sources, metadata block.
    pub fn render(&self) -> String {
        let mut out = self.answer.trim_end().to_string();

        if !self.sources.is_empty() {
            out.push_str("\n\n## Sources\n");
            for (i, source) in self.sources.iter().enumerate() {
                let _ = writeln!(out, "{}. {}", i + 1, source);
            }
        }

        let meta = &self.metadata;
        out.push_str("\n---\n");
        let _ = writeln!(out, "Execution time: {:.2}s", meta.execution_time_ms as f64 / 1000.0);
        let _ = writeln!(out, "Steps: {}", meta.steps);
        match meta.confidence {
            Some(confidence) => {
                let _ = writeln!(out, "Confidence: {confidence:.2}");
            }
            None => out.push_str("Confidence: n/a\n"),
        }
        let _ = writeln!(out, "Quality: {}", meta.quality);
        if !meta.degradations.is_empty() {
            let labels: Vec<String> = meta
                .degradations
                .iter()
                .map(|d| format!("{d:?}"))
                .collect();
            let _ = writeln!(out, "Degraded: {}", labels.join(", "));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(sources: Vec<Source>, degradations: Vec<Degradation>) -> FinalAnswer {
        FinalAnswer {
            query: "q".into(),
            answer: "## Executive Summary\nBody.\n".into(),
            sources,
            analysis: None,
            metadata: AnswerMetadata {
                execution_time_ms: 1234,
                steps: 2,
                stop_reason: StopReason::Completed,
                confidence: Some(0.8),
                quality: QualityRating::High,
                timestamp: 0,
                degradations,
            },
        }
    }

    #[test]
    fn render_numbers_sources_and_appends_metadata() {
        let rendered = answer(
            vec![Source::url("https://a.org"), Source::tool("wikipedia")],
            vec![],
        )
        .render();

        assert_eq!(
            rendered,
            "## Executive Summary\nBody.\n\n## Sources\n1. https://a.org\n2. Tool: wikipedia\n\n---\n\
             Execution time: 1.23s\nSteps: 2\nConfidence: 0.80\nQuality: High\n"
        );
    }

    #[test]
    fn render_lists_degradations_and_skips_empty_sources() {
        let rendered = answer(vec![], vec![Degradation::AnalysisFailed]).render();
        assert!(!rendered.contains("## Sources"));
        assert!(rendered.ends_with("Degraded: AnalysisFailed\n"));
    }

    #[test]
    fn serializes_degradations_snake_case() {
        let json = serde_json::to_value(answer(vec![], vec![Degradation::SynthesisFallback])).unwrap();
        assert_eq!(json["metadata"]["degradations"][0], "synthesis_fallback");
        assert_eq!(json["metadata"]["stop_reason"], "completed");
    }
}
