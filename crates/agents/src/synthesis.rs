//! Final answer synthesis.
//!
//! One model call combines the query, collected data, analysis and past
//! context into the answer document. Source citations are not requested
//! from the model; the pipeline appends them afterwards.

use std::sync::Arc;

use lumen_common::{truncate_chars, LumenError, Result};
use lumen_llm::{retry_transient, LlmClient, LlmRequest, RetryPolicy};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::analysis::AnalysisResult;

/// Headings every synthesized answer is expected to contain, in order.
pub const REQUIRED_SECTIONS: [&str; 5] = [
    "Executive Summary",
    "Main Findings",
    "Analysis & Insights",
    "Limitations & Gaps",
    "Recommendations",
];

const ANALYSIS_UNAVAILABLE: &str = "Analysis unavailable.";

const SYNTHESIS_SYSTEM_PROMPT: &str = r#"You are an expert research synthesizer.

Task: combine all research findings into one complete, coherent answer.

Guidelines:
1. Integrate information from multiple sources smoothly
2. Highlight key insights and important findings
3. Acknowledge uncertainty and conflicting information
4. Cite sources when referencing specific facts
5. End with actionable insights or recommendations

Format the answer in Markdown with exactly these sections:
## Executive Summary
(2-3 sentences)
## Main Findings
(organized by theme)
## Analysis & Insights
## Limitations & Gaps
## Recommendations

Do not add a sources section; it is appended separately."#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisSettings {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_findings_chars")]
    pub max_findings_chars: usize,

    #[serde(default = "default_max_past_context_chars")]
    pub max_past_context_chars: usize,
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_findings_chars() -> usize {
    2000
}

fn default_max_past_context_chars() -> usize {
    500
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_findings_chars: default_max_findings_chars(),
            max_past_context_chars: default_max_past_context_chars(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub query: &'a str,
    pub findings: &'a str,
    pub analysis: Option<&'a AnalysisResult>,
    pub past_context: &'a str,
}

/// Section headings from [`REQUIRED_SECTIONS`] that `answer` lacks.
pub fn missing_sections(answer: &str) -> Vec<&'static str> {
    let lower = answer.to_lowercase();
    REQUIRED_SECTIONS
        .iter()
        .copied()
        .filter(|section| !lower.contains(&section.to_lowercase()))
        .collect()
}

pub struct SynthesisStage {
    client: Arc<dyn LlmClient>,
    retry: RetryPolicy,
    settings: SynthesisSettings,
}

impl SynthesisStage {
    pub fn new(client: Arc<dyn LlmClient>, retry: RetryPolicy, settings: SynthesisSettings) -> Self {
        Self {
            client,
            retry,
            settings,
        }
    }

    fn build_request(&self, input: &SynthesisInput<'_>) -> Result<LlmRequest> {
        let analysis = match input.analysis {
            Some(result) => serde_json::to_string_pretty(result)?,
            None => ANALYSIS_UNAVAILABLE.to_string(),
        };
        let findings = if input.findings.trim().is_empty() {
            "No data collected"
        } else {
            truncate_chars(input.findings, self.settings.max_findings_chars)
        };
        let past_context = if input.past_context.trim().is_empty() {
            "None"
        } else {
            truncate_chars(input.past_context, self.settings.max_past_context_chars)
        };

        let user = format!(
            "ORIGINAL QUERY: {}\n\nRESEARCH FINDINGS:\n{}\n\nANALYSIS RESULTS:\n{}\n\n\
             RELEVANT PAST CONTEXT:\n{}\n\nCombine all of this into one comprehensive answer.",
            input.query, findings, analysis, past_context
        );

        Ok(LlmRequest::prompt(SYNTHESIS_SYSTEM_PROMPT, user).with_temperature(self.settings.temperature))
    }

    /// Produce the answer body. Empty model output is a schema failure;
    /// missing headings are only logged.
    #[instrument(skip(self, input), fields(findings_len = input.findings.len(), has_analysis = input.analysis.is_some()))]
    pub async fn synthesize(&self, input: &SynthesisInput<'_>) -> Result<String> {
        let request = self.build_request(input)?;

        let answer = retry_transient(&self.retry, "synthesis", || {
            let request = request.clone();
            async move {
                let response = self.client.complete(request).await?;
                let text = response.content.trim().to_string();
                if text.is_empty() {
                    return Err(LumenError::SchemaValidation("empty synthesis output".into()));
                }
                Ok(text)
            }
        })
        .await?;

        let missing = missing_sections(&answer);
        if !missing.is_empty() {
            warn!(missing = ?missing, "Synthesized answer lacks expected sections");
        }
        info!(answer_len = answer.len(), "Synthesis completed");
        Ok(answer)
    }
}
