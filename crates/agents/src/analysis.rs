//! Deep analysis: structured findings and a quality check, computed
//! concurrently over the same collected data.

use std::sync::Arc;

use lumen_common::{truncate_chars, LumenError, QualityRating, Result, Source};
use lumen_llm::{retry_transient, LlmClient, LlmRequest, RetryPolicy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::reasoner::extract_json_object;

const ANALYST_SYSTEM_PROMPT: &str = r#"You are a professional research analyst.

Your job:
1. Analyze the provided data objectively
2. Identify important patterns, trends and insights
3. Assess the quality and reliability of the data
4. Recommend next steps

Always:
- Ground claims in specific evidence
- Separate facts from opinions
- Point out gaps in the data
- Suggest how the information could be verified"#;

const QUALITY_SYSTEM_PROMPT: &str = r#"You assess the quality of research data.

Check:
1. Completeness: is there enough information?
2. Reliability: are the sources trustworthy?
3. Consistency: do the sources contradict each other?
4. Recency: is the information current?"#;

/// Settings for the analysis stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    #[serde(default = "default_true")]
    pub enable_deep_analysis: bool,

    /// Collected data beyond this length is cut before analysis
    #[serde(default = "default_max_data_chars")]
    pub max_data_chars: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_data_chars() -> usize {
    3000
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            enable_deep_analysis: true,
            max_data_chars: default_max_data_chars(),
        }
    }
}

/// Quality judgments from the second analysis computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityCheck {
    pub completeness: QualityRating,
    pub reliability: QualityRating,
    /// No contradictions between sources
    pub consistent: bool,
    /// Information is current
    pub recent: bool,
    pub overall: QualityRating,
    #[serde(default)]
    pub notes: String,
}

/// Output of the analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub key_findings: Vec<String>,
    /// In [0, 1]
    pub confidence_score: f64,
    pub data_quality: QualityRating,
    pub recommendations: Vec<String>,
    pub sources_used: Vec<String>,
    pub quality_check: QualityCheck,
}

#[derive(Debug, Clone, Copy)]
pub struct AnalysisInput<'a> {
    pub query: &'a str,
    pub data: &'a str,
    pub sources: &'a [Source],
}

#[derive(Deserialize)]
struct RawStructured {
    key_findings: Vec<String>,
    data_quality: String,
    confidence_score: f64,
    #[serde(default)]
    recommendations: Vec<String>,
    #[serde(default)]
    sources_used: Vec<String>,
}

#[derive(Debug)]
struct StructuredAnalysis {
    key_findings: Vec<String>,
    data_quality: QualityRating,
    confidence_score: f64,
    recommendations: Vec<String>,
    sources_used: Vec<String>,
}

#[derive(Deserialize)]
struct RawQuality {
    completeness: String,
    reliability: String,
    consistent: bool,
    recent: bool,
    overall: String,
    #[serde(default)]
    notes: String,
}

fn rating(field: &str, value: &str) -> Result<QualityRating> {
    QualityRating::parse_lenient(value).ok_or_else(|| {
        LumenError::SchemaValidation(format!("{field}: expected high/medium/low, got '{value}'"))
    })
}

fn parse_structured(text: &str) -> Result<StructuredAnalysis> {
    let json = extract_json_object(text)
        .ok_or_else(|| LumenError::SchemaValidation("structured analysis: no JSON object".into()))?;
    let raw: RawStructured = serde_json::from_str(json)
        .map_err(|e| LumenError::SchemaValidation(format!("structured analysis: {e}")))?;

    if !(0.0..=1.0).contains(&raw.confidence_score) {
        return Err(LumenError::SchemaValidation(format!(
            "confidence_score {} outside [0, 1]",
            raw.confidence_score
        )));
    }

    Ok(StructuredAnalysis {
        data_quality: rating("data_quality", &raw.data_quality)?,
        key_findings: raw.key_findings,
        confidence_score: raw.confidence_score,
        recommendations: raw.recommendations,
        sources_used: raw.sources_used,
    })
}

fn parse_quality(text: &str) -> Result<QualityCheck> {
    let json = extract_json_object(text)
        .ok_or_else(|| LumenError::SchemaValidation("quality check: no JSON object".into()))?;
    let raw: RawQuality = serde_json::from_str(json)
        .map_err(|e| LumenError::SchemaValidation(format!("quality check: {e}")))?;

    Ok(QualityCheck {
        completeness: rating("completeness", &raw.completeness)?,
        reliability: rating("reliability", &raw.reliability)?,
        consistent: raw.consistent,
        recent: raw.recent,
        overall: rating("overall", &raw.overall)?,
        notes: raw.notes,
    })
}

pub struct AnalysisStage {
    client: Arc<dyn LlmClient>,
    retry: RetryPolicy,
    settings: AnalysisSettings,
}

impl AnalysisStage {
    pub fn new(client: Arc<dyn LlmClient>, retry: RetryPolicy, settings: AnalysisSettings) -> Self {
        Self {
            client,
            retry,
            settings,
        }
    }

    fn structured_request(&self, input: &AnalysisInput<'_>, data: &str, sources: &str) -> LlmRequest {
        let user = format!(
            "Analyze the following data.\n\nTOPIC: {}\n\nDATA COLLECTED:\n{}\n\nSOURCES:\n{}\n\n\
             Return a JSON object with the fields:\n\
             - key_findings: list of the main findings\n\
             - data_quality: \"high\", \"medium\" or \"low\"\n\
             - confidence_score: number from 0 to 1\n\
             - recommendations: list of recommendations\n\
             - sources_used: list of the sources used",
            input.query, data, sources
        );
        LlmRequest::prompt(ANALYST_SYSTEM_PROMPT, user)
    }

    fn quality_request(&self, data: &str, sources: &str) -> LlmRequest {
        let user = format!(
            "Assess the quality of this data.\n\nDATA: {}\nSOURCES: {}\n\n\
             Return a JSON object with the fields:\n\
             - completeness: \"high\", \"medium\" or \"low\"\n\
             - reliability: \"high\", \"medium\" or \"low\"\n\
             - consistent: true if the sources agree\n\
             - recent: true if the information is current\n\
             - overall: \"high\", \"medium\" or \"low\"\n\
             - notes: one or two sentences of explanation",
            data, sources
        );
        LlmRequest::prompt(QUALITY_SYSTEM_PROMPT, user)
    }

    /// Run both computations concurrently. Fails if either fails after
    /// retries; there is no partial result.
    #[instrument(skip(self, input), fields(data_len = input.data.len(), sources = input.sources.len()))]
    pub async fn analyze(&self, input: &AnalysisInput<'_>) -> Result<AnalysisResult> {
        let data = truncate_chars(input.data, self.settings.max_data_chars);
        let sources = input
            .sources
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");

        let structured_request = self.structured_request(input, data, &sources);
        let quality_request = self.quality_request(data, &sources);

        let structured = retry_transient(&self.retry, "structured_analysis", || {
            let request = structured_request.clone();
            async move {
                let response = self.client.complete(request).await?;
                parse_structured(&response.content)
            }
        });
        let quality = retry_transient(&self.retry, "quality_check", || {
            let request = quality_request.clone();
            async move {
                let response = self.client.complete(request).await?;
                parse_quality(&response.content)
            }
        });

        let (structured, quality_check) = tokio::try_join!(structured, quality)?;

        debug!(
            findings = structured.key_findings.len(),
            confidence = structured.confidence_score,
            "Analysis parsed"
        );
        info!(
            data_quality = %structured.data_quality,
            overall = %quality_check.overall,
            "Analysis completed"
        );

        Ok(AnalysisResult {
            key_findings: structured.key_findings,
            confidence_score: structured.confidence_score,
            data_quality: structured.data_quality,
            recommendations: structured.recommendations,
            sources_used: structured.sources_used,
            quality_check,
        })
    }
}
