//! Running conversation summary strategies.
//!
//! The summary is replaced after every interaction with
//! `summarize(previous, interaction)`.

use std::sync::Arc;

use async_trait::async_trait;
use lumen_common::{truncate_chars, LumenError, Result};
use lumen_llm::{LlmClient, LlmRequest};

use crate::types::Interaction;

const SUMMARY_SYSTEM_PROMPT: &str = r#"You maintain a running summary of a research conversation.
Given the current summary and the newest exchange, return an updated summary that:
- keeps the topics researched and the key conclusions reached
- drops details that later exchanges superseded
- stays under the requested length

Return only the summary text."#;

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, previous: &str, interaction: &Interaction) -> Result<String>;
}

/// Deterministic summary: one line per exchange, oldest lines dropped once
/// the summary exceeds `max_chars`.
#[derive(Debug, Clone)]
pub struct TruncatingSummarizer {
    max_chars: usize,
}

impl TruncatingSummarizer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn summarize_now(&self, previous: &str, interaction: &Interaction) -> String {
        let first_line = interaction
            .response
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && !line.starts_with('#'))
            .unwrap_or("");
        let entry = format!(
            "- Q: {} -> A: {}",
            truncate_chars(interaction.query.trim(), 120),
            truncate_chars(first_line, 160)
        );

        let mut lines: Vec<&str> = previous.lines().filter(|l| !l.is_empty()).collect();
        lines.push(&entry);

        while lines.len() > 1 && joined_len(&lines) > self.max_chars {
            lines.remove(0);
        }

        let summary = lines.join("\n");
        truncate_chars(&summary, self.max_chars).to_string()
    }
}

fn joined_len(lines: &[&str]) -> usize {
    lines.iter().map(|l| l.chars().count()).sum::<usize>() + lines.len().saturating_sub(1)
}

#[async_trait]
impl Summarizer for TruncatingSummarizer {
    async fn summarize(&self, previous: &str, interaction: &Interaction) -> Result<String> {
        Ok(self.summarize_now(previous, interaction))
    }
}

/// Progressive summary written by the language model.
pub struct LlmSummarizer {
    client: Arc<dyn LlmClient>,
    max_chars: usize,
}

impl LlmSummarizer {
    pub fn new(client: Arc<dyn LlmClient>, max_chars: usize) -> Self {
        Self { client, max_chars }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, previous: &str, interaction: &Interaction) -> Result<String> {
        let user = format!(
            "CURRENT SUMMARY:\n{}\n\nNEW EXCHANGE:\nQuery: {}\nAnswer: {}\n\nMaximum length: {} characters.",
            if previous.is_empty() { "(none)" } else { previous },
            interaction.query,
            truncate_chars(&interaction.response, 2000),
            self.max_chars
        );

        let response = self
            .client
            .complete(LlmRequest::prompt(SUMMARY_SYSTEM_PROMPT, user).with_temperature(0.0))
            .await?;

        let summary = response.content.trim();
        if summary.is_empty() {
            return Err(LumenError::SchemaValidation("empty summary".into()));
        }
        Ok(truncate_chars(summary, self.max_chars).to_string())
    }
}
