//! Formatting of recalled interactions for prompts.

use std::sync::Arc;

use lumen_common::truncate_chars;
use tracing::debug;

use crate::types::Interaction;

/// Render past interactions as a compact prompt block, stopping before the
/// block exceeds `max_chars`. Returns an empty string when nothing fits.
pub fn format_context(interactions: &[Arc<Interaction>], max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut used = 0;

    for interaction in interactions {
        let part = format_interaction(interaction);
        let len = part.chars().count();
        if used + len > max_chars {
            break;
        }
        used += len;
        parts.push(part);
    }

    debug!(
        included = parts.len(),
        available = interactions.len(),
        chars = used,
        "Built past context"
    );

    parts.join("\n\n")
}

fn format_interaction(interaction: &Interaction) -> String {
    format!(
        "Previous query: {}\nPrevious answer: {}",
        interaction.query,
        truncate(&interaction.response, 300)
    )
}

fn truncate(s: &str, max_chars: usize) -> String {
    let head = truncate_chars(s, max_chars);
    if head.len() < s.len() {
        format!("{head}...")
    } else {
        s.to_string()
    }
}
