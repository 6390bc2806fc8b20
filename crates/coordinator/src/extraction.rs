//! Turns tool observations into the collected-data text and a source list.

use std::sync::LazyLock;

use lumen_common::{ObservationRecord, Source};
use regex::Regex;
use serde::{Deserialize, Serialize};

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'()\[\]{}]+"#).unwrap());

/// Output of the extraction stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    /// Deduplicated, in discovery order, at most `max_sources`
    pub sources: Vec<Source>,
    /// `[tool]\noutput\n` pieces joined by `\n---\n`; empty when nothing
    /// relevant was observed
    pub collected_data: String,
    /// Observations that contributed to `collected_data`
    pub relevant_count: usize,
}

impl ExtractedData {
    pub fn is_empty(&self) -> bool {
        self.collected_data.is_empty()
    }
}

/// Extract sources and collected data from the tool loop's observations.
///
/// Failed and near-empty observations contribute neither data nor URLs, but
/// every invoked tool is still listed as a source.
pub fn extract(observations: &[ObservationRecord], max_sources: usize) -> ExtractedData {
    let mut pieces = Vec::new();
    let mut sources: Vec<Source> = Vec::new();

    let mut push_source = |source: Source| {
        if sources.len() < max_sources && !sources.contains(&source) {
            sources.push(source);
        }
    };

    for observation in observations {
        if observation.relevant && !observation.is_error {
            pieces.push(format!("[{}]\n{}\n", observation.tool, observation.output));
            for url in URL_PATTERN.find_iter(&observation.output) {
                let url = url.as_str().trim_end_matches(['.', ',', ';', ':']);
                push_source(Source::url(url));
            }
        }
        push_source(Source::tool(&observation.tool));
    }

    ExtractedData {
        relevant_count: pieces.len(),
        collected_data: pieces.join("\n---\n"),
        sources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obs(tool: &str, output: &str) -> ObservationRecord {
        ObservationRecord::new(tool, json!({}), output)
    }

    const WIKI: &str = "Quantum entanglement is a phenomenon in which particles share a state. See https://en.wikipedia.org/wiki/Quantum_entanglement.";
    const SEARCH: &str = "Results: https://www.nobelprize.org/prizes/physics/2022/ and https://en.wikipedia.org/wiki/Quantum_entanglement";

    #[test]
    fn empty_input_gives_empty_output() {
        let extracted = extract(&[], 10);
        assert!(extracted.is_empty());
        assert!(extracted.sources.is_empty());
        assert_eq!(extracted.relevant_count, 0);
    }

    #[test]
    fn blob_format_and_source_order() {
        let extracted = extract(&[obs("wikipedia", WIKI), obs("web_search", SEARCH)], 10);

        assert_eq!(
            extracted.collected_data,
            format!("[wikipedia]\n{WIKI}\n\n---\n[web_search]\n{SEARCH}\n")
        );
        assert_eq!(
            extracted.sources,
            vec![
                Source::url("https://en.wikipedia.org/wiki/Quantum_entanglement"),
                Source::tool("wikipedia"),
                Source::url("https://www.nobelprize.org/prizes/physics/2022/"),
                Source::tool("web_search"),
            ]
        );
    }

    #[test]
    fn irrelevant_and_failed_observations_are_filtered() {
        let failed = ObservationRecord::failed(
            "web_scraper",
            json!({"url": "https://down.example"}),
            "web_scraper failed: 503 at https://down.example for a long while, retry later please",
        );
        let extracted = extract(&[obs("wikipedia", "short"), failed], 10);

        assert!(extracted.is_empty());
        assert_eq!(
            extracted.sources,
            vec![Source::tool("wikipedia"), Source::tool("web_scraper")]
        );
    }

    #[test]
    fn sources_are_capped() {
        let output = (0..20)
            .map(|i| format!("https://site{i}.example/page"))
            .collect::<Vec<_>>()
            .join(" ");
        let extracted = extract(&[obs("web_search", &output)], 10);
        assert_eq!(extracted.sources.len(), 10);
        assert_eq!(extracted.sources[0], Source::url("https://site0.example/page"));
    }

    #[test]
    fn urls_stop_at_delimiters_and_trailing_punctuation() {
        let output = r#"See (https://a.example/x), "https://b.example/y"; <https://c.example/z>. Also [https://d.example]."#;
        let urls: Vec<&str> = URL_PATTERN.find_iter(output).map(|m| m.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://a.example/x",
                "https://b.example/y",
                "https://c.example/z",
                "https://d.example",
            ]
        );

        let extracted = extract(&[obs("web_search", output)], 10);
        assert_eq!(extracted.sources.len(), 5);
        assert_eq!(extracted.sources[0], Source::url("https://a.example/x"));
        assert_eq!(extracted.sources[4], Source::tool("web_search"));
    }
}
