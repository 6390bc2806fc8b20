//! Hybrid memory store: a bounded recent-turn buffer, a running summary and a
//! semantic index that is rebuilt every `rebuild_interval` interactions.
//!
//! The index is not refreshed on every append. Between rebuilds it lags the
//! interaction log by at most `rebuild_interval - 1` interactions; semantic
//! retrieval during that window reflects the log as of the last rebuild.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::embedding::{Embedder, EmbeddingError};
use crate::index::SemanticIndex;
use crate::summary::{Summarizer, TruncatingSummarizer};
use crate::types::{Interaction, InteractionMetadata, MemoryConfig, MemoryStats};

struct MemoryState {
    short_term: VecDeque<Arc<Interaction>>,
    /// Every interaction ever recorded, oldest first
    log: Vec<Arc<Interaction>>,
    summary: String,
    counter: u64,
    index: Arc<SemanticIndex>,
    long_term_enabled: bool,
    /// Toggle requested mid-session, applied at the next append
    pending_long_term: Option<bool>,
    rebuild_count: u64,
    last_rebuild_at: Option<u64>,
}

impl MemoryState {
    fn new(long_term_enabled: bool) -> Self {
        Self {
            short_term: VecDeque::new(),
            log: Vec::new(),
            summary: String::new(),
            counter: 0,
            index: Arc::new(SemanticIndex::empty()),
            long_term_enabled,
            pending_long_term: None,
            rebuild_count: 0,
            last_rebuild_at: None,
        }
    }
}

/// The conversational memory of one session.
///
/// Sole owner of interaction records and of the semantic index. Mutations are
/// serialized by an internal lock, so a store may be shared between tasks.
pub struct MemoryStore {
    config: MemoryConfig,
    embedder: Arc<dyn Embedder>,
    summarizer: Arc<dyn Summarizer>,
    fallback_summarizer: TruncatingSummarizer,
    state: RwLock<MemoryState>,
    /// Held for the whole of `add_interaction`, including any rebuild
    write_lock: Mutex<()>,
}

impl MemoryStore {
    /// Create a store that keeps a deterministic, truncation-based summary.
    pub fn new(config: MemoryConfig, embedder: Arc<dyn Embedder>) -> Self {
        let summarizer = Arc::new(TruncatingSummarizer::new(config.summary_max_chars));
        Self::with_summarizer(config, embedder, summarizer)
    }

    pub fn with_summarizer(
        config: MemoryConfig,
        embedder: Arc<dyn Embedder>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        info!(
            memory_window = config.memory_window,
            rebuild_interval = config.rebuild_interval,
            long_term = config.enable_long_term_memory,
            "Initializing memory store"
        );

        Self {
            fallback_summarizer: TruncatingSummarizer::new(config.summary_max_chars),
            state: RwLock::new(MemoryState::new(config.enable_long_term_memory)),
            write_lock: Mutex::new(()),
            config,
            embedder,
            summarizer,
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.config.call_timeout_ms)
    }

    /// Up to K most recent interactions, oldest first.
    pub async fn get_short_term_history(&self) -> Vec<Arc<Interaction>> {
        self.state.read().await.short_term.iter().cloned().collect()
    }

    /// Up to `top_k` past interactions most similar to `query`.
    ///
    /// Returns an empty list when long-term memory is disabled, the index is
    /// empty, or the query cannot be embedded.
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn get_relevant_context(&self, query: &str, top_k: usize) -> Vec<Arc<Interaction>> {
        let index = {
            let state = self.state.read().await;
            if !state.long_term_enabled || state.index.is_empty() {
                return Vec::new();
            }
            state.index.clone()
        };

        if top_k == 0 {
            return Vec::new();
        }

        let vector = match tokio::time::timeout(self.call_timeout(), self.embedder.embed(query)).await {
            Ok(Ok(vector)) => vector,
            Ok(Err(e)) => {
                warn!(error = %e, "Query embedding failed, continuing without past context");
                return Vec::new();
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.call_timeout_ms,
                    "Query embedding timed out, continuing without past context"
                );
                return Vec::new();
            }
        };

        let results: Vec<Arc<Interaction>> = index
            .search(&vector, top_k)
            .into_iter()
            .map(|(interaction, score)| {
                debug!(interaction = %interaction.id, score, "Relevant past interaction");
                interaction
            })
            .collect();

        debug!(
            returned = results.len(),
            indexed = index.len(),
            "Semantic retrieval complete"
        );
        results
    }

    /// Record a completed interaction. Never fails.
    ///
    /// Computes the next running summary first, then publishes the turn and
    /// that summary together: readers see both or neither. The turn goes to
    /// the short-term buffer (evicting the oldest beyond K) and the log, and
    /// every `rebuild_interval`-th call rebuilds the semantic index from the
    /// full log. A failed rebuild keeps the previous index; the interaction
    /// stays stored.
    #[instrument(skip_all, fields(query_len = query.len()))]
    pub async fn add_interaction(&self, query: &str, response: &str, metadata: InteractionMetadata) {
        let _write = self.write_lock.lock().await;

        // Appends and clears hold `write_lock`, so the counter cannot move
        // while the summary is computed.
        let (interaction, previous_summary) = {
            let state = self.state.read().await;
            let interaction = Arc::new(Interaction::new(state.counter + 1, query, response, metadata));
            (interaction, state.summary.clone())
        };
        let summary = self.next_summary(&previous_summary, &interaction).await;

        let rebuild_snapshot = {
            let mut state = self.state.write().await;

            if let Some(enabled) = state.pending_long_term.take() {
                info!(enabled, "Applying long-term memory toggle");
                state.long_term_enabled = enabled;
            }

            state.counter = interaction.sequence;
            state.summary = summary;
            state.short_term.push_back(interaction.clone());
            while state.short_term.len() > self.config.memory_window.max(1) {
                if let Some(evicted) = state.short_term.pop_front() {
                    debug!(interaction = %evicted.id, "Evicted from short-term memory");
                }
            }
            state.log.push(interaction.clone());

            let interval = self.config.rebuild_interval.max(1);
            let snapshot = (state.long_term_enabled && state.counter % interval == 0)
                .then(|| state.log.clone());

            debug!(
                interaction = %interaction.id,
                counter = state.counter,
                short_term_len = state.short_term.len(),
                rebuild = snapshot.is_some(),
                "Interaction stored"
            );

            snapshot
        };

        if let Some(snapshot) = rebuild_snapshot {
            let at = interaction.sequence;
            match self.rebuild_index(snapshot).await {
                Ok(index) => {
                    let mut state = self.state.write().await;
                    info!(indexed = index.len(), at, "Semantic index rebuilt");
                    state.index = Arc::new(index);
                    state.rebuild_count += 1;
                    state.last_rebuild_at = Some(at);
                }
                Err(e) => {
                    error!(error = %e, at, "Semantic index rebuild failed, keeping previous index");
                }
            }
        }
    }

    async fn next_summary(&self, previous: &str, interaction: &Interaction) -> String {
        match tokio::time::timeout(
            self.call_timeout(),
            self.summarizer.summarize(previous, interaction),
        )
        .await
        {
            Ok(Ok(summary)) => summary,
            Ok(Err(e)) => {
                warn!(error = %e, "Summary update failed, using truncating summary");
                self.fallback_summarizer.summarize_now(previous, interaction)
            }
            Err(_) => {
                warn!("Summary update timed out, using truncating summary");
                self.fallback_summarizer.summarize_now(previous, interaction)
            }
        }
    }

    #[instrument(skip_all, fields(documents = interactions.len()))]
    async fn rebuild_index(
        &self,
        interactions: Vec<Arc<Interaction>>,
    ) -> Result<SemanticIndex, EmbeddingError> {
        let documents: Vec<String> = interactions.iter().map(|i| i.document_text()).collect();
        let texts: Vec<&str> = documents.iter().map(String::as_str).collect();

        let vectors = tokio::time::timeout(self.call_timeout(), self.embedder.embed_batch(&texts))
            .await
            .map_err(|_| EmbeddingError::Timeout(self.config.call_timeout_ms))??;

        SemanticIndex::build(interactions, vectors)
    }

    pub async fn get_summary(&self) -> String {
        self.state.read().await.summary.clone()
    }

    /// Request enabling or disabling semantic memory. Takes effect at the
    /// next `add_interaction`; until then retrieval behaves as before.
    pub async fn set_long_term_enabled(&self, enabled: bool) {
        let mut state = self.state.write().await;
        if state.long_term_enabled == enabled {
            state.pending_long_term = None;
        } else {
            state.pending_long_term = Some(enabled);
        }
    }

    pub async fn stats(&self) -> MemoryStats {
        let state = self.state.read().await;
        MemoryStats {
            short_term_len: state.short_term.len(),
            total_interactions: state.counter,
            indexed_interactions: state.index.len(),
            rebuild_count: state.rebuild_count,
            last_rebuild_at: state.last_rebuild_at,
            long_term_enabled: state.long_term_enabled,
            summary_preview: state.summary.chars().take(200).collect(),
        }
    }

    /// Forget everything: buffer, summary, log, index and counters.
    pub async fn clear(&self) {
        let _write = self.write_lock.lock().await;
        let mut state = self.state.write().await;
        let enabled = state.pending_long_term.take().unwrap_or(state.long_term_enabled);
        *state = MemoryState::new(enabled);
        info!("Memory cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// One dimension per known keyword.
    struct KeywordEmbedder {
        batch_calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl KeywordEmbedder {
        fn new() -> Self {
            Self {
                batch_calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            }
        }
    }

    const KEYWORDS: [&str; 4] = ["quantum", "rust", "economy", "music"];

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(EmbeddingError::Generation("offline".into()));
            }
            let lower = text.to_lowercase();
            Ok(KEYWORDS
                .iter()
                .map(|k| if lower.contains(k) { 1.0 } else { 0.0 })
                .collect())
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            let mut out = Vec::new();
            for t in texts {
                out.push(self.embed(t).await?);
            }
            Ok(out)
        }
    }

    fn config(window: usize, interval: u64) -> MemoryConfig {
        MemoryConfig {
            memory_window: window,
            rebuild_interval: interval,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn short_term_keeps_last_k_in_order() {
        let store = MemoryStore::new(config(3, 5), Arc::new(KeywordEmbedder::new()));
        for i in 1..=7 {
            store
                .add_interaction(&format!("q{i}"), "a", InteractionMetadata::default())
                .await;
        }
        let history: Vec<String> = store
            .get_short_term_history()
            .await
            .iter()
            .map(|i| i.query.clone())
            .collect();
        assert_eq!(history, vec!["q5", "q6", "q7"]);
    }

    #[tokio::test]
    async fn empty_store_returns_no_context() {
        let store = MemoryStore::new(config(3, 5), Arc::new(KeywordEmbedder::new()));
        assert!(store.get_relevant_context("quantum", 3).await.is_empty());
        assert!(store.get_short_term_history().await.is_empty());
    }

    #[tokio::test]
    async fn rebuild_happens_on_interval_boundaries_only() {
        let embedder = Arc::new(KeywordEmbedder::new());
        let store = MemoryStore::new(config(10, 3), embedder.clone());

        for i in 1..=2 {
            store
                .add_interaction(&format!("quantum {i}"), "a", InteractionMetadata::default())
                .await;
        }
        assert_eq!(embedder.batch_calls.load(Ordering::SeqCst), 0);
        assert!(store.get_relevant_context("quantum", 3).await.is_empty());

        store
            .add_interaction("quantum 3", "a", InteractionMetadata::default())
            .await;
        assert_eq!(embedder.batch_calls.load(Ordering::SeqCst), 1);
        let stats = store.stats().await;
        assert_eq!(stats.rebuild_count, 1);
        assert_eq!(stats.last_rebuild_at, Some(3));
        assert_eq!(stats.indexed_interactions, 3);
    }

    #[tokio::test]
    async fn retrieval_is_stale_between_rebuilds() {
        let store = MemoryStore::new(config(10, 2), Arc::new(KeywordEmbedder::new()));
        store
            .add_interaction("quantum basics", "a", InteractionMetadata::default())
            .await;
        store
            .add_interaction("rust ownership", "a", InteractionMetadata::default())
            .await;
        // Index now covers 2 interactions.
        store
            .add_interaction("quantum entanglement", "a", InteractionMetadata::default())
            .await;

        let hits = store.get_relevant_context("quantum", 5).await;
        let queries: Vec<&str> = hits.iter().map(|i| i.query.as_str()).collect();
        assert_eq!(queries[0], "quantum basics");
        assert!(!queries.contains(&"quantum entanglement"));

        store
            .add_interaction("music theory", "a", InteractionMetadata::default())
            .await;
        let hits = store.get_relevant_context("quantum", 1).await;
        assert_eq!(hits[0].query, "quantum entanglement");
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_interaction_and_previous_index() {
        let embedder = Arc::new(KeywordEmbedder::new());
        let store = MemoryStore::new(config(10, 1), embedder.clone());

        store
            .add_interaction("quantum", "a", InteractionMetadata::default())
            .await;
        assert_eq!(store.stats().await.indexed_interactions, 1);

        embedder.fail.store(true, Ordering::SeqCst);
        store
            .add_interaction("rust", "a", InteractionMetadata::default())
            .await;

        let stats = store.stats().await;
        assert_eq!(stats.total_interactions, 2);
        assert_eq!(stats.short_term_len, 2);
        assert_eq!(stats.indexed_interactions, 1);
        assert_eq!(stats.rebuild_count, 1);

        // Query embedding also fails: degrade to empty context.
        assert!(store.get_relevant_context("quantum", 3).await.is_empty());
    }

    #[tokio::test]
    async fn reads_are_idempotent() {
        let store = MemoryStore::new(config(5, 1), Arc::new(KeywordEmbedder::new()));
        store
            .add_interaction("quantum", "a", InteractionMetadata::default())
            .await;
        store
            .add_interaction("economy", "b", InteractionMetadata::default())
            .await;

        let h1 = store.get_short_term_history().await;
        let h2 = store.get_short_term_history().await;
        assert_eq!(h1, h2);

        let c1 = store.get_relevant_context("quantum economy", 2).await;
        let c2 = store.get_relevant_context("quantum economy", 2).await;
        assert_eq!(c1, c2);
    }

    #[tokio::test]
    async fn disabled_long_term_memory_never_rebuilds() {
        let embedder = Arc::new(KeywordEmbedder::new());
        let store = MemoryStore::new(
            MemoryConfig {
                enable_long_term_memory: false,
                rebuild_interval: 1,
                ..Default::default()
            },
            embedder.clone(),
        );
        store
            .add_interaction("quantum", "a", InteractionMetadata::default())
            .await;
        assert_eq!(embedder.batch_calls.load(Ordering::SeqCst), 0);
        assert!(store.get_relevant_context("quantum", 3).await.is_empty());
    }

    #[tokio::test]
    async fn toggle_applies_at_next_append() {
        let embedder = Arc::new(KeywordEmbedder::new());
        let store = MemoryStore::new(config(10, 1), embedder.clone());
        store
            .add_interaction("quantum", "a", InteractionMetadata::default())
            .await;

        store.set_long_term_enabled(false).await;
        // Still enabled until the next append.
        assert!(store.stats().await.long_term_enabled);
        assert_eq!(store.get_relevant_context("quantum", 3).await.len(), 1);

        store
            .add_interaction("rust", "a", InteractionMetadata::default())
            .await;
        assert!(!store.stats().await.long_term_enabled);
        assert!(store.get_relevant_context("quantum", 3).await.is_empty());
        assert_eq!(embedder.batch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn summary_is_replaced_each_append() {
        let store = MemoryStore::new(config(10, 5), Arc::new(KeywordEmbedder::new()));
        store
            .add_interaction("first", "one", InteractionMetadata::default())
            .await;
        let s1 = store.get_summary().await;
        store
            .add_interaction("second", "two", InteractionMetadata::default())
            .await;
        let s2 = store.get_summary().await;
        assert!(s1.contains("first"));
        assert!(s2.contains("first") && s2.contains("second"));
    }

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _previous: &str, _interaction: &Interaction) -> lumen_common::Result<String> {
            Err(lumen_common::LumenError::llm_status(503, "unavailable"))
        }
    }

    #[tokio::test]
    async fn summarizer_failure_falls_back() {
        let store = MemoryStore::with_summarizer(
            config(10, 5),
            Arc::new(KeywordEmbedder::new()),
            Arc::new(FailingSummarizer),
        );
        store
            .add_interaction("what is rust", "A systems language.", InteractionMetadata::default())
            .await;
        assert_eq!(
            store.get_summary().await,
            "- Q: what is rust -> A: A systems language."
        );
        assert_eq!(store.stats().await.short_term_len, 1);
    }

    /// Blocks inside `summarize` until released.
    struct GatedSummarizer {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl Summarizer for GatedSummarizer {
        async fn summarize(&self, _previous: &str, interaction: &Interaction) -> lumen_common::Result<String> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(format!("summary through {}", interaction.query))
        }
    }

    #[tokio::test]
    async fn turn_and_summary_are_published_together() {
        let summarizer = Arc::new(GatedSummarizer {
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let store = Arc::new(MemoryStore::with_summarizer(
            config(10, 5),
            Arc::new(KeywordEmbedder::new()),
            summarizer.clone(),
        ));

        let writer = tokio::spawn({
            let store = store.clone();
            async move {
                store
                    .add_interaction("gated turn", "a", InteractionMetadata::default())
                    .await;
            }
        });

        summarizer.entered.notified().await;
        assert!(store.get_short_term_history().await.is_empty());
        assert_eq!(store.stats().await.total_interactions, 0);
        assert!(store.get_summary().await.is_empty());

        summarizer.release.notify_one();
        writer.await.unwrap();

        let history = store.get_short_term_history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].sequence, 1);
        assert_eq!(store.get_summary().await, "summary through gated turn");
        assert_eq!(store.stats().await.total_interactions, 1);
    }

    #[tokio::test]
    async fn clear_resets_everything() {
        let store = MemoryStore::new(config(10, 1), Arc::new(KeywordEmbedder::new()));
        store
            .add_interaction("quantum", "a", InteractionMetadata::default())
            .await;
        store.clear().await;
        let stats = store.stats().await;
        assert_eq!(stats.total_interactions, 0);
        assert_eq!(stats.indexed_interactions, 0);
        assert!(store.get_summary().await.is_empty());
        assert!(store.get_short_term_history().await.is_empty());
    }
}
