//! Integration tests for the memory store.
//!
//! These exercise the store through its public API with a deterministic
//! embedder, covering eviction, rebuild cadence, staleness and degradation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lumen_common::Source;
use lumen_memory::{
    format_context, Embedder, EmbeddingError, InteractionMetadata, MemoryConfig, MemoryStore,
};

/// Bag-of-topics embedder: one dimension per topic word.
struct TopicEmbedder {
    batches: AtomicUsize,
}

const TOPICS: [&str; 5] = ["quantum", "climate", "rust", "history", "music"];

#[async_trait]
impl Embedder for TopicEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let lower = text.to_lowercase();
        Ok(TOPICS
            .iter()
            .map(|t| lower.matches(t).count() as f32)
            .collect())
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Never answers within the configured timeout.
struct StalledEmbedder;

#[async_trait]
impl Embedder for StalledEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(vec![1.0])
    }
}

fn topic_store(window: usize, interval: u64) -> (MemoryStore, Arc<TopicEmbedder>) {
    let embedder = Arc::new(TopicEmbedder {
        batches: AtomicUsize::new(0),
    });
    let config = MemoryConfig {
        memory_window: window,
        rebuild_interval: interval,
        ..Default::default()
    };
    (MemoryStore::new(config, embedder.clone()), embedder)
}

#[tokio::test]
async fn test_index_lag_never_exceeds_interval() {
    let interval = 4;
    let (store, embedder) = topic_store(3, interval);

    for n in 1..=13u64 {
        store
            .add_interaction(&format!("quantum question {n}"), "answer", InteractionMetadata::default())
            .await;

        let stats = store.stats().await;
        let indexed = stats.indexed_interactions as u64;
        assert!(n - indexed < interval, "index lags by {} at n={n}", n - indexed);
        assert_eq!(indexed, (n / interval) * interval);
        assert_eq!(embedder.batches.load(Ordering::SeqCst) as u64, n / interval);
        assert!(stats.short_term_len <= 3);
    }
}

#[tokio::test]
async fn test_relevant_context_ranks_by_topic() {
    let (store, _) = topic_store(10, 3);

    store
        .add_interaction("Explain quantum entanglement", "Correlated quantum states.", InteractionMetadata::default())
        .await;
    store
        .add_interaction("Climate policy overview", "Carbon pricing and climate targets.", InteractionMetadata::default())
        .await;
    store
        .add_interaction("History of Rome", "An empire and its history.", InteractionMetadata::default())
        .await;

    let hits = store.get_relevant_context("quantum computing", 1).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].query, "Explain quantum entanglement");

    let hits = store.get_relevant_context("climate history", 5).await;
    assert_eq!(hits.len(), 3);
}

#[tokio::test]
async fn test_metadata_is_preserved() {
    let (store, _) = topic_store(10, 1);
    store
        .add_interaction(
            "quantum",
            "answer",
            InteractionMetadata {
                sources: vec![Source::url("https://arxiv.org/abs/1"), Source::tool("arxiv")],
                analysis: Some(serde_json::json!({"confidence_score": 0.8})),
                duration_ms: 1200,
            },
        )
        .await;

    let history = store.get_short_term_history().await;
    assert_eq!(history[0].sources.len(), 2);
    assert_eq!(history[0].duration_ms, 1200);
    assert_eq!(history[0].sequence, 1);
    assert!(history[0].analysis.is_some());
}

#[tokio::test]
async fn test_concurrent_appends_are_serialized() {
    let (store, embedder) = topic_store(5, 5);
    let store = Arc::new(store);

    let mut handles = Vec::new();
    for i in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .add_interaction(&format!("rust {i}"), "answer", InteractionMetadata::default())
                .await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = store.stats().await;
    assert_eq!(stats.total_interactions, 20);
    assert_eq!(stats.short_term_len, 5);
    assert_eq!(stats.indexed_interactions, 20);
    assert_eq!(embedder.batches.load(Ordering::SeqCst), 4);

    let sequences: Vec<u64> = store
        .get_short_term_history()
        .await
        .iter()
        .map(|i| i.sequence)
        .collect();
    assert_eq!(sequences, vec![16, 17, 18, 19, 20]);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_embedder_degrades_to_empty_context() {
    let config = MemoryConfig {
        rebuild_interval: 1,
        call_timeout_ms: 50,
        ..Default::default()
    };
    let store = MemoryStore::new(config, Arc::new(StalledEmbedder));

    store
        .add_interaction("quantum", "answer", InteractionMetadata::default())
        .await;

    let stats = store.stats().await;
    assert_eq!(stats.total_interactions, 1);
    assert_eq!(stats.rebuild_count, 0);
    assert!(store.get_relevant_context("quantum", 3).await.is_empty());
}

#[tokio::test]
async fn test_context_formatting_of_recalled_interactions() {
    let (store, _) = topic_store(10, 2);
    store
        .add_interaction("rust lifetimes", "Borrow scopes.", InteractionMetadata::default())
        .await;
    store
        .add_interaction("music theory", "Scales and modes.", InteractionMetadata::default())
        .await;

    let hits = store.get_relevant_context("rust", 1).await;
    let block = format_context(&hits, 500);
    assert!(block.starts_with("Previous query: rust lifetimes"));
}
