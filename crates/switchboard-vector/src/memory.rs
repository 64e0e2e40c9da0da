//! In-memory vector store with brute-force cosine ranking.

use async_trait::async_trait;
use std::sync::RwLock;
use uuid::Uuid;

use switchboard_llm::{SharedEmbedder, cosine_similarity};

use crate::error::{Result, VectorError};
use crate::store::{Document, ScoredDocument, VectorStore};

/// An in-memory store ranking documents by cosine similarity.
///
/// Suited to small corpora and tests; larger deployments sit behind the
/// same [`VectorStore`] trait with a database-backed implementation.
pub struct InMemoryVectorStore {
    embedder: SharedEmbedder,
    entries: RwLock<Vec<(Document, Vec<f32>)>>,
}

impl InMemoryVectorStore {
    /// Create a store over the given embedder.
    pub fn new(embedder: SharedEmbedder) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        let expected = self.embedder.dimensions();
        if vector.len() != expected {
            return Err(VectorError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    async fn insert(&self, documents: Vec<Document>) -> Result<Vec<Uuid>> {
        let mut ids = Vec::with_capacity(documents.len());
        let mut embedded = Vec::with_capacity(documents.len());

        for document in documents {
            let vector = self.embedder.embed(&document.content).await?;
            self.check_dimensions(&vector)?;
            ids.push(document.id);
            embedded.push((document, vector));
        }

        let mut entries = self.entries.write().expect("vector store lock poisoned");
        entries.extend(embedded);

        tracing::debug!(
            added = ids.len(),
            total = entries.len(),
            embedder = self.embedder.name(),
            "Stored documents"
        );
        Ok(ids)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add_texts(&self, texts: &[&str]) -> Result<Vec<Uuid>> {
        let documents = texts.iter().map(|text| Document::new(*text)).collect();
        self.insert(documents).await
    }

    async fn add_documents(&self, documents: Vec<Document>) -> Result<Vec<Uuid>> {
        self.insert(documents).await
    }

    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query).await?;
        self.check_dimensions(&query_vector)?;

        let entries = self.entries.read().expect("vector store lock poisoned");
        let mut scored: Vec<ScoredDocument> = entries
            .iter()
            .map(|(document, vector)| ScoredDocument {
                document: document.clone(),
                score: cosine_similarity(&query_vector, vector),
            })
            .collect();

        // Best first; insertion order breaks ties deterministically
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    fn len(&self) -> usize {
        self.entries.read().expect("vector store lock poisoned").len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use switchboard_llm::MockEmbedder;

    fn store() -> InMemoryVectorStore {
        InMemoryVectorStore::new(Arc::new(MockEmbedder::new(64)))
    }

    #[tokio::test]
    async fn test_add_and_count() {
        let store = store();
        assert!(store.is_empty());

        let ids = store.add_texts(&["one", "two", "three"]).await.unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_exact_match_ranks_first() {
        let store = store();
        store
            .add_texts(&[
                "Rust has great memory safety",
                "Paris is the capital of France",
                "The stock market closed higher today",
            ])
            .await
            .unwrap();

        let results = store
            .similarity_search("Rust has great memory safety", 2)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.content, "Rust has great memory safety");
        // Identical text embeds identically under the deterministic embedder
        assert!((results[0].score - 1.0).abs() < 0.001);
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_k_limits_results() {
        let store = store();
        store.add_texts(&["a", "b", "c", "d"]).await.unwrap();

        assert_eq!(store.similarity_search("a", 2).await.unwrap().len(), 2);
        assert_eq!(store.similarity_search("a", 10).await.unwrap().len(), 4);
        assert!(store.similarity_search("a", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_empty_store() {
        let store = store();
        let results = store.similarity_search("anything", 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_documents_keep_metadata() {
        let store = store();
        let doc = Document::new("tagged content").with_metadata("source", "test");
        let ids = store.add_documents(vec![doc.clone()]).await.unwrap();

        let results = store.similarity_search("tagged content", 1).await.unwrap();
        assert_eq!(results[0].document.id, ids[0]);
        assert_eq!(
            results[0].document.metadata.get("source"),
            Some(&serde_json::json!("test"))
        );
    }
}
