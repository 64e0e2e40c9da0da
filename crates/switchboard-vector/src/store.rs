//! Vector store trait and document types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::Result;

// ─────────────────────────────────────────────────────────────────────────────
// Documents
// ─────────────────────────────────────────────────────────────────────────────

/// A stored text document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique document id.
    pub id: Uuid,
    /// The text content.
    pub content: String,
    /// Caller-defined metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
    /// When the document was stored.
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Create a document with a fresh id.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A document with its similarity score for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    /// The matched document.
    pub document: Document,
    /// Similarity score (cosine, higher is closer).
    pub score: f32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Vector Store Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A similarity-search store over embedded documents.
///
/// Embeddings come from an injected [`switchboard_llm::Embedder`]; backends
/// differ only in where vectors live and how the ranking runs.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed and store raw texts, returning the new document ids.
    async fn add_texts(&self, texts: &[&str]) -> Result<Vec<Uuid>>;

    /// Embed and store documents.
    async fn add_documents(&self, documents: Vec<Document>) -> Result<Vec<Uuid>>;

    /// Return the `k` documents most similar to the query, best first.
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>>;

    /// Number of stored documents.
    fn len(&self) -> usize;

    /// Whether the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_construction() {
        let doc = Document::new("Rust has great memory safety")
            .with_metadata("source", "notes.md")
            .with_metadata("page", 3);

        assert_eq!(doc.content, "Rust has great memory safety");
        assert_eq!(doc.metadata.get("source"), Some(&json!("notes.md")));
        assert_eq!(doc.metadata.get("page"), Some(&json!(3)));
    }

    #[test]
    fn test_document_ids_are_unique() {
        let a = Document::new("same text");
        let b = Document::new("same text");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_document_serde_roundtrip() {
        let doc = Document::new("hello").with_metadata("k", "v");
        let encoded = serde_json::to_string(&doc).unwrap();
        let decoded: Document = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, doc);
    }
}
