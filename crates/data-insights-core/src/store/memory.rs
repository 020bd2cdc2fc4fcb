//! In-memory [`SemanticStore`] for tests and embedding-free demos.
//!
//! Scores documents by how many distinct query terms they contain. Ties keep
//! insertion order, so results are deterministic.

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Fault, Result};
use crate::models::RetrievedDocument;

use super::SemanticStore;

/// Vec-backed semantic store behind a `RwLock`.
#[derive(Default)]
pub struct InMemorySemanticStore {
    documents: RwLock<Vec<RetrievedDocument>>,
}

impl InMemorySemanticStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: Vec<RetrievedDocument>) -> Self {
        Self {
            documents: RwLock::new(documents),
        }
    }

    /// Snapshot of every stored document, in insertion order.
    pub fn documents(&self) -> Vec<RetrievedDocument> {
        self.documents
            .read()
            .map(|docs| docs.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.documents.read().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lower-cased alphanumeric terms of at least two characters.
pub fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_lowercase())
        .collect()
}

#[async_trait]
impl SemanticStore for InMemorySemanticStore {
    async fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        let query_terms = terms(query);
        if query_terms.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let docs = self
            .documents
            .read()
            .map_err(|_| Fault::Store("semantic store lock poisoned".to_string()))?;

        let mut scored: Vec<(usize, &RetrievedDocument)> = docs
            .iter()
            .filter_map(|doc| {
                let doc_terms = terms(&doc.text);
                let hits = query_terms.intersection(&doc_terms).count();
                (hits > 0).then_some((hits, doc))
            })
            .collect();

        // stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(top_k);

        Ok(scored.into_iter().map(|(_, doc)| doc.clone()).collect())
    }

    async fn add(&self, documents: Vec<RetrievedDocument>) -> Result<()> {
        let mut docs = self
            .documents
            .write()
            .map_err(|_| Fault::Store("semantic store lock poisoned".to_string()))?;
        docs.extend(documents);
        Ok(())
    }
}
