//! Semantic retrieval glue for the FACTUAL branch.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::models::{RetrievedDocument, MAX_SOURCES};
use crate::store::SemanticStore;

/// Default number of documents fetched per question.
pub const DEFAULT_TOP_K: usize = 3;

/// Join document texts in result order, separated by a blank line.
pub fn build_context(documents: &[RetrievedDocument]) -> String {
    documents
        .iter()
        .map(|d| d.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Distinct source labels in first-occurrence order, at most [`MAX_SOURCES`].
pub fn source_labels(documents: &[RetrievedDocument]) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for label in documents.iter().map(RetrievedDocument::source_label) {
        if labels.len() == MAX_SOURCES {
            break;
        }
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels
}

/// Top-K search over a [`SemanticStore`].
pub struct SemanticRetriever {
    store: Arc<dyn SemanticStore>,
    top_k: usize,
}

impl SemanticRetriever {
    pub fn new(store: Arc<dyn SemanticStore>, top_k: usize) -> Self {
        Self { store, top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub async fn search(&self, question: &str) -> Result<Vec<RetrievedDocument>> {
        let documents = self.store.similarity_search(question, self.top_k).await?;
        debug!(found = documents.len(), top_k = self.top_k, "semantic search");
        Ok(documents)
    }
}
