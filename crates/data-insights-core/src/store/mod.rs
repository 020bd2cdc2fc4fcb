//! Store abstractions consumed by the pipeline.
//!
//! The core only reads from the structured table and reads from or appends
//! to the semantic index. Implementations are expected to serialise their
//! own concurrent writes; the core performs no locking.
//!
//! | Trait | Operations |
//! |-------|------------|
//! | [`StructuredStore`] | [`query`](StructuredStore::query), [`columns`](StructuredStore::columns), [`exists`](StructuredStore::exists) |
//! | [`SemanticStore`] | [`similarity_search`](SemanticStore::similarity_search), [`add`](SemanticStore::add) |

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ColumnInfo, ResultRow, RetrievedDocument};

/// Row-oriented table access.
#[async_trait]
pub trait StructuredStore: Send + Sync {
    /// Execute a read query, returning rows with columns in result order.
    ///
    /// The query text is executed as given. No parameterisation or
    /// allow-listing is applied.
    async fn query(&self, sql: &str) -> Result<Vec<ResultRow>>;

    /// Column name/type pairs for `table`, in declaration order.
    ///
    /// Returns an empty list for an unknown table.
    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Whether `table` exists.
    async fn exists(&self, table: &str) -> Result<bool>;
}

/// Similarity search over stored text fragments.
#[async_trait]
pub trait SemanticStore: Send + Sync {
    /// The `top_k` most similar documents to `query`, best first.
    async fn similarity_search(&self, query: &str, top_k: usize)
        -> Result<Vec<RetrievedDocument>>;

    /// Append documents to the index.
    async fn add(&self, documents: Vec<RetrievedDocument>) -> Result<()>;
}

/// Quote an SQL identifier with double quotes, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("csv_data_data"), "\"csv_data_data\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
