//! SQLite-backed store implementations.
//!
//! - [`SqliteStructuredStore`] runs queries against the ingested dataset
//!   table and decodes each cell by its runtime SQLite type.
//! - [`SqliteSemanticStore`] keeps retrievable documents in
//!   `semantic_documents`, with an FTS5 index (`semantic_fts`) and optional
//!   embedding vectors (`semantic_vectors`).

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, Sqlite, SqlitePool, Transaction, TypeInfo, ValueRef};
use tracing::{debug, warn};

use data_insights_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder};
use data_insights_core::models::{ColumnInfo, DocumentSource, Metadata, ResultRow, RetrievedDocument};
use data_insights_core::store::memory::terms;
use data_insights_core::store::{SemanticStore, StructuredStore};
use data_insights_core::Fault;

fn store_fault(err: sqlx::Error) -> Fault {
    Fault::Store(err.to_string())
}

/// Decode one cell by the SQLite storage class of its value.
fn decode_cell(row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" => serde_json::Number::from_f64(row.try_get_unchecked::<f64, _>(index)?)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get_unchecked(index)?;
            Value::String(format!("<blob {} bytes>", bytes.len()))
        }
        _ => Value::String(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}

fn decode_row(row: &SqliteRow) -> Result<ResultRow, sqlx::Error> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, column)| Ok((column.name().to_string(), decode_cell(row, i)?)))
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map(ResultRow::new)
}

/// [`StructuredStore`] over a SQLite pool.
pub struct SqliteStructuredStore {
    pool: SqlitePool,
}

impl SqliteStructuredStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StructuredStore for SqliteStructuredStore {
    async fn query(&self, sql: &str) -> Result<Vec<ResultRow>, Fault> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(store_fault)?;
        rows.iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_fault)
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>, Fault> {
        let rows = sqlx::query("SELECT name, type FROM pragma_table_info(?) ORDER BY cid")
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(store_fault)?;

        rows.iter()
            .map(|r| {
                Ok(ColumnInfo::new(
                    r.try_get::<String, _>("name")?,
                    r.try_get::<String, _>("type")?,
                ))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(store_fault)
    }

    async fn exists(&self, table: &str) -> Result<bool, Fault> {
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .map_err(store_fault)
    }
}

/// [`SemanticStore`] over the `semantic_*` tables.
///
/// With an embedder, search ranks stored vectors by cosine similarity.
/// Without one, or when no vectors exist for the embedder's model, search
/// uses FTS5 keyword matching ordered by BM25 rank.
pub struct SqliteSemanticStore {
    pool: SqlitePool,
    embedder: Option<Arc<dyn Embedder>>,
}

impl SqliteSemanticStore {
    pub fn new(pool: SqlitePool, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self { pool, embedder }
    }

    /// Number of stored documents.
    pub async fn count(&self) -> Result<i64> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM semantic_documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn count_source(&self, source: DocumentSource) -> Result<i64> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM semantic_documents WHERE source = ?")
            .bind(source.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Swap every document tagged with one of `sources` for `documents` in a
    /// single transaction. On error the previous documents are untouched.
    pub async fn replace_sources(
        &self,
        sources: &[DocumentSource],
        documents: Vec<RetrievedDocument>,
    ) -> Result<u64> {
        let vectors = self.embed_documents(&documents).await;

        let mut tx = self.pool.begin().await?;
        let removed = delete_sources_in(&mut tx, sources).await?;
        self.insert_documents(&mut tx, &documents, vectors.as_deref())
            .await?;
        tx.commit().await?;

        debug!(removed, added = documents.len(), "replaced semantic documents");
        Ok(removed)
    }

    /// Vectors for `documents`, or `None` when embeddings are off or fail.
    /// Embedding failure is non-fatal: documents stay keyword-searchable.
    async fn embed_documents(&self, documents: &[RetrievedDocument]) -> Option<Vec<Vec<f32>>> {
        let embedder = self.embedder.as_ref()?;
        if documents.is_empty() {
            return None;
        }
        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        match embedder.embed(&texts).await {
            Ok(v) if v.len() == documents.len() => Some(v),
            Ok(v) => {
                warn!(expected = documents.len(), got = v.len(), "embedding count mismatch, storing without vectors");
                None
            }
            Err(fault) => {
                warn!(error = %fault, "embedding failed, storing without vectors");
                None
            }
        }
    }

    async fn insert_documents(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        documents: &[RetrievedDocument],
        vectors: Option<&[Vec<f32>]>,
    ) -> Result<(), Fault> {
        let now = chrono::Utc::now().timestamp();

        for (i, doc) in documents.iter().enumerate() {
            let id = uuid::Uuid::new_v4().to_string();
            let source = doc.source_tag().unwrap_or(DocumentSource::Csv.as_str());
            let metadata_json = serde_json::to_string(&doc.metadata)
                .map_err(|e| Fault::Store(format!("cannot encode metadata: {}", e)))?;

            sqlx::query(
                "INSERT INTO semantic_documents (id, text, source, metadata_json, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(&doc.text)
            .bind(source)
            .bind(&metadata_json)
            .bind(now)
            .execute(&mut **tx)
            .await
            .map_err(store_fault)?;

            sqlx::query("INSERT INTO semantic_fts (document_id, text) VALUES (?, ?)")
                .bind(&id)
                .bind(&doc.text)
                .execute(&mut **tx)
                .await
                .map_err(store_fault)?;

            if let (Some(vecs), Some(embedder)) = (vectors, &self.embedder) {
                if let Some(vec) = vecs.get(i) {
                    sqlx::query(
                        "INSERT INTO semantic_vectors (document_id, model, dims, embedding) VALUES (?, ?, ?, ?)",
                    )
                    .bind(&id)
                    .bind(embedder.model_name())
                    .bind(vec.len() as i64)
                    .bind(vec_to_blob(vec))
                    .execute(&mut **tx)
                    .await
                    .map_err(store_fault)?;
                }
            }
        }
        Ok(())
    }

    /// FTS5 search with the query's terms OR-ed together.
    pub async fn keyword_search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedDocument>, Fault> {
        let mut words: Vec<String> = terms(query).into_iter().collect();
        if words.is_empty() {
            return Ok(Vec::new());
        }
        words.sort();
        let fts_query = words
            .iter()
            .map(|w| format!("\"{}\"", w))
            .collect::<Vec<_>>()
            .join(" OR ");

        let rows = sqlx::query(
            r#"
            SELECT d.text, d.metadata_json
            FROM (
                SELECT document_id, rank
                FROM semantic_fts
                WHERE semantic_fts MATCH ?
                ORDER BY rank
                LIMIT ?
            ) AS hits
            JOIN semantic_documents d ON d.id = hits.document_id
            ORDER BY hits.rank
            "#,
        )
        .bind(&fts_query)
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(store_fault)?;

        rows.iter().map(document_from_row).collect()
    }

    /// Brute-force cosine ranking over every vector stored for `model`.
    async fn vector_search(
        &self,
        query_vec: &[f32],
        model: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>, Fault> {
        let rows = sqlx::query(
            r#"
            SELECT d.text, d.metadata_json, v.embedding
            FROM semantic_vectors v
            JOIN semantic_documents d ON d.id = v.document_id
            WHERE v.model = ?
            "#,
        )
        .bind(model)
        .fetch_all(&self.pool)
        .await
        .map_err(store_fault)?;

        let mut scored: Vec<(f32, RetrievedDocument)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.try_get("embedding").map_err(store_fault)?;
                let similarity = cosine_similarity(query_vec, &blob_to_vec(&blob));
                Ok((similarity, document_from_row(row)?))
            })
            .collect::<Result<_, Fault>>()?;

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored.into_iter().map(|(_, doc)| doc).collect())
    }
}

fn document_from_row(row: &SqliteRow) -> Result<RetrievedDocument, Fault> {
    let text: String = row.try_get("text").map_err(store_fault)?;
    let metadata_json: String = row.try_get("metadata_json").map_err(store_fault)?;
    let metadata: Metadata = serde_json::from_str(&metadata_json).unwrap_or_default();
    Ok(RetrievedDocument::new(text, metadata))
}

#[async_trait]
impl SemanticStore for SqliteSemanticStore {
    async fn similarity_search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedDocument>, Fault> {
        if top_k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        if let Some(embedder) = &self.embedder {
            match embedder.embed(&[query.to_string()]).await {
                Ok(mut vectors) if !vectors.is_empty() => {
                    let query_vec = vectors.swap_remove(0);
                    let hits = self
                        .vector_search(&query_vec, embedder.model_name(), top_k)
                        .await?;
                    if !hits.is_empty() {
                        return Ok(hits);
                    }
                    debug!("no stored vectors for model, using keyword search");
                }
                Ok(_) => warn!("embedder returned no vector for query, using keyword search"),
                Err(fault) => warn!(error = %fault, "query embedding failed, using keyword search"),
            }
        }

        self.keyword_search(query, top_k).await
    }

    async fn add(&self, documents: Vec<RetrievedDocument>) -> Result<(), Fault> {
        if documents.is_empty() {
            return Ok(());
        }

        let vectors = self.embed_documents(&documents).await;
        let mut tx = self.pool.begin().await.map_err(store_fault)?;
        self.insert_documents(&mut tx, &documents, vectors.as_deref())
            .await?;
        tx.commit().await.map_err(store_fault)?;

        debug!(added = documents.len(), "stored semantic documents");
        Ok(())
    }
}

async fn delete_sources_in(
    tx: &mut Transaction<'_, Sqlite>,
    sources: &[DocumentSource],
) -> Result<u64, sqlx::Error> {
    let mut removed = 0;
    for source in sources {
        sqlx::query(
            "DELETE FROM semantic_vectors WHERE document_id IN (SELECT id FROM semantic_documents WHERE source = ?)",
        )
        .bind(source.as_str())
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            "DELETE FROM semantic_fts WHERE document_id IN (SELECT id FROM semantic_documents WHERE source = ?)",
        )
        .bind(source.as_str())
        .execute(&mut **tx)
        .await?;

        removed += sqlx::query("DELETE FROM semantic_documents WHERE source = ?")
            .bind(source.as_str())
            .execute(&mut **tx)
            .await?
            .rows_affected();
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use crate::migrate::migrate_pool;
    use data_insights_core::models::ConversationRecord;
    use serde_json::json;

    async fn structured() -> SqliteStructuredStore {
        let pool = connect_in_memory().await.unwrap();
        sqlx::query(
            "CREATE TABLE csv_data_data (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, size REAL, label TEXT, raw BLOB)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO csv_data_data (name, size, label, raw) VALUES ('a.pdf', 1.5, 'PUBLIC', x'0102'), ('b.md', 2.0, NULL, NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        SqliteStructuredStore::new(pool)
    }

    async fn semantic(embedder: Option<Arc<dyn Embedder>>) -> SqliteSemanticStore {
        let pool = connect_in_memory().await.unwrap();
        migrate_pool(&pool).await.unwrap();
        SqliteSemanticStore::new(pool, embedder)
    }

    #[tokio::test]
    async fn test_query_decodes_types_in_column_order() {
        let store = structured().await;
        let rows = store
            .query("SELECT label, name, size, raw, id FROM csv_data_data ORDER BY id")
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        let names: Vec<&str> = rows[0].column_names().collect();
        assert_eq!(names, vec!["label", "name", "size", "raw", "id"]);
        assert_eq!(rows[0].get("size"), Some(&json!(1.5)));
        assert_eq!(rows[0].get("raw"), Some(&json!("<blob 2 bytes>")));
        assert_eq!(rows[0].get("id"), Some(&json!(1)));
        assert_eq!(rows[1].get("label"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_query_aggregate() {
        let store = structured().await;
        let rows = store
            .query("SELECT COUNT(*) FROM csv_data_data WHERE label = 'PUBLIC'")
            .await
            .unwrap();
        assert_eq!(rows[0].get("COUNT(*)"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_query_error_is_store_fault() {
        let store = structured().await;
        let err = store.query("SELECT colour FROM csv_data_data").await.unwrap_err();
        assert!(matches!(err, Fault::Store(ref m) if m.contains("colour")));
    }

    #[tokio::test]
    async fn test_columns_and_exists() {
        let store = structured().await;
        let columns = store.columns("csv_data_data").await.unwrap();
        assert_eq!(columns[0], ColumnInfo::new("id", "INTEGER"));
        assert_eq!(columns[2], ColumnInfo::new("size", "REAL"));
        assert!(store.exists("csv_data_data").await.unwrap());

        assert!(store.columns("nope").await.unwrap().is_empty());
        assert!(!store.exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_keyword_search_ranks_and_limits() {
        let store = semantic(None).await;
        store
            .add(vec![
                RetrievedDocument::csv_row("name: budget.xlsx. label: PRIVATE. owner: finance.", "data.csv", 1),
                RetrievedDocument::csv_row("name: report.pdf. label: PUBLIC.", "data.csv", 2),
                RetrievedDocument::csv_row("name: plan.md. label: PRIVATE.", "data.csv", 3),
            ])
            .await
            .unwrap();

        let hits = store.similarity_search("finance private", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source_label(), "Row 1 from data.csv");

        assert!(store.similarity_search("zebra", 3).await.unwrap().is_empty());
        assert!(store.similarity_search("  ", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_count_and_clear_source() {
        let store = semantic(None).await;
        store
            .add(vec![
                RetrievedDocument::csv_row("label: PUBLIC one", "data.csv", 1),
                ConversationRecord::new("How many?", "Three.").into_document(),
            ])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.count_source(DocumentSource::Conversation).await.unwrap(), 1);

        let removed = store
            .replace_sources(&[DocumentSource::Csv], Vec::new())
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count().await.unwrap(), 1);

        let hits = store.similarity_search("how many", 3).await.unwrap();
        assert_eq!(hits[0].source(), Some(DocumentSource::Conversation));
        assert_eq!(hits[0].metadata["answer"], json!("Three."));
    }

    #[tokio::test]
    async fn test_replace_sources_swaps_documents() {
        let store = semantic(None).await;
        store
            .add(vec![
                RetrievedDocument::csv_row("name: old.pdf. label: PUBLIC.", "data.csv", 1),
                ConversationRecord::new("How many?", "Three.").into_document(),
            ])
            .await
            .unwrap();

        let removed = store
            .replace_sources(
                &[DocumentSource::Csv, DocumentSource::SqlSummary],
                vec![
                    RetrievedDocument::csv_row("name: new.pdf. label: PUBLIC.", "data.csv", 1),
                    RetrievedDocument::csv_row("name: other.md. label: PRIVATE.", "data.csv", 2),
                ],
            )
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count_source(DocumentSource::Csv).await.unwrap(), 2);
        assert_eq!(store.count_source(DocumentSource::Conversation).await.unwrap(), 1);
        assert!(store.keyword_search("old", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_document_is_store_fault() {
        let store = semantic(None).await;
        sqlx::query(
            "INSERT INTO semantic_documents (id, text, source, metadata_json, created_at) VALUES ('d1', 'broken budget row', 'csv', x'fffe', 0)",
        )
        .execute(&store.pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO semantic_fts (document_id, text) VALUES ('d1', 'broken budget row')")
            .execute(&store.pool)
            .await
            .unwrap();

        let err = store.keyword_search("budget", 3).await.unwrap_err();
        assert!(matches!(err, Fault::Store(_)));
    }

    /// Two-dimensional embedder: counts of "public" and "private".
    struct LabelEmbedder;

    #[async_trait]
    impl Embedder for LabelEmbedder {
        fn model_name(&self) -> &str {
            "labels"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Fault> {
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        t.matches("public").count() as f32,
                        t.matches("private").count() as f32,
                    ]
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_vector_search_ranks_by_cosine() {
        let store = semantic(Some(Arc::new(LabelEmbedder))).await;
        store
            .add(vec![
                RetrievedDocument::csv_row("label: PRIVATE", "data.csv", 1),
                RetrievedDocument::csv_row("label: PUBLIC", "data.csv", 2),
            ])
            .await
            .unwrap();

        let hits = store.similarity_search("public files", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_label(), "Row 2 from data.csv");
    }
}
