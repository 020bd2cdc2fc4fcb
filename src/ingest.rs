//! CSV ingestion.
//!
//! Loads the configured CSV into two places:
//!
//! 1. A SQLite table (`csv_data_<stem>`) with an `id` surrogate key and one
//!    typed column per header, for generated SQL.
//! 2. The semantic index: one `csv` document per row plus one `sql_summary`
//!    document describing the table, for retrieval.
//!
//! Ingestion is skipped when both already hold data, unless `--full` is
//! given. Conversation documents survive a full re-ingest.

use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{info, warn};

use data_insights_core::models::{DocumentSource, Metadata, RetrievedDocument};
use data_insights_core::store::{quote_ident, StructuredStore};
use data_insights_core::summary::table_overview;

use crate::config::Config;
use crate::sqlite_store::{SqliteSemanticStore, SqliteStructuredStore};

/// SQLite column affinity inferred from a column's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

/// A parsed CSV file.
#[derive(Debug, Clone)]
pub struct CsvTable {
    /// Headers as written in the file; used in document text.
    pub headers: Vec<String>,
    /// Headers sanitised into SQL column names.
    pub columns: Vec<String>,
    pub types: Vec<ColumnType>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub table: String,
    pub rows_read: usize,
    pub rows_inserted: u64,
    pub documents_stored: usize,
    pub skipped: bool,
    pub sha256: String,
}

/// Map headers to unique SQL identifiers: lower-case, `[a-z0-9_]` only,
/// no leading digit, duplicates suffixed `_2`, `_3`, ...
pub fn sanitize_headers(headers: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(headers.len());
    for (i, header) in headers.iter().enumerate() {
        let mut name: String = header
            .trim_start_matches('\u{feff}')
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        if name.trim_matches('_').is_empty() {
            name = format!("column_{}", i + 1);
        }
        if name.starts_with(|c: char| c.is_ascii_digit()) {
            name = format!("c_{}", name);
        }
        if name == "id" {
            name = "source_id".to_string();
        }

        let base = name.clone();
        let mut n = 2;
        while out.contains(&name) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        out.push(name);
    }
    out
}

/// Narrowest type that fits every non-blank value. All-blank columns are TEXT.
pub fn infer_type<'a>(values: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut seen = false;
    let mut ty = ColumnType::Integer;
    for value in values.map(str::trim).filter(|v| !v.is_empty()) {
        seen = true;
        if ty == ColumnType::Integer && value.parse::<i64>().is_err() {
            ty = ColumnType::Real;
        }
        if ty == ColumnType::Real && value.parse::<f64>().is_err() {
            return ColumnType::Text;
        }
    }
    if seen {
        ty
    } else {
        ColumnType::Text
    }
}

/// Remove control characters (except tab/newline/CR) and collapse whitespace.
pub fn clean_text(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `"header: value. "` for every non-blank value, cleaned.
pub fn row_text(headers: &[String], values: &[String]) -> String {
    let mut text = String::new();
    for (header, value) in headers.iter().zip(values) {
        if !value.trim().is_empty() {
            text.push_str(&format!("{}: {}. ", header, value));
        }
    }
    clean_text(&text)
}

pub fn read_csv(path: &Path) -> Result<CsvTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read CSV header: {}", path.display()))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();
    if headers.is_empty() {
        anyhow::bail!("CSV file has no header row: {}", path.display());
    }

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed CSV record {}", i + 1))?;
        let values: Vec<String> = (0..headers.len())
            .map(|c| record.get(c).unwrap_or("").to_string())
            .collect();
        rows.push(values);
    }

    let types = (0..headers.len())
        .map(|c| infer_type(rows.iter().map(|r| r[c].as_str())))
        .collect();

    Ok(CsvTable {
        columns: sanitize_headers(&headers),
        headers,
        types,
        rows,
    })
}

/// Row documents for rows whose text reaches `min_text_len` characters.
pub fn row_documents(table: &CsvTable, file: &str, min_text_len: usize) -> Vec<RetrievedDocument> {
    table
        .rows
        .iter()
        .enumerate()
        .filter_map(|(i, values)| {
            let text = row_text(&table.headers, values);
            (text.chars().count() >= min_text_len)
                .then(|| RetrievedDocument::csv_row(text, file, i + 1))
        })
        .collect()
}

fn summary_document(table: &str, file: &str, overview: &str) -> RetrievedDocument {
    let mut metadata = Metadata::new();
    metadata.insert("source".into(), DocumentSource::SqlSummary.as_str().into());
    metadata.insert("file".into(), file.into());
    metadata.insert("table_name".into(), table.into());
    metadata.insert("type".into(), "aggregated_data_summary".into());
    RetrievedDocument::new(format!("Database Summary for {}:\n{}", table, overview), metadata)
}

fn file_sha256(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read CSV file: {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

async fn create_table(pool: &SqlitePool, table: &str, csv: &CsvTable) -> Result<u64> {
    let quoted = quote_ident(table);
    let column_defs: Vec<String> = csv
        .columns
        .iter()
        .zip(&csv.types)
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.sql()))
        .collect();

    let mut tx = pool.begin().await?;

    sqlx::query(&format!("DROP TABLE IF EXISTS {}", quoted))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!(
        "CREATE TABLE {} (id INTEGER PRIMARY KEY AUTOINCREMENT, {})",
        quoted,
        column_defs.join(", ")
    ))
    .execute(&mut *tx)
    .await?;

    let insert_sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quoted,
        csv.columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", "),
        vec!["?"; csv.columns.len()].join(", ")
    );

    let mut inserted = 0;
    for values in &csv.rows {
        let mut query = sqlx::query(&insert_sql);
        for (value, ty) in values.iter().zip(&csv.types) {
            let value = value.trim();
            query = match (value.is_empty(), ty) {
                (true, _) => query.bind(None::<String>),
                (false, ColumnType::Integer) => query.bind(value.parse::<i64>().ok()),
                (false, ColumnType::Real) => query.bind(value.parse::<f64>().ok()),
                (false, ColumnType::Text) => query.bind(value.to_string()),
            };
        }
        inserted += query.execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

async fn recorded_sha256(pool: &SqlitePool, table: &str) -> Result<Option<String>> {
    let sha = sqlx::query_scalar("SELECT sha256 FROM ingest_state WHERE table_name = ?")
        .bind(table)
        .fetch_optional(pool)
        .await?;
    Ok(sha)
}

async fn record_ingest(pool: &SqlitePool, report: &IngestReport, file: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        r#"
        INSERT INTO ingest_state (table_name, file, sha256, row_count, ingested_at) VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(table_name) DO UPDATE SET
            file = excluded.file,
            sha256 = excluded.sha256,
            row_count = excluded.row_count,
            ingested_at = excluded.ingested_at
        "#,
    )
    .bind(&report.table)
    .bind(file)
    .bind(&report.sha256)
    .bind(report.rows_inserted as i64)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Ingest the configured dataset into `pool`.
///
/// The semantic tables must already exist (see [`crate::migrate`]).
pub async fn ingest_csv(
    config: &Config,
    pool: &SqlitePool,
    semantic: &SqliteSemanticStore,
    full: bool,
) -> Result<IngestReport> {
    let path = &config.dataset.file;
    let table = config.dataset.table_name();
    let file = config.dataset.file_label();
    let structured = SqliteStructuredStore::new(pool.clone());

    let mut report = IngestReport {
        table: table.clone(),
        sha256: file_sha256(path)?,
        ..IngestReport::default()
    };

    let present = structured.exists(&table).await?
        && semantic.count_source(DocumentSource::Csv).await? > 0;
    if present && !full {
        if let Some(previous) = recorded_sha256(pool, &table).await? {
            if previous != report.sha256 {
                warn!(
                    file = %path.display(),
                    "dataset changed since last ingest; run `insights ingest --full` to reload"
                );
            }
        }
        info!(table = %table, "data already loaded, skipping ingest");
        report.skipped = true;
        return Ok(report);
    }

    // Parse before touching anything, so a bad file leaves the previous
    // table and documents in place.
    let csv = read_csv(path)?;
    report.rows_read = csv.rows.len();
    let mut documents = row_documents(&csv, &file, config.ingest.min_text_len);
    if documents.is_empty() {
        warn!("no rows produced indexable text; check CSV content");
    }

    report.rows_inserted = create_table(pool, &table, &csv)
        .await
        .with_context(|| format!("Failed to load table {}", table))?;
    info!(table = %table, rows = report.rows_inserted, "created dataset table");

    let overview = table_overview(&structured, &table).await?;
    documents.push(summary_document(&table, &file, &overview));

    report.documents_stored = documents.len();
    let removed = semantic
        .replace_sources(&[DocumentSource::Csv, DocumentSource::SqlSummary], documents)
        .await?;
    if removed > 0 {
        info!(removed, "replaced previously ingested documents");
    }
    record_ingest(pool, &report, &file).await?;

    Ok(report)
}

/// Connect, migrate, and ingest, printing a report. Backs `insights ingest`.
pub async fn run_ingest(config: &Config, full: bool) -> Result<()> {
    let pool = crate::db::connect(config).await?;
    crate::migrate::migrate_pool(&pool).await?;
    let embedder = crate::embedding::create_embedder(&config.embedding)?;
    let semantic = SqliteSemanticStore::new(pool.clone(), embedder);

    let report = ingest_csv(config, &pool, &semantic, full).await?;

    println!("ingest {}", config.dataset.file.display());
    if report.skipped {
        println!("  already loaded (use --full to reload)");
    } else {
        println!("  table: {}", report.table);
        println!("  rows read: {}", report.rows_read);
        println!("  rows inserted: {}", report.rows_inserted);
        println!("  documents stored: {}", report.documents_stored);
    }
    println!("  sha256: {}", report.sha256);
    println!("ok");

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_insights_core::store::SemanticStore;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sanitize_headers() {
        let headers = strings(&["File Name", "Label", "2024 Size", "label", "", "ID", "\u{feff}Owner"]);
        assert_eq!(
            sanitize_headers(&headers),
            vec!["file_name", "label", "c_2024_size", "label_2", "column_5", "source_id", "owner"]
        );
    }

    #[test]
    fn test_infer_type() {
        assert_eq!(infer_type(["1", "2", ""].into_iter()), ColumnType::Integer);
        assert_eq!(infer_type(["1", "2.5"].into_iter()), ColumnType::Real);
        assert_eq!(infer_type(["1", "x"].into_iter()), ColumnType::Text);
        assert_eq!(infer_type(["", " "].into_iter()), ColumnType::Text);
    }

    #[test]
    fn test_row_text_skips_blanks_and_cleans() {
        let text = row_text(
            &strings(&["name", "label", "notes"]),
            &strings(&["report.pdf", "", "line one\n\u{7}line   two"]),
        );
        assert_eq!(text, "name: report.pdf. notes: line one line two.");
    }

    #[test]
    fn test_row_documents_apply_min_length() {
        let table = CsvTable {
            headers: strings(&["a"]),
            columns: strings(&["a"]),
            types: vec![ColumnType::Text],
            rows: vec![strings(&["x"]), strings(&["a much longer value"])],
        };
        let docs = row_documents(&table, "data.csv", 10);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source_label(), "Row 2 from data.csv");
    }

    fn config_for(dir: &Path) -> Config {
        let csv = dir.join("data.csv");
        std::fs::write(
            &csv,
            "File Name,Label,Size\nreport.pdf,PUBLIC,120\nbudget.xlsx,CONFIDENTIAL,\nnotes.txt,PUBLIC,3\n",
        )
        .unwrap();
        toml::from_str(&format!(
            "[db]\npath = \"{}\"\n\n[dataset]\nfile = \"{}\"\n",
            dir.join("unused.sqlite").display(),
            csv.display()
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_ingest_csv_loads_table_and_index() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = config_for(tmp.path());
        let pool = crate::db::connect_in_memory().await.unwrap();
        crate::migrate::migrate_pool(&pool).await.unwrap();
        let semantic = SqliteSemanticStore::new(pool.clone(), None);

        let report = ingest_csv(&config, &pool, &semantic, false).await.unwrap();
        assert!(!report.skipped);
        assert_eq!(report.table, "csv_data_data");
        assert_eq!(report.rows_read, 3);
        assert_eq!(report.rows_inserted, 3);
        assert_eq!(report.documents_stored, 4);
        assert_eq!(semantic.count_source(DocumentSource::Csv).await.unwrap(), 3);
        assert_eq!(semantic.count_source(DocumentSource::SqlSummary).await.unwrap(), 1);

        let structured = SqliteStructuredStore::new(pool.clone());
        let columns: Vec<String> = structured
            .columns("csv_data_data")
            .await
            .unwrap()
            .into_iter()
            .map(|c| format!("{} {}", c.name, c.data_type))
            .collect();
        assert_eq!(
            columns,
            vec!["id INTEGER", "file_name TEXT", "label TEXT", "size INTEGER"]
        );

        let rows = structured
            .query("SELECT SUM(size) AS total, COUNT(size) AS n FROM csv_data_data")
            .await
            .unwrap();
        assert_eq!(rows[0].get("total"), Some(&serde_json::json!(123)));
        assert_eq!(rows[0].get("n"), Some(&serde_json::json!(2)));

        let hits = semantic.keyword_search("budget", 3).await.unwrap();
        assert_eq!(hits[0].text, "File Name: budget.xlsx. Label: CONFIDENTIAL.");
        assert_eq!(hits[0].source_label(), "Row 2 from data.csv");
    }

    #[tokio::test]
    async fn test_ingest_csv_skips_then_full_reload_keeps_conversations() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = config_for(tmp.path());
        let pool = crate::db::connect_in_memory().await.unwrap();
        crate::migrate::migrate_pool(&pool).await.unwrap();
        let semantic = SqliteSemanticStore::new(pool.clone(), None);

        ingest_csv(&config, &pool, &semantic, false).await.unwrap();
        let conversation =
            data_insights_core::models::ConversationRecord::new("q?", "a.").into_document();
        semantic.add(vec![conversation]).await.unwrap();

        let again = ingest_csv(&config, &pool, &semantic, false).await.unwrap();
        assert!(again.skipped);
        assert_eq!(semantic.count().await.unwrap(), 5);

        let full = ingest_csv(&config, &pool, &semantic, true).await.unwrap();
        assert!(!full.skipped);
        assert_eq!(full.rows_inserted, 3);
        assert_eq!(semantic.count().await.unwrap(), 5);
        assert_eq!(
            semantic.count_source(DocumentSource::Conversation).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_failed_full_reingest_keeps_previous_data() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = config_for(tmp.path());
        let pool = crate::db::connect_in_memory().await.unwrap();
        crate::migrate::migrate_pool(&pool).await.unwrap();
        let semantic = SqliteSemanticStore::new(pool.clone(), None);

        ingest_csv(&config, &pool, &semantic, false).await.unwrap();
        assert_eq!(semantic.count().await.unwrap(), 4);

        std::fs::write(&config.dataset.file, b"name,label\nreport.pdf,\xff\xfe\n").unwrap();
        let err = ingest_csv(&config, &pool, &semantic, true).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Malformed CSV record 1"));

        assert_eq!(semantic.count().await.unwrap(), 4);
        assert_eq!(semantic.count_source(DocumentSource::SqlSummary).await.unwrap(), 1);
        let structured = SqliteStructuredStore::new(pool.clone());
        assert!(structured.exists("csv_data_data").await.unwrap());
        let rows = structured
            .query("SELECT COUNT(*) AS n FROM csv_data_data")
            .await
            .unwrap();
        assert_eq!(rows[0].get("n"), Some(&serde_json::json!(3)));
    }

    #[test]
    fn test_read_csv_pads_short_records() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("data.csv");
        std::fs::write(&path, "name,size,label\nreport.pdf,10,PUBLIC\nplan.md,2.5\n").unwrap();

        let csv = read_csv(&path).unwrap();
        assert_eq!(csv.columns, vec!["name", "size", "label"]);
        assert_eq!(csv.types, vec![ColumnType::Text, ColumnType::Real, ColumnType::Text]);
        assert_eq!(csv.rows[1], strings(&["plan.md", "2.5", ""]));
    }
}
