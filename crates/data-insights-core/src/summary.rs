//! Data summary fallback.
//!
//! When a branch finds nothing usable the user gets a description of what
//! the dataset contains plus suggested questions. The summary is built from
//! live table statistics ([`DataSummary`]) and phrased by the model; every
//! failure degrades to less polished text instead of an error.
//!
//! | Failure | Answer |
//! |---------|--------|
//! | none | model reply |
//! | model call fails | [`fallback_answer`] around the raw summary |
//! | summary cannot be built | [`NO_SUMMARY_APOLOGY`] |

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Fault, Result};
use crate::generation::{Generator, Prompt};
use crate::models::{render_value, ColumnInfo, ResultRow};
use crate::store::{quote_ident, StructuredStore};
use crate::templates::{PromptTemplates, Template, TemplateKind};

/// Answer used when not even the table statistics could be read.
pub const NO_SUMMARY_APOLOGY: &str = "I couldn't find relevant information for your question. \
Please try rephrasing or ask about the data we have available.";

/// Distinct example values listed per text column.
pub const MAX_EXAMPLES: usize = 5;

/// Full sample records listed in the summary.
pub const SAMPLE_RECORDS: usize = 3;

/// Sample rows included in the ingestion-time table overview.
pub const OVERVIEW_SAMPLE_ROWS: usize = 10;

/// One non-identifier column and, for text columns, some example values.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnProfile {
    pub column: ColumnInfo,
    pub examples: Vec<String>,
}

/// Statistics describing the dataset table.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSummary {
    pub total_records: i64,
    pub columns: Vec<ColumnProfile>,
    pub samples: Vec<ResultRow>,
}

impl DataSummary {
    /// The text substituted for `{dataSummary}`.
    pub fn render(&self) -> String {
        let mut out = String::from("DATA SUMMARY\n=============\n\n");
        out.push_str(&format!("Total Records: {}\n\n", self.total_records));

        out.push_str("Available Columns:\n");
        for profile in &self.columns {
            out.push_str(&format!(
                "  • {} ({})\n",
                profile.column.name, profile.column.data_type
            ));
            if !profile.examples.is_empty() {
                out.push_str(&format!("    Examples: {}\n", profile.examples.join(", ")));
            }
        }

        out.push_str(&format!("\nSample Records (first {}):\n", SAMPLE_RECORDS));
        for (i, record) in self.samples.iter().enumerate() {
            out.push_str(&format!("  Record {}: {}\n", i + 1, render_record(record)));
        }
        out
    }
}

/// `key=value` pairs for a row, skipping the identifier column.
fn render_record(row: &ResultRow) -> String {
    row.fields()
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("id"))
        .map(|(name, value)| format!("{}={}", name, render_value(value)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Answer used when the model could not phrase the summary.
pub fn fallback_answer(summary: &str) -> String {
    format!(
        "I couldn't find a relevant answer to your question.\n\n{}\n\n\
         You can ask questions about any of these columns or request aggregations like counts, averages, etc.",
        summary
    )
}

/// First column of the first row as an integer.
fn scalar_count(rows: &[ResultRow]) -> Result<i64> {
    rows.first()
        .and_then(|r| r.fields().first())
        .and_then(|(_, v)| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .ok_or_else(|| Fault::Store("COUNT(*) returned no integer".to_string()))
}

/// Builds data summaries and the "here's what I can answer" reply.
pub struct DataSummarizer {
    store: Arc<dyn StructuredStore>,
    generator: Arc<dyn Generator>,
    template: Template,
}

impl DataSummarizer {
    pub fn new(
        store: Arc<dyn StructuredStore>,
        generator: Arc<dyn Generator>,
        templates: &PromptTemplates,
    ) -> Self {
        Self {
            store,
            generator,
            template: templates.get(TemplateKind::DataSummary).clone(),
        }
    }

    /// Read row count, column profiles, and sample records for `table`.
    pub async fn summarize(&self, table: &str) -> Result<DataSummary> {
        let columns = self.store.columns(table).await?;
        if columns.is_empty() {
            return Err(Fault::MissingTable(table.to_string()));
        }
        let quoted = quote_ident(table);

        let count_rows = self
            .store
            .query(&format!("SELECT COUNT(*) AS total FROM {}", quoted))
            .await?;
        let total_records = scalar_count(&count_rows)?;

        let mut profiles = Vec::with_capacity(columns.len());
        for column in columns.into_iter().filter(|c| !c.is_identifier()) {
            let examples = if column.is_text() {
                self.examples(&quoted, &column.name).await
            } else {
                Vec::new()
            };
            profiles.push(ColumnProfile { column, examples });
        }

        let samples = self
            .store
            .query(&format!("SELECT * FROM {} LIMIT {}", quoted, SAMPLE_RECORDS))
            .await?;

        debug!(table, total_records, columns = profiles.len(), "built data summary");
        Ok(DataSummary {
            total_records,
            columns: profiles,
            samples,
        })
    }

    /// Up to [`MAX_EXAMPLES`] distinct non-null values; empty on error.
    async fn examples(&self, quoted_table: &str, column: &str) -> Vec<String> {
        let col = quote_ident(column);
        let sql = format!(
            "SELECT DISTINCT {col} FROM {quoted_table} WHERE {col} IS NOT NULL LIMIT {MAX_EXAMPLES}"
        );
        match self.store.query(&sql).await {
            Ok(rows) => rows
                .iter()
                .filter_map(|r| r.fields().first().map(|(_, v)| render_value(v)))
                .collect(),
            Err(fault) => {
                debug!(column, error = %fault, "skipping example values");
                Vec::new()
            }
        }
    }

    /// Ask the model to turn `summary` into a reply for `question`.
    pub async fn phrase(&self, summary: &str, question: &str) -> Result<String> {
        let prompt = self
            .template
            .render(&[("dataSummary", summary), ("originalQuestion", question)]);
        let reply = self.generator.complete(Prompt::text(prompt)).await?;
        if reply.trim().is_empty() {
            return Err(Fault::EmptyResponse);
        }
        Ok(reply)
    }

    /// Text contract: always returns something to show the user.
    pub async fn get_data_summary_with_suggestions(&self, table: &str, question: &str) -> String {
        let summary = match self.summarize(table).await {
            Ok(summary) => summary.render(),
            Err(fault) => {
                warn!(table, error = %fault, "data summary unavailable");
                return NO_SUMMARY_APOLOGY.to_string();
            }
        };

        match self.phrase(&summary, question).await {
            Ok(reply) => {
                info!("answered with data summary");
                reply
            }
            Err(fault) => {
                warn!(error = %fault, "could not phrase data summary, returning raw summary");
                fallback_answer(&summary)
            }
        }
    }
}

/// Plain overview stored in the semantic index at ingestion time.
pub async fn table_overview(store: &dyn StructuredStore, table: &str) -> Result<String> {
    let columns = store.columns(table).await?;
    if columns.is_empty() {
        return Err(Fault::MissingTable(table.to_string()));
    }
    let quoted = quote_ident(table);
    let total = scalar_count(
        &store
            .query(&format!("SELECT COUNT(*) AS total FROM {}", quoted))
            .await?,
    )?;
    let samples = store
        .query(&format!("SELECT * FROM {} LIMIT {}", quoted, OVERVIEW_SAMPLE_ROWS))
        .await?;

    let mut out = format!("Table: {}\nTotal Rows: {}\nColumns:\n", table, total);
    for col in &columns {
        out.push_str(&format!("  - {} ({})\n", col.name, col.data_type));
    }
    out.push_str(&format!("\nSample Data (first {} rows):\n", OVERVIEW_SAMPLE_ROWS));
    for record in &samples {
        out.push_str(&format!("  {}\n", render_record(record)));
    }
    Ok(out)
}
