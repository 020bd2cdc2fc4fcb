//! Natural-language-to-SQL for the ANALYTICAL branch.
//!
//! [`SqlQueryGenerator`] asks the model for a query over the dataset table,
//! cleans the reply, executes it, and formats the rows as model-ready text.
//! The formatted text always carries the executed query *before* the rows,
//! together with a note that the rows are already filtered, so the answer
//! step never claims a filter was not applied.
//!
//! Two entry points share one typed core:
//!
//! - [`SqlQueryGenerator::run`] returns `Result<AggregateOutcome, Fault>`
//!   and is what the router uses.
//! - [`SqlQueryGenerator::execute_aggregated_query`] always returns text:
//!   either the formatted rows, [`NO_DATA_SENTINEL`], or a string starting
//!   with [`EXECUTION_FAILED_PREFIX`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Fault, Result};
use crate::generation::{Generator, Prompt};
use crate::models::{render_value, AggregatedResult, ColumnInfo};
use crate::store::StructuredStore;
use crate::templates::{PromptTemplates, Template, TemplateKind};

/// Returned when the generated query ran but matched nothing.
pub const NO_DATA_SENTINEL: &str = "No data found for the query.";

/// Prefix of the text returned when generation or execution failed.
pub const EXECUTION_FAILED_PREFIX: &str = "Unable to execute query: ";

/// Rows listed in formatted output before the remainder is elided.
pub const MAX_FORMATTED_ROWS: usize = 100;

const RULE_WIDTH: usize = 80;

/// Result of running a generated query.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateOutcome {
    /// At least one row came back.
    Rows(AggregatedResult),
    /// The query executed but returned no rows.
    NoData { query: String },
}

/// Strip markdown fences and a trailing semicolon from a model reply.
pub fn clean_generated_sql(raw: &str) -> String {
    let unfenced = raw
        .replace("```sql", "")
        .replace("```SQL", "")
        .replace("```", "");
    let trimmed = unfenced.trim();
    trimmed
        .strip_suffix(';')
        .unwrap_or(trimmed)
        .trim_end()
        .to_string()
}

/// Schema block substituted into the SQL generation prompt.
pub fn describe_schema(table: &str, columns: &[ColumnInfo]) -> String {
    let mut out = format!("Table: {}\nColumns:\n", table);
    for col in columns {
        out.push_str(&format!("  - {} ({})\n", col.name, col.data_type));
    }
    out
}

/// Render rows for the answer step, query text first.
///
/// Columns are listed in the first row's result order. At most
/// [`MAX_FORMATTED_ROWS`] rows are written; the rest are counted in a
/// trailing `... and N more rows` line.
pub fn format_aggregated_result(result: &AggregatedResult) -> String {
    let rule = |c: char| c.to_string().repeat(RULE_WIDTH);

    let mut out = String::new();
    out.push_str("SQL Query Executed:\n");
    out.push_str(&result.query);
    out.push_str("\n\n");
    out.push_str(
        "IMPORTANT: The results below are ALREADY FILTERED by the WHERE clause in the SQL query above.\n",
    );
    out.push_str(
        "Do NOT say the data doesn't contain information about filters - the results ARE filtered!\n\n",
    );
    out.push_str("Query Results:\n");
    out.push_str(&rule('='));
    out.push('\n');

    let columns: Vec<&str> = result
        .rows
        .first()
        .map(|r| r.column_names().collect())
        .unwrap_or_default();
    out.push_str(&format!("Columns: {}\n\n", columns.join(", ")));

    out.push_str("Results:\n");
    out.push_str(&rule('-'));
    out.push('\n');

    for row in result.rows.iter().take(MAX_FORMATTED_ROWS) {
        let parts: Vec<String> = columns
            .iter()
            .map(|col| {
                let value = row.get(col).map(render_value).unwrap_or_else(|| "null".into());
                format!("{}={}", col, value)
            })
            .collect();
        out.push_str(&parts.join(", "));
        out.push('\n');
    }
    if result.rows.len() > MAX_FORMATTED_ROWS {
        out.push_str(&format!(
            "... and {} more rows\n",
            result.rows.len() - MAX_FORMATTED_ROWS
        ));
    }

    out.push_str(&rule('-'));
    out.push('\n');
    out.push_str(&format!("Total Rows Returned: {}\n", result.rows.len()));
    out
}

/// Generates, executes, and formats aggregation queries over one table.
pub struct SqlQueryGenerator {
    generator: Arc<dyn Generator>,
    store: Arc<dyn StructuredStore>,
    template: Template,
}

impl SqlQueryGenerator {
    pub fn new(
        generator: Arc<dyn Generator>,
        store: Arc<dyn StructuredStore>,
        templates: &PromptTemplates,
    ) -> Self {
        Self {
            generator,
            store,
            template: templates.get(TemplateKind::SqlGeneration).clone(),
        }
    }

    /// Ask the model for a query answering `question` over `table`.
    ///
    /// Fails with [`Fault::MissingTable`] if the table has no columns and
    /// with [`Fault::EmptyResponse`] if nothing is left after cleaning.
    pub async fn generate_query(&self, question: &str, table: &str) -> Result<String> {
        let columns = self.store.columns(table).await?;
        if columns.is_empty() {
            return Err(Fault::MissingTable(table.to_string()));
        }

        let schema = describe_schema(table, &columns);
        let prompt = self
            .template
            .render(&[("schema", &schema), ("question", question)]);
        let reply = self.generator.complete(Prompt::text(prompt)).await?;

        let sql = clean_generated_sql(&reply);
        if sql.is_empty() {
            return Err(Fault::EmptyResponse);
        }
        info!(%sql, "generated SQL");
        Ok(sql)
    }

    /// Generate and execute a query, keeping the outcome typed.
    pub async fn run(&self, question: &str, table: &str) -> Result<AggregateOutcome> {
        let query = self.generate_query(question, table).await?;
        let rows = self.store.query(&query).await?;
        debug!(rows = rows.len(), "aggregated query returned");

        if rows.is_empty() {
            Ok(AggregateOutcome::NoData { query })
        } else {
            Ok(AggregateOutcome::Rows(AggregatedResult { query, rows }))
        }
    }

    /// Text contract: formatted rows, or a sentinel. Never fails.
    pub async fn execute_aggregated_query(&self, question: &str, table: &str) -> String {
        match self.run(question, table).await {
            Ok(AggregateOutcome::Rows(result)) => format_aggregated_result(&result),
            Ok(AggregateOutcome::NoData { .. }) => NO_DATA_SENTINEL.to_string(),
            Err(fault) => {
                warn!(error = %fault, "aggregated query failed");
                format!("{}{}", EXECUTION_FAILED_PREFIX, fault)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResultRow;
    use crate::testing::{row, ScriptedGenerator, StaticTable};
    use serde_json::json;

    const TABLE: &str = "csv_data_data";

    fn table() -> StaticTable {
        StaticTable::new(
            TABLE,
            vec![
                ColumnInfo::new("id", "INTEGER"),
                ColumnInfo::new("name", "TEXT"),
                ColumnInfo::new("label", "TEXT"),
            ],
        )
    }

    fn sql_gen(replies: Vec<Result<String>>, store: StaticTable) -> SqlQueryGenerator {
        SqlQueryGenerator::new(
            Arc::new(ScriptedGenerator::new(replies)),
            Arc::new(store),
            &PromptTemplates::builtin(),
        )
    }

    #[test]
    fn test_clean_generated_sql() {
        assert_eq!(
            clean_generated_sql("```sql\nSELECT COUNT(*) FROM t;\n```"),
            "SELECT COUNT(*) FROM t"
        );
        assert_eq!(clean_generated_sql("  SELECT 1  "), "SELECT 1");
        assert_eq!(clean_generated_sql("```\nSELECT 1 ;\n```"), "SELECT 1");
        assert_eq!(clean_generated_sql("```sql\n```"), "");
    }

    #[test]
    fn test_describe_schema() {
        let schema = describe_schema(
            "t",
            &[ColumnInfo::new("id", "INTEGER"), ColumnInfo::new("label", "TEXT")],
        );
        assert_eq!(schema, "Table: t\nColumns:\n  - id (INTEGER)\n  - label (TEXT)\n");
    }

    #[test]
    fn test_format_puts_query_before_rows() {
        let result = AggregatedResult {
            query: "SELECT label, COUNT(*) AS n FROM t WHERE label = 'PUBLIC' GROUP BY label".into(),
            rows: vec![ResultRow::new(vec![
                ("label".into(), json!("PUBLIC")),
                ("n".into(), json!(3)),
            ])],
        };
        let text = format_aggregated_result(&result);

        let query_at = text.find(&result.query).unwrap();
        let row_at = text.find("label=PUBLIC, n=3").unwrap();
        assert!(query_at < row_at);
        assert!(text.contains("ALREADY FILTERED"));
        assert!(text.contains("Columns: label, n\n"));
        assert!(text.ends_with("Total Rows Returned: 1\n"));
        assert!(!text.contains("more rows"));
    }

    #[test]
    fn test_format_caps_rows() {
        let rows: Vec<ResultRow> = (0..130).map(|i| row(vec![("n", i)])).collect();
        let text = format_aggregated_result(&AggregatedResult {
            query: "SELECT n FROM t".into(),
            rows,
        });

        let listed = text.lines().filter(|l| l.starts_with("n=")).count();
        assert_eq!(listed, MAX_FORMATTED_ROWS);
        assert!(text.contains("n=99\n"));
        assert!(!text.contains("n=100\n"));
        assert!(text.contains("... and 30 more rows\n"));
        assert!(text.contains("Total Rows Returned: 130"));
    }

    #[test]
    fn test_format_exactly_at_cap_has_no_marker() {
        let rows: Vec<ResultRow> = (0..100).map(|i| row(vec![("n", i)])).collect();
        let text = format_aggregated_result(&AggregatedResult {
            query: "SELECT n FROM t".into(),
            rows,
        });
        assert!(!text.contains("more rows"));
        assert!(text.contains("Total Rows Returned: 100"));
    }

    #[tokio::test]
    async fn test_execute_formats_rows() {
        let store = table().respond("WHERE label", vec![row(vec![("COUNT(*)", 3)])]);
        let generator = sql_gen(
            vec![Ok("```sql\nSELECT COUNT(*) FROM csv_data_data WHERE label='PUBLIC';\n```".into())],
            store,
        );

        let text = generator
            .execute_aggregated_query("How many files are PUBLIC?", TABLE)
            .await;
        assert!(text.contains("SELECT COUNT(*) FROM csv_data_data WHERE label='PUBLIC'\n"));
        assert!(text.contains("COUNT(*)=3"));
        assert!(text.contains("Total Rows Returned: 1"));
    }

    #[tokio::test]
    async fn test_execute_no_rows_is_sentinel() {
        let store = table().respond("SELECT", vec![]);
        let generator = sql_gen(vec![Ok("SELECT * FROM csv_data_data WHERE 0".into())], store);
        let text = generator.execute_aggregated_query("q", TABLE).await;
        assert_eq!(text, NO_DATA_SENTINEL);
    }

    #[tokio::test]
    async fn test_execute_store_error_is_sentinel() {
        let store = table().fail("SELECT", Fault::Store("no such column: colour".into()));
        let generator = sql_gen(vec![Ok("SELECT colour FROM csv_data_data".into())], store);
        let text = generator.execute_aggregated_query("q", TABLE).await;
        assert!(text.starts_with(EXECUTION_FAILED_PREFIX));
        assert!(text.contains("no such column: colour"));
    }

    #[tokio::test]
    async fn test_run_missing_table() {
        let generator = sql_gen(vec![Ok("SELECT 1".into())], StaticTable::missing(TABLE));
        let err = generator.run("q", TABLE).await.unwrap_err();
        assert_eq!(err, Fault::MissingTable(TABLE.into()));
    }

    #[tokio::test]
    async fn test_run_generation_failure() {
        let generator = sql_gen(vec![Err(Fault::Timeout(60))], table());
        assert_eq!(generator.run("q", TABLE).await, Err(Fault::Timeout(60)));
    }

    #[tokio::test]
    async fn test_prompt_contains_schema_and_question() {
        let scripted = Arc::new(ScriptedGenerator::new(vec![Ok("SELECT 1".into())]));
        let store = Arc::new(table().respond("SELECT 1", vec![row(vec![("1", 1)])]));
        let generator =
            SqlQueryGenerator::new(scripted.clone(), store.clone(), &PromptTemplates::builtin());

        let outcome = generator.run("How many labels?", TABLE).await.unwrap();
        assert!(matches!(outcome, AggregateOutcome::Rows(ref r) if r.rows.len() == 1));

        let prompt = match &scripted.prompts()[0] {
            Prompt::Text(t) => t.clone(),
            other => panic!("unexpected prompt {:?}", other),
        };
        assert!(prompt.contains("Table: csv_data_data"));
        assert!(prompt.contains("  - label (TEXT)"));
        assert!(prompt.contains("How many labels?"));
        assert_eq!(store.executed(), vec!["SELECT 1".to_string()]);
    }
}
