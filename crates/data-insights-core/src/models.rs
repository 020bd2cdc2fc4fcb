//! Core data models.
//!
//! These types describe what flows through one chat request: the
//! classified [`Intent`], the [`RetrievedDocument`]s and [`AggregatedResult`]s
//! that become context, and the [`ChatResponse`] handed back to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Source shown when a branch found nothing and the data summary answered.
pub const DATA_SUMMARY_SOURCE: &str = "Data Summary";

/// Source shown for greetings and chit-chat.
pub const GENERAL_CONVERSATION_SOURCE: &str = "General Conversation";

/// Maximum number of provenance strings returned in [`ChatResponse::sources`].
pub const MAX_SOURCES: usize = 5;

/// File label attached to persisted conversations.
pub const CONVERSATION_FILE: &str = "chat_history";

/// Document metadata: a JSON object with at least `source` and `file`.
pub type Metadata = Map<String, Value>;

/// How a question should be handled.
///
/// Produced once per request by the intent classifier and never revised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Intent {
    /// Lookup of specific records or details: semantic retrieval.
    Factual,
    /// Counting, grouping, or other aggregation: generated SQL.
    Analytical,
    /// Greeting or small talk: answered directly by the model.
    None,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Factual => "FACTUAL",
            Intent::Analytical => "ANALYTICAL",
            Intent::None => "NONE",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance tag stored in a document's `source` metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentSource {
    /// One ingested CSV row.
    Csv,
    /// A previously answered question.
    Conversation,
    /// The table overview written at ingestion time.
    SqlSummary,
}

impl DocumentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentSource::Csv => "csv",
            DocumentSource::Conversation => "conversation",
            DocumentSource::SqlSummary => "sql_summary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "csv" => Some(DocumentSource::Csv),
            "conversation" => Some(DocumentSource::Conversation),
            "sql_summary" => Some(DocumentSource::SqlSummary),
            _ => None,
        }
    }
}

/// A unit of retrievable context: body text plus metadata.
///
/// Created at ingestion time or when a conversation is persisted.
/// Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub text: String,
    pub metadata: Metadata,
}

impl RetrievedDocument {
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    /// Build the document for one ingested CSV row (`row` is 1-based).
    pub fn csv_row(text: impl Into<String>, file: &str, row: usize) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), DocumentSource::Csv.as_str().into());
        metadata.insert("file".into(), file.into());
        metadata.insert("row".into(), row.into());
        Self::new(text, metadata)
    }

    /// Raw `source` tag, if present.
    pub fn source_tag(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }

    pub fn source(&self) -> Option<DocumentSource> {
        self.source_tag().and_then(DocumentSource::parse)
    }

    pub fn file(&self) -> &str {
        self.metadata
            .get("file")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
    }

    /// Human-readable provenance string for this document.
    pub fn source_label(&self) -> String {
        match self.source() {
            Some(DocumentSource::Conversation) => {
                format!("Previous conversation from {}", self.file())
            }
            Some(DocumentSource::SqlSummary) => format!("Database summary from {}", self.file()),
            _ => {
                let row = self
                    .metadata
                    .get("row")
                    .map(render_value)
                    .unwrap_or_else(|| "null".to_string());
                format!("Row {} from {}", row, self.file())
            }
        }
    }
}

/// A column name/type pair from schema introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    /// The surrogate key column added at ingestion; hidden from summaries.
    pub fn is_identifier(&self) -> bool {
        self.name.eq_ignore_ascii_case("id")
    }

    /// True for character-typed columns (SQLite text affinity rules).
    pub fn is_text(&self) -> bool {
        let ty = self.data_type.to_ascii_uppercase();
        ty.contains("TEXT") || ty.contains("CHAR") || ty.contains("CLOB")
    }
}

/// One result-set row with its columns in result order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ResultRow {
    fields: Vec<(String, Value)>,
}

impl ResultRow {
    pub fn new(fields: Vec<(String, Value)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, Value)> for ResultRow {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Rows returned by a generated query, paired with the query text.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedResult {
    pub query: String,
    pub rows: Vec<ResultRow>,
}

/// The externally visible answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub answer: String,
    /// Distinct provenance strings, first-occurrence order, at most [`MAX_SOURCES`].
    pub sources: Vec<String>,
    /// Number of inputs that fed the answer: retrieved documents for
    /// FACTUAL answers, result rows for SQL answers (a GROUP BY returning
    /// eight rows counts eight), zero for greetings and the data summary.
    pub documents_used: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatResponse {
    pub fn new(answer: impl Into<String>, sources: Vec<String>, documents_used: usize) -> Self {
        let mut sources = dedup_sources(sources);
        sources.truncate(MAX_SOURCES);
        Self {
            answer: answer.into(),
            sources,
            documents_used,
            error: None,
        }
    }

    /// Response for the no-results fallback.
    pub fn data_summary(answer: impl Into<String>) -> Self {
        Self::new(answer, vec![DATA_SUMMARY_SOURCE.to_string()], 0)
    }

    /// Response for the general-conversation branch.
    pub fn general(answer: impl Into<String>) -> Self {
        Self::new(answer, vec![GENERAL_CONVERSATION_SOURCE.to_string()], 0)
    }
}

fn dedup_sources(sources: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    sources
        .into_iter()
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// A question/answer pair persisted for later retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationRecord {
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationRecord {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn into_document(self) -> RetrievedDocument {
        let text = format!("Question: {}\n\nAnswer: {}", self.question, self.answer);
        let mut metadata = Metadata::new();
        metadata.insert(
            "source".into(),
            DocumentSource::Conversation.as_str().into(),
        );
        metadata.insert("file".into(), CONVERSATION_FILE.into());
        metadata.insert("question".into(), self.question.into());
        metadata.insert("answer".into(), self.answer.into());
        metadata.insert("timestamp".into(), self.timestamp.timestamp_millis().into());
        RetrievedDocument::new(text, metadata)
    }
}

/// Render a cell value the way it should appear in model context:
/// strings unquoted, `null` for missing values, JSON text for the rest.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc_with(meta: Value) -> RetrievedDocument {
        RetrievedDocument::new("body", meta.as_object().cloned().unwrap())
    }

    #[test]
    fn test_source_label_variants() {
        let csv = RetrievedDocument::csv_row("a: b.", "data.csv", 7);
        assert_eq!(csv.source_label(), "Row 7 from data.csv");

        let conv = doc_with(json!({"source": "conversation", "file": "chat_history"}));
        assert_eq!(conv.source_label(), "Previous conversation from chat_history");

        let summary = doc_with(json!({"source": "sql_summary", "file": "data.csv"}));
        assert_eq!(summary.source_label(), "Database summary from data.csv");
    }

    #[test]
    fn test_source_label_unknown_source_uses_row_form() {
        let doc = doc_with(json!({"file": "other.csv"}));
        assert_eq!(doc.source_label(), "Row null from other.csv");
    }

    #[test]
    fn test_chat_response_caps_and_dedups_sources() {
        let sources = vec!["a", "b", "a", "c", "d", "e", "f"]
            .into_iter()
            .map(String::from)
            .collect();
        let resp = ChatResponse::new("x", sources, 9);
        assert_eq!(resp.sources, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(resp.documents_used, 9);
    }

    #[test]
    fn test_chat_response_wire_shape() {
        let resp = ChatResponse::data_summary("nothing matched");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["sources"], json!(["Data Summary"]));
        assert_eq!(json["documentsUsed"], json!(0));
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_conversation_record_document() {
        let doc = ConversationRecord::new("How many?", "Three.").into_document();
        assert_eq!(doc.text, "Question: How many?\n\nAnswer: Three.");
        assert_eq!(doc.source(), Some(DocumentSource::Conversation));
        assert_eq!(doc.file(), CONVERSATION_FILE);
        assert_eq!(doc.metadata["question"], json!("How many?"));
        assert!(doc.metadata["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_column_info_kinds() {
        assert!(ColumnInfo::new("ID", "INTEGER").is_identifier());
        assert!(ColumnInfo::new("label", "TEXT").is_text());
        assert!(ColumnInfo::new("name", "varchar(20)").is_text());
        assert!(!ColumnInfo::new("size", "REAL").is_text());
    }

    #[test]
    fn test_render_value() {
        assert_eq!(render_value(&json!("PUBLIC")), "PUBLIC");
        assert_eq!(render_value(&json!(42)), "42");
        assert_eq!(render_value(&json!(2.5)), "2.5");
        assert_eq!(render_value(&Value::Null), "null");
    }
}
