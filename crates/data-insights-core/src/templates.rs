//! Prompt templates with named placeholders.
//!
//! Templates are read once at startup into an immutable [`PromptTemplates`]
//! value and passed to each component's constructor. Built-in defaults are
//! compiled into the crate; the application may replace any of them with a
//! file from the configured prompts directory.
//!
//! # Placeholders
//!
//! | Template | File | Placeholders |
//! |----------|------|--------------|
//! | Intent classification | `intent-classification.txt` | `{question}` |
//! | SQL generation | `sql-generation.txt` | `{schema}`, `{question}` |
//! | Data summary | `data-summary.txt` | `{dataSummary}`, `{originalQuestion}` |
//! | Analytics | `analytics.txt` | `{context}`, `{question}` |
//!
//! Rendering is single-pass: a placeholder that appears inside a substituted
//! value is left as-is, so retrieved text containing `{question}` cannot
//! rewrite the prompt.

use crate::error::{Fault, Result};

/// Identifies one of the four prompt templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    IntentClassification,
    SqlGeneration,
    DataSummary,
    Analytics,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 4] = [
        TemplateKind::IntentClassification,
        TemplateKind::SqlGeneration,
        TemplateKind::DataSummary,
        TemplateKind::Analytics,
    ];

    /// File name looked up in the prompts directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            TemplateKind::IntentClassification => "intent-classification.txt",
            TemplateKind::SqlGeneration => "sql-generation.txt",
            TemplateKind::DataSummary => "data-summary.txt",
            TemplateKind::Analytics => "analytics.txt",
        }
    }

    /// Placeholder names this template must contain.
    pub fn placeholders(&self) -> &'static [&'static str] {
        match self {
            TemplateKind::IntentClassification => &["question"],
            TemplateKind::SqlGeneration => &["schema", "question"],
            TemplateKind::DataSummary => &["dataSummary", "originalQuestion"],
            TemplateKind::Analytics => &["context", "question"],
        }
    }

    fn builtin_text(&self) -> &'static str {
        match self {
            TemplateKind::IntentClassification => {
                include_str!("../prompts/intent-classification.txt")
            }
            TemplateKind::SqlGeneration => include_str!("../prompts/sql-generation.txt"),
            TemplateKind::DataSummary => include_str!("../prompts/data-summary.txt"),
            TemplateKind::Analytics => include_str!("../prompts/analytics.txt"),
        }
    }
}

/// A validated template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    text: String,
}

impl Template {
    /// Validate `text` against the placeholders `kind` requires.
    pub fn new(kind: TemplateKind, text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let missing: Vec<&str> = kind
            .placeholders()
            .iter()
            .copied()
            .filter(|name| !text.contains(&format!("{{{}}}", name)))
            .collect();
        if !missing.is_empty() {
            return Err(Fault::Template(format!(
                "{} is missing placeholder(s): {}",
                kind.file_name(),
                missing
                    .iter()
                    .map(|m| format!("{{{}}}", m))
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        Ok(Self { text })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn render(&self, values: &[(&str, &str)]) -> String {
        render(&self.text, values)
    }
}

/// The full template set, read once at startup.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    intent: Template,
    sql: Template,
    summary: Template,
    analytics: Template,
}

impl PromptTemplates {
    /// The templates compiled into this crate.
    pub fn builtin() -> Self {
        let load = |kind: TemplateKind| Template {
            text: kind.builtin_text().to_string(),
        };
        Self {
            intent: load(TemplateKind::IntentClassification),
            sql: load(TemplateKind::SqlGeneration),
            summary: load(TemplateKind::DataSummary),
            analytics: load(TemplateKind::Analytics),
        }
    }

    /// Replace one template, validating its placeholders.
    pub fn with_override(mut self, kind: TemplateKind, text: impl Into<String>) -> Result<Self> {
        let template = Template::new(kind, text)?;
        match kind {
            TemplateKind::IntentClassification => self.intent = template,
            TemplateKind::SqlGeneration => self.sql = template,
            TemplateKind::DataSummary => self.summary = template,
            TemplateKind::Analytics => self.analytics = template,
        }
        Ok(self)
    }

    pub fn get(&self, kind: TemplateKind) -> &Template {
        match kind {
            TemplateKind::IntentClassification => &self.intent,
            TemplateKind::SqlGeneration => &self.sql,
            TemplateKind::DataSummary => &self.summary,
            TemplateKind::Analytics => &self.analytics,
        }
    }
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Substitute `{name}` placeholders in one left-to-right pass.
///
/// Unknown placeholders and unmatched braces are copied through unchanged.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after[..end];
        match values.iter().find(|(name, _)| *name == key) {
            Some((_, value)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_known_placeholders() {
        let out = render(
            "Q: {question}\nData: {context}",
            &[("question", "how many?"), ("context", "rows")],
        );
        assert_eq!(out, "Q: how many?\nData: rows");
    }

    #[test]
    fn test_render_is_single_pass() {
        let out = render(
            "{context} / {question}",
            &[("context", "text with {question} inside"), ("question", "real")],
        );
        assert_eq!(out, "text with {question} inside / real");
    }

    #[test]
    fn test_render_keeps_unknown_and_unbalanced_braces() {
        let out = render("{\"a\": {x}} {question", &[("question", "q")]);
        assert_eq!(out, "{\"a\": {x}} {question");

        let out = render("{ {question}", &[("question", "q")]);
        assert_eq!(out, "{ q");
    }

    #[test]
    fn test_builtin_templates_have_their_placeholders() {
        let templates = PromptTemplates::builtin();
        for kind in TemplateKind::ALL {
            let text = templates.get(kind).text().to_string();
            assert!(Template::new(kind, text).is_ok(), "{:?}", kind);
        }
    }

    #[test]
    fn test_override_rejects_missing_placeholder() {
        let err = PromptTemplates::builtin()
            .with_override(TemplateKind::Analytics, "Only {question} here")
            .unwrap_err();
        assert!(matches!(err, Fault::Template(ref m) if m.contains("{context}")));
    }

    #[test]
    fn test_override_replaces_template() {
        let templates = PromptTemplates::builtin()
            .with_override(TemplateKind::IntentClassification, "Classify: {question}")
            .unwrap();
        let rendered = templates
            .get(TemplateKind::IntentClassification)
            .render(&[("question", "hi")]);
        assert_eq!(rendered, "Classify: hi");
    }
}
