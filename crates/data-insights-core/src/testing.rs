//! Test doubles for the collaborator traits.
//!
//! Compiled for this crate's own tests and, behind the `testing` feature,
//! for the application crate's tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Fault, Result};
use crate::generation::{Generator, Prompt};
use crate::models::{ColumnInfo, ResultRow};
use crate::store::StructuredStore;

/// A [`Generator`] that replays a fixed list of replies in order and
/// records every prompt it receives.
///
/// Once the script runs out every call fails with [`Fault::Generation`].
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn complete(&self, prompt: Prompt) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt);
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .unwrap_or_else(|| Err(Fault::Generation("script exhausted".to_string())))
    }
}

/// A [`StructuredStore`] with a fixed schema that answers queries by
/// substring match against registered patterns.
///
/// Patterns are checked in registration order; the first pattern contained
/// in the SQL text wins. Unmatched queries fail with [`Fault::Store`].
pub struct StaticTable {
    name: String,
    columns: Vec<ColumnInfo>,
    responses: Vec<(String, Result<Vec<ResultRow>>)>,
    executed: Mutex<Vec<String>>,
}

impl StaticTable {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        Self {
            name: name.into(),
            columns,
            responses: Vec::new(),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// A table that does not exist: no columns, `exists` is false.
    pub fn missing(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn respond(mut self, pattern: impl Into<String>, rows: Vec<ResultRow>) -> Self {
        self.responses.push((pattern.into(), Ok(rows)));
        self
    }

    pub fn fail(mut self, pattern: impl Into<String>, fault: Fault) -> Self {
        self.responses.push((pattern.into(), Err(fault)));
        self
    }

    /// Every SQL string executed so far.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl StructuredStore for StaticTable {
    async fn query(&self, sql: &str) -> Result<Vec<ResultRow>> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }
        self.responses
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, outcome)| outcome.clone())
            .unwrap_or_else(|| Err(Fault::Store(format!("no such table or query: {}", sql))))
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        if table == self.name {
            Ok(self.columns.clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn exists(&self, table: &str) -> Result<bool> {
        Ok(table == self.name && !self.columns.is_empty())
    }
}

/// Build a [`ResultRow`] from `(column, value)` pairs.
pub fn row<V: Into<serde_json::Value>>(fields: Vec<(&str, V)>) -> ResultRow {
    fields
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.into()))
        .collect()
}
