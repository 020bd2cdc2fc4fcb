//! Fault type shared by every pipeline component.
//!
//! Components return `Result<T, Fault>` internally. The router is the only
//! place that turns a fault into a degraded answer; nothing below it decides
//! what the caller sees.

use thiserror::Error;

/// A failure inside one stage of the question-answering pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Fault {
    /// The language model call failed (transport, API error, bad payload).
    #[error("generation failed: {0}")]
    Generation(String),

    /// The language model did not answer within the configured timeout.
    #[error("generation timed out after {0}s")]
    Timeout(u64),

    /// The language model answered with no usable text.
    #[error("model returned an empty response")]
    EmptyResponse,

    /// A structured or semantic store operation failed.
    #[error("store error: {0}")]
    Store(String),

    /// The dataset table is absent or has no columns.
    #[error("table not found: {0}")]
    MissingTable(String),

    /// A prompt template is missing or malformed.
    #[error("template error: {0}")]
    Template(String),

    /// Embedding the query or documents failed.
    #[error("embedding error: {0}")]
    Embedding(String),
}

pub type Result<T> = std::result::Result<T, Fault>;
