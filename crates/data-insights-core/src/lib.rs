//! # Data Insights Core
//!
//! Runtime-free logic for answering natural-language questions over a
//! single ingested table: intent classification, SQL aggregation,
//! semantic retrieval glue, the no-results data summary, and grounded
//! answer synthesis.
//!
//! This crate contains no tokio, sqlx, filesystem, or network code. Every
//! collaborator (structured store, semantic store, language model) is a
//! trait object supplied by the application crate.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Questions, intents, documents, query results, responses |
//! | [`error`] | The [`Fault`] type shared by every component |
//! | [`templates`] | Prompt templates and single-pass rendering |
//! | [`generation`] | The [`Generator`](generation::Generator) capability |
//! | [`store`] | Structured and semantic store traits |
//! | [`embedding`] | Embedder trait and vector helpers |
//! | [`intent`] | Intent classifier |
//! | [`sql`] | Natural-language-to-SQL generation and result formatting |
//! | [`retrieval`] | Semantic search, context assembly, source labels |
//! | [`summary`] | Data summary fallback |
//! | [`synthesis`] | Final answer synthesis |

pub mod embedding;
pub mod error;
pub mod generation;
pub mod intent;
pub mod models;
pub mod retrieval;
pub mod sql;
pub mod store;
pub mod summary;
pub mod synthesis;
pub mod templates;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Fault, Result};
