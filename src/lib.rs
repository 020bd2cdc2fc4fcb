//! # Data Insights
//!
//! Ask natural-language questions about a CSV dataset.
//!
//! The dataset is ingested twice: into a SQLite table for generated SQL,
//! and into a semantic index of row documents. Each question is classified
//! and routed to one of three branches, and the answer is grounded in
//! whatever that branch retrieved.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌─────────────────────┐
//! │   CSV    │──▶│    Ingest     │──▶│ SQLite table + FTS5 │
//! └──────────┘   └───────────────┘   └──────────┬──────────┘
//!                                               │
//!                ┌──────────────────────────────┤
//!                ▼                              ▼
//!          ┌──────────┐  classify   ┌──────────────────────┐
//!          │  Router  │────────────▶│ SQL | search | chat  │
//!          └────┬─────┘             └──────────────────────┘
//!               │
//!       ┌───────┴───────┐
//!       ▼               ▼
//!  ┌──────────┐   ┌──────────┐
//!  │   CLI    │   │   HTTP   │
//!  │(insights)│   │  (axum)  │
//!  └──────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! insights init
//! insights ingest
//! insights ask "How many files are PUBLIC?"
//! insights serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Semantic index and bookkeeping tables |
//! | [`sqlite_store`] | SQLite structured and semantic stores |
//! | [`http`] | JSON POST with retry and backoff |
//! | [`llm`] | Chat-completion generators |
//! | [`embedding`] | Embedding providers |
//! | [`ingest`] | CSV ingestion |
//! | [`router`] | Intent routing and fallbacks |
//! | [`app`] | Wiring config into a router |
//! | [`ask`] | One-shot CLI question commands |
//! | [`server`] | HTTP server |

pub mod app;
pub mod ask;
pub mod config;
pub mod db;
pub mod embedding;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod router;
pub mod server;
pub mod sqlite_store;
