//! # Data Insights CLI (`insights`)
//!
//! ## Usage
//!
//! ```bash
//! insights --config ./config/insights.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `insights init` | Create the SQLite database and semantic tables |
//! | `insights ingest [--full]` | Load the configured CSV |
//! | `insights ask "<question>"` | Answer one question |
//! | `insights query "<question>"` | Show the formatted SQL results for a question |
//! | `insights summary ["<question>"]` | Show the data summary answer |
//! | `insights serve` | Start the HTTP server |
//!
//! Logs go to stderr; set `RUST_LOG` to override the default filter.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use data_insights::{ask, config, ingest, migrate, server};

/// Data Insights: natural-language questions over a CSV dataset.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/insights.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "insights",
    about = "Ask natural-language questions about a CSV dataset",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/insights.toml")]
    config: PathBuf,

    /// Log at debug level unless `RUST_LOG` is set.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent. The dataset table is created by `ingest`.
    Init,

    /// Ingest the configured CSV into the table and the semantic index.
    ///
    /// Skipped when the data is already loaded.
    Ingest {
        /// Drop and reload the table and row documents.
        #[arg(long)]
        full: bool,
    },

    /// Answer a question and print its sources.
    Ask {
        question: String,
    },

    /// Generate and run SQL for a question, printing the formatted results.
    Query {
        question: String,
    },

    /// Print the data summary answer, optionally tailored to a question.
    Summary {
        question: Option<String>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "data_insights={level},data_insights_core={level},tower_http={level}"
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { full } => {
            ingest::run_ingest(&cfg, full).await?;
        }
        Commands::Ask { question } => {
            ask::run_ask(&cfg, &question).await?;
        }
        Commands::Query { question } => {
            ask::run_query(&cfg, &question).await?;
        }
        Commands::Summary { question } => {
            ask::run_summary(&cfg, question.as_deref()).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
