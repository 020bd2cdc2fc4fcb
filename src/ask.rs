//! One-shot question commands: `ask`, `query`, and `summary`.

use anyhow::{bail, Result};

use data_insights_core::models::ChatResponse;

use crate::app::AppContext;
use crate::config::Config;

fn require_question(question: &str) -> Result<&str> {
    let question = question.trim();
    if question.is_empty() {
        bail!("question must not be empty");
    }
    Ok(question)
}

fn print_response(response: &ChatResponse) {
    println!("{}", response.answer);
    println!();
    if response.sources.is_empty() {
        println!("sources: (none)");
    } else {
        println!("sources:");
        for source in &response.sources {
            println!("  - {}", source);
        }
    }
    println!("documents used: {}", response.documents_used);
}

/// Route one question and print the answer. Waits for the conversation to
/// be stored before returning.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let question = require_question(question)?;
    let context = AppContext::open(config).await?;

    let routed = context.router.chat_detailed(question).await;
    print_response(&routed.response);

    if let Some(handle) = routed.persistence {
        handle.await?;
    }
    context.close().await;
    Ok(())
}

/// Run only SQL generation and execution and print the formatted context.
pub async fn run_query(config: &Config, question: &str) -> Result<()> {
    let question = require_question(question)?;
    let context = AppContext::open(config).await?;

    let router = &context.router;
    let text = router
        .sql()
        .execute_aggregated_query(question, router.table())
        .await;
    println!("{}", text);

    context.close().await;
    Ok(())
}

/// Print the data summary fallback answer for `question`.
pub async fn run_summary(config: &Config, question: Option<&str>) -> Result<()> {
    let question = question.map(str::trim).unwrap_or("");
    let context = AppContext::open(config).await?;

    let router = &context.router;
    let text = router
        .summarizer()
        .get_data_summary_with_suggestions(router.table(), question)
        .await;
    println!("{}", text);

    context.close().await;
    Ok(())
}
