//! Request router.
//!
//! One question flows through:
//!
//! ```text
//! Received -> Classified -> { SQL | semantic search | conversation }
//!          -> Synthesizing -> Persisting -> Responded
//! ```
//!
//! - **ANALYTICAL**: presence check, generated SQL, synthesis over the
//!   formatted rows. No rows, or a failed query, answers with the data
//!   summary. A missing table or failed schema lookup falls back to the
//!   FACTUAL branch once.
//! - **FACTUAL**: top-K semantic search and synthesis over the joined
//!   documents. Nothing found answers with the data summary.
//! - **NONE**: a direct conversational reply; greeting on failure.
//!
//! [`Router::chat`] never fails. Successful syntheses are persisted as
//! conversation documents by a detached task.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use data_insights_core::generation::{Generator, Prompt};
use data_insights_core::intent::IntentClassifier;
use data_insights_core::models::{ChatResponse, ConversationRecord, Intent};
use data_insights_core::retrieval::{build_context, source_labels, SemanticRetriever};
use data_insights_core::sql::{format_aggregated_result, AggregateOutcome, SqlQueryGenerator};
use data_insights_core::store::{SemanticStore, StructuredStore};
use data_insights_core::summary::DataSummarizer;
use data_insights_core::synthesis::{synthesis_error_answer, AnswerSynthesizer, ContextKind};
use data_insights_core::templates::PromptTemplates;
use data_insights_core::Fault;

/// Reply used when the NONE branch cannot reach the model.
pub const GREETING_FALLBACK: &str =
    "Hello! I'm your data insights assistant. How can I help you analyze your data today?";

/// Instruction for the NONE branch; the question is appended.
pub const CONVERSATION_PROMPT: &str = "You are a friendly AI chatbot assistant that helps analyze data. \
The user is having a general conversation with you. Respond naturally and helpfully.\n\nUser: ";

/// Source label for answers grounded in `table`'s query results.
pub fn sql_source(table: &str) -> String {
    format!("SQL Database: {}", table)
}

/// The result of routing one question.
pub struct RoutedAnswer {
    pub intent: Intent,
    pub response: ChatResponse,
    /// Detached conversation write, present only after a successful synthesis.
    pub persistence: Option<JoinHandle<()>>,
}

/// A branch's answer and whether it came from a successful synthesis.
struct BranchAnswer {
    response: ChatResponse,
    synthesized: bool,
}

impl BranchAnswer {
    fn fallback(response: ChatResponse) -> Self {
        Self {
            response,
            synthesized: false,
        }
    }
}

pub struct Router {
    classifier: IntentClassifier,
    sql: SqlQueryGenerator,
    retriever: SemanticRetriever,
    summarizer: DataSummarizer,
    synthesizer: AnswerSynthesizer,
    generator: Arc<dyn Generator>,
    structured: Arc<dyn StructuredStore>,
    semantic: Arc<dyn SemanticStore>,
    table: String,
}

impl Router {
    pub fn new(
        generator: Arc<dyn Generator>,
        structured: Arc<dyn StructuredStore>,
        semantic: Arc<dyn SemanticStore>,
        templates: &PromptTemplates,
        table: impl Into<String>,
        top_k: usize,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(generator.clone(), templates),
            sql: SqlQueryGenerator::new(generator.clone(), structured.clone(), templates),
            retriever: SemanticRetriever::new(semantic.clone(), top_k),
            summarizer: DataSummarizer::new(structured.clone(), generator.clone(), templates),
            synthesizer: AnswerSynthesizer::new(generator.clone(), templates),
            generator,
            structured,
            semantic,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn sql(&self) -> &SqlQueryGenerator {
        &self.sql
    }

    pub fn summarizer(&self) -> &DataSummarizer {
        &self.summarizer
    }

    /// Answer `question`. Never fails.
    pub async fn chat(&self, question: &str) -> ChatResponse {
        self.chat_detailed(question).await.response
    }

    /// Answer `question`, also returning the intent and the persistence task.
    pub async fn chat_detailed(&self, question: &str) -> RoutedAnswer {
        info!(question, "question received");
        let intent = self.classifier.classify(question).await;
        info!(intent = %intent, "classified question");

        let answer = match intent {
            Intent::None => BranchAnswer::fallback(self.converse(question).await),
            Intent::Factual => self.factual(question).await,
            Intent::Analytical => match self.analytical(question).await {
                Ok(answer) => answer,
                Err(fault) => {
                    warn!(error = %fault, "analytical path failed, falling back to semantic search");
                    self.factual(question).await
                }
            },
        };

        let persistence = answer
            .synthesized
            .then(|| self.persist(question, &answer.response.answer));

        RoutedAnswer {
            intent,
            response: answer.response,
            persistence,
        }
    }

    /// ANALYTICAL branch. `Err` means "retry as FACTUAL".
    async fn analytical(&self, question: &str) -> Result<BranchAnswer, Fault> {
        if !self.structured.exists(&self.table).await? {
            return Err(Fault::MissingTable(self.table.clone()));
        }

        match self.sql.run(question, &self.table).await {
            Ok(AggregateOutcome::Rows(result)) => {
                let context = format_aggregated_result(&result);
                Ok(self
                    .synthesize(
                        question,
                        &context,
                        ContextKind::Aggregated,
                        vec![sql_source(&self.table)],
                        result.rows.len(),
                    )
                    .await)
            }
            Ok(AggregateOutcome::NoData { query }) => {
                info!(%query, "query returned no rows, answering with data summary");
                Ok(self.data_summary(question).await)
            }
            Err(fault @ Fault::MissingTable(_)) => Err(fault),
            Err(fault) => {
                warn!(error = %fault, "aggregated query failed, answering with data summary");
                Ok(self.data_summary(question).await)
            }
        }
    }

    async fn factual(&self, question: &str) -> BranchAnswer {
        let documents = match self.retriever.search(question).await {
            Ok(documents) => documents,
            Err(fault) => {
                warn!(error = %fault, "semantic search failed");
                Vec::new()
            }
        };

        if documents.is_empty() {
            info!("no documents found, answering with data summary");
            return self.data_summary(question).await;
        }

        let context = build_context(&documents);
        self.synthesize(
            question,
            &context,
            ContextKind::Retrieved,
            source_labels(&documents),
            documents.len(),
        )
        .await
    }

    async fn converse(&self, question: &str) -> ChatResponse {
        let prompt = Prompt::text(format!("{}{}", CONVERSATION_PROMPT, question));
        match self.generator.complete(prompt).await {
            Ok(reply) if !reply.trim().is_empty() => ChatResponse::general(reply),
            Ok(_) => {
                warn!("empty conversational reply, using greeting");
                ChatResponse::general(GREETING_FALLBACK)
            }
            Err(fault) => {
                warn!(error = %fault, "conversational reply failed, using greeting");
                ChatResponse::general(GREETING_FALLBACK)
            }
        }
    }

    async fn data_summary(&self, question: &str) -> BranchAnswer {
        let answer = self
            .summarizer
            .get_data_summary_with_suggestions(&self.table, question)
            .await;
        BranchAnswer::fallback(ChatResponse::data_summary(answer))
    }

    async fn synthesize(
        &self,
        question: &str,
        context: &str,
        kind: ContextKind,
        sources: Vec<String>,
        documents_used: usize,
    ) -> BranchAnswer {
        debug!(context_chars = context.chars().count(), documents_used, "context assembled");
        match self.synthesizer.synthesize(question, context, kind).await {
            Ok(answer) => BranchAnswer {
                response: ChatResponse::new(answer, sources, documents_used),
                synthesized: true,
            },
            Err(fault) => {
                error!(error = %fault, "answer synthesis failed");
                BranchAnswer::fallback(ChatResponse::new(
                    synthesis_error_answer(&fault),
                    sources,
                    documents_used,
                ))
            }
        }
    }

    fn persist(&self, question: &str, answer: &str) -> JoinHandle<()> {
        let semantic = self.semantic.clone();
        let document = ConversationRecord::new(question, answer).into_document();
        tokio::spawn(async move {
            match semantic.add(vec![document]).await {
                Ok(()) => info!("stored conversation for future retrieval"),
                Err(fault) => error!(error = %fault, "failed to store conversation"),
            }
        })
    }
}
