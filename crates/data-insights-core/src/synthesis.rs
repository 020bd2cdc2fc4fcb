//! Final answer synthesis.
//!
//! The analytics template is filled with the context blob and the question
//! and sent as the system message; the user message is a fixed instruction.

use std::sync::Arc;

use tracing::{debug, error};

use crate::error::{Fault, Result};
use crate::generation::{Generator, Prompt};
use crate::templates::{PromptTemplates, Template, TemplateKind};

/// User-role message sent with every synthesis request.
pub const ANALYZE_INSTRUCTION: &str = "Please analyze the above data and answer the question.";

/// What produced the context blob. Logged, never sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// Formatted SQL results.
    Aggregated,
    /// Concatenated retrieved documents.
    Retrieved,
}

impl ContextKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKind::Aggregated => "aggregated",
            ContextKind::Retrieved => "retrieved",
        }
    }
}

/// The answer shown when synthesis failed.
pub fn synthesis_error_answer(fault: &Fault) -> String {
    format!("I encountered an error generating the response: {}", fault)
}

pub struct AnswerSynthesizer {
    generator: Arc<dyn Generator>,
    template: Template,
}

impl AnswerSynthesizer {
    pub fn new(generator: Arc<dyn Generator>, templates: &PromptTemplates) -> Self {
        Self {
            generator,
            template: templates.get(TemplateKind::Analytics).clone(),
        }
    }

    /// Build the system/user prompt pair for `question` over `context`.
    pub fn prompt(&self, question: &str, context: &str) -> Prompt {
        let system = self
            .template
            .render(&[("context", context), ("question", question)]);
        Prompt::messages(system, ANALYZE_INSTRUCTION)
    }

    /// Generate a grounded answer. A blank reply is [`Fault::EmptyResponse`].
    pub async fn synthesize(&self, question: &str, context: &str, kind: ContextKind) -> Result<String> {
        debug!(
            context_kind = kind.as_str(),
            context_chars = context.chars().count(),
            "synthesizing answer"
        );
        let reply = self.generator.complete(self.prompt(question, context)).await?;
        if reply.trim().is_empty() {
            return Err(Fault::EmptyResponse);
        }
        Ok(reply)
    }

    /// Text contract: the answer, or an error message in its place.
    pub async fn generate_final_response(&self, question: &str, context: &str, kind: ContextKind) -> String {
        match self.synthesize(question, context, kind).await {
            Ok(answer) => answer,
            Err(fault) => {
                error!(error = %fault, "answer synthesis failed");
                synthesis_error_answer(&fault)
            }
        }
    }
}
