//! Intent classification.
//!
//! The model's free-form reply is decoded with a priority-ordered rule list
//! ([`INTENT_RULES`]). The first matching rule wins; when nothing matches the
//! question is treated as [`Intent::Factual`], which degrades to read-only
//! retrieval instead of generating SQL. [`Intent::None`] is only produced by
//! an explicit `NONE` reply, never as a fallback.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::generation::{Generator, Prompt};
use crate::models::Intent;
use crate::templates::{PromptTemplates, Template, TemplateKind};

/// How a rule inspects the upper-cased, trimmed model reply.
#[derive(Debug, Clone, Copy)]
pub enum Match {
    /// The reply contains the token anywhere.
    Contains(&'static str),
    /// The reply, stripped of surrounding punctuation, is exactly the token.
    Exact(&'static str),
}

/// Decoding rules, highest priority first.
pub const INTENT_RULES: &[(Match, Intent)] = &[
    (Match::Contains("ANALYTICAL"), Intent::Analytical),
    (Match::Contains("FACTUAL"), Intent::Factual),
    (Match::Exact("NONE"), Intent::None),
];

/// Intent used when no rule matches or the model call fails.
pub const DEFAULT_INTENT: Intent = Intent::Factual;

/// Decode a classifier reply into an [`Intent`].
pub fn parse_intent(response: &str) -> Intent {
    match_rule(response).unwrap_or(DEFAULT_INTENT)
}

fn match_rule(response: &str) -> Option<Intent> {
    let normalized = response.trim().to_uppercase();
    let bare = normalized.trim_matches(|c: char| !c.is_ascii_alphanumeric());

    INTENT_RULES.iter().find_map(|(rule, intent)| {
        let hit = match rule {
            Match::Contains(token) => normalized.contains(token),
            Match::Exact(token) => bare == *token,
        };
        hit.then_some(*intent)
    })
}

/// Maps a question to an [`Intent`] using the language model.
pub struct IntentClassifier {
    generator: Arc<dyn Generator>,
    template: Template,
}

impl IntentClassifier {
    pub fn new(generator: Arc<dyn Generator>, templates: &PromptTemplates) -> Self {
        Self {
            generator,
            template: templates.get(TemplateKind::IntentClassification).clone(),
        }
    }

    /// Ask the model and decode its reply. Fails only if the model call fails.
    pub async fn try_classify(&self, question: &str) -> Result<Intent> {
        let prompt = self.template.render(&[("question", question)]);
        let reply = self.generator.complete(Prompt::text(prompt)).await?;

        let intent = match match_rule(&reply) {
            Some(intent) => intent,
            None => {
                warn!(reply = %reply.trim(), "unparseable intent reply, defaulting to {}", DEFAULT_INTENT);
                DEFAULT_INTENT
            }
        };
        info!(%intent, "classified question");
        Ok(intent)
    }

    /// Classify `question`, defaulting to [`Intent::Factual`] on any failure.
    pub async fn classify(&self, question: &str) -> Intent {
        match self.try_classify(question).await {
            Ok(intent) => intent,
            Err(fault) => {
                warn!(error = %fault, "intent classification failed, defaulting to {}", DEFAULT_INTENT);
                DEFAULT_INTENT
            }
        }
    }
}
