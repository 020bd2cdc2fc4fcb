//! The language-model capability.
//!
//! A [`Generator`] turns a [`Prompt`] into text. The core assumes nothing
//! else about it: no determinism, no caching, no retries beyond what an
//! implementation chooses to do internally. Timeouts surface as
//! [`Fault::Timeout`](crate::Fault::Timeout) and are handled like any other
//! failure.

use async_trait::async_trait;

use crate::error::Result;

/// Input to a [`Generator`]: either a single prompt or a system/user pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// A single user-role prompt.
    Text(String),
    /// A system-role instruction followed by a user-role message.
    Messages { system: String, user: String },
}

impl Prompt {
    pub fn text(prompt: impl Into<String>) -> Self {
        Prompt::Text(prompt.into())
    }

    pub fn messages(system: impl Into<String>, user: impl Into<String>) -> Self {
        Prompt::Messages {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Total prompt length in characters, for logging.
    pub fn char_len(&self) -> usize {
        match self {
            Prompt::Text(t) => t.chars().count(),
            Prompt::Messages { system, user } => system.chars().count() + user.chars().count(),
        }
    }
}

/// Text-in, text-out language model.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn complete(&self, prompt: Prompt) -> Result<String>;
}
