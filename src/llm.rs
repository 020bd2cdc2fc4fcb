//! Chat-completion [`Generator`] implementations.
//!
//! | Provider | Generator |
//! |----------|-----------|
//! | `openai` | [`ChatCompletionGenerator`] against `https://api.openai.com/v1` |
//! | `ollama` | [`ChatCompletionGenerator`] against Ollama's OpenAI-compatible API |
//! | `disabled` | [`DisabledGenerator`], which always fails |
//!
//! A failed or timed-out call is a [`Fault`]; the router decides what the
//! user sees.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use data_insights_core::generation::{Generator, Prompt};
use data_insights_core::Fault;

use crate::config::LlmConfig;
use crate::http::{self, PostError};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn messages_for(prompt: Prompt) -> Vec<ChatMessage> {
    match prompt {
        Prompt::Text(text) => vec![ChatMessage::new("user", text)],
        Prompt::Messages { system, user } => vec![
            ChatMessage::new("system", system),
            ChatMessage::new("user", user),
        ],
    }
}

/// First choice's content; [`Fault::EmptyResponse`] when there is none.
fn first_choice(json: serde_json::Value) -> Result<String, Fault> {
    let completion: ChatCompletion = serde_json::from_value(json)
        .map_err(|e| Fault::Generation(format!("invalid chat completion: {}", e)))?;
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or(Fault::EmptyResponse)
}

/// OpenAI-compatible `POST {base_url}/chat/completions` client.
pub struct ChatCompletionGenerator {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_retries: u32,
    timeout_secs: u64,
}

impl ChatCompletionGenerator {
    /// Build a generator for `openai` or `ollama`.
    ///
    /// The OpenAI provider requires `OPENAI_API_KEY`; Ollama sends it only
    /// when set.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for provider '{}'", config.provider))?;

        let api_key = std::env::var("OPENAI_API_KEY").ok();
        if config.provider == "openai" && api_key.is_none() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: format!("{}/chat/completions", config.resolved_base_url()),
            api_key,
            model,
            temperature: config.temperature,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }

    fn fault(&self, err: PostError) -> Fault {
        match err {
            PostError::Timeout => Fault::Timeout(self.timeout_secs),
            other => Fault::Generation(other.to_string()),
        }
    }
}

#[async_trait]
impl Generator for ChatCompletionGenerator {
    async fn complete(&self, prompt: Prompt) -> Result<String, Fault> {
        debug!(model = %self.model, prompt_chars = prompt.char_len(), "chat completion");
        let request = ChatRequest {
            model: &self.model,
            messages: messages_for(prompt),
            temperature: self.temperature,
            stream: false,
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| Fault::Generation(format!("cannot encode request: {}", e)))?;

        let json = http::post_json(
            &self.client,
            &self.url,
            self.api_key.as_deref(),
            &body,
            self.max_retries,
        )
        .await
        .map_err(|e| self.fault(e))?;

        first_choice(json)
    }
}

/// Generator used when `llm.provider = "disabled"`. Every call fails, so
/// every request takes its fallback path.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    async fn complete(&self, _prompt: Prompt) -> Result<String, Fault> {
        Err(Fault::Generation("language model is disabled".to_string()))
    }
}

pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" | "ollama" => Ok(Arc::new(ChatCompletionGenerator::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
