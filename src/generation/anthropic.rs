//! Question generation backed by the Anthropic Messages API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::item::{Item, Key};
use crate::config::GenerationConfig;
use crate::generation::client::{GenerationClient, GenerationError};
use crate::generation::prompt::{explanation_prompt, question_prompt, SYSTEM_PROMPT};
use crate::generation::response::parse_question;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// HTTP client for the Messages API.
pub struct AnthropicClient {
    http: reqwest::Client,
    config: GenerationConfig,
    api_key: String,
}

impl AnthropicClient {
    /// Build a client, reading the API key from the configured variable.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                GenerationError::Unavailable(format!("{} is not set", config.api_key_env))
            })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            config: config.clone(),
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Ask for a plain-text explanation of `item` given the user's answer.
    pub async fn explain(&self, item: &Item, user_answer: &str) -> Result<String, GenerationError> {
        let prompt = explanation_prompt(item, user_answer);
        let text = self
            .complete(
                &prompt,
                self.config.explanation_max_tokens,
                self.config.explanation_temperature,
            )
            .await?;
        Ok(text.trim().to_string())
    }

    /// Send one prompt and return the first text block of the reply.
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<String, GenerationError> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();

        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens,
            temperature,
            system: SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(&self.config.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.config.api_version)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%request_id, status = status.as_u16(), "Messages API returned an error");
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let reply: MessagesResponse = response.json().await?;
        debug!(
            %request_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            blocks = reply.content.len(),
            "Messages API reply"
        );

        reply
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| GenerationError::MalformedResponse("reply has no text block".into()))
    }
}

#[async_trait]
impl GenerationClient for AnthropicClient {
    async fn generate(&self, key: &Key) -> Result<Item, GenerationError> {
        let prompt = question_prompt(key);
        let text = self
            .complete(&prompt, self.config.max_tokens, self.config.temperature)
            .await?;
        parse_question(&text, key)
    }
}
