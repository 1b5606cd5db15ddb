use anyhow::{Result, anyhow};
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
    },
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// Represents the events that can be yielded from a streaming text response.
#[derive(Debug, Clone)]
pub enum LlmStreamEvent {
    TextChunk(String),
}

/// A stream of text chunks from the LLM.
pub type LlmStream = Pin<Box<dyn Stream<Item = Result<LlmStreamEvent, OpenAIError>> + Send>>;

/// A generic client for a text-generation capability.
///
/// The three modes map to the three ways the rehearsal components consume
/// generation: free text parsed by the caller (persona responses), a
/// machine-parseable JSON document (lesson analysis, session summary), and
/// an incremental token stream (coaching feedback).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// A single, non-streaming generation call returning plain text.
    async fn generate(&self, system_prompt: String, user_content: String) -> Result<String>;

    /// A single call constrained to emit one JSON document.
    async fn generate_json(&self, system_prompt: String, user_content: String) -> Result<String>;

    /// A streaming call yielding incremental text chunks.
    async fn generate_stream(
        &self,
        system_prompt: String,
        user_content: String,
    ) -> Result<LlmStream>;
}

/// An implementation of `LlmClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The specific model identifier to use for chat completions.
    /// * `temperature` - Sampling temperature for every call made by this client.
    pub fn new(config: OpenAIConfig, model: String, temperature: f32) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            temperature,
        }
    }

    fn build_messages(
        system_prompt: String,
        user_content: String,
    ) -> Result<Vec<ChatCompletionRequestMessage>> {
        Ok(vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_content)
                .build()?
                .into(),
        ])
    }

    fn first_choice_content(
        response: async_openai::types::CreateChatCompletionResponse,
    ) -> Result<String> {
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("LLM response contained no text content"))
    }
}

#[async_trait]
impl LlmClient for OpenAICompatibleClient {
    async fn generate(&self, system_prompt: String, user_content: String) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages(Self::build_messages(system_prompt, user_content)?)
            .build()?;

        let response = self.client.chat().create(request).await?;
        Self::first_choice_content(response)
    }

    async fn generate_json(&self, system_prompt: String, user_content: String) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .response_format(ResponseFormat::JsonObject)
            .messages(Self::build_messages(system_prompt, user_content)?)
            .build()?;

        let response = self.client.chat().create(request).await?;
        Self::first_choice_content(response)
    }

    async fn generate_stream(
        &self,
        system_prompt: String,
        user_content: String,
    ) -> Result<LlmStream> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages(Self::build_messages(system_prompt, user_content)?)
            .stream(true)
            .build()?;

        let stream = self.client.chat().create_stream(request).await?;

        Ok(Box::pin(stream.filter_map(|result| async {
            match result {
                Ok(response) => {
                    let choice = response.choices.first()?;
                    if let Some(content) = &choice.delta.content {
                        if !content.is_empty() {
                            return Some(Ok(LlmStreamEvent::TextChunk(content.clone())));
                        }
                    }
                    None
                }
                Err(e) => Some(Err(e)),
            }
        })))
    }
}

/// Trims a Markdown code fence from model output, if present.
///
/// Models occasionally wrap JSON in ```json fences even when asked not to;
/// callers that parse plain-text output run through this first.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}
