use super::provider::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tether_common_config::ApiKeys;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiProvider {
    pub fn new(model: &str, api_key: impl Into<String>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature,
            max_tokens,
        }
    }

    /// Create a provider using `OPENAI_API_KEY` from the environment.
    pub fn from_env(model: &str, temperature: f32, max_tokens: u32) -> Result<Self, LlmError> {
        let api_key = ApiKeys::openai().map_err(|_| LlmError::MissingApiKey("OPENAI_API_KEY"))?;
        Ok(Self::new(model, api_key, temperature, max_tokens))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: Option<OpenAiMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        // Handle system prompt by converting to system message
        let mut messages: Vec<_> = Vec::new();

        if let Some(system_prompt) = request.system_prompt {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: system_prompt,
            });
        }

        for message in request.messages {
            messages.push(OpenAiMessage {
                role: match message.role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                }.to_string(),
                content: message.content,
            });
        }

        let api_request = OpenAiRequest {
            model: self.model.clone(),
            messages,
            temperature: request.temperature.unwrap_or(self.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
        };

        let response = self.client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&api_request)
            .send()
            .await
            .map_err(LlmError::NetworkError)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let openai_response: OpenAiResponse = response.json().await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let choice = openai_response.choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ParseError("No choices in response".to_string()))?;

        let content = choice.message
            .map(|m| m.content)
            .unwrap_or_default();

        let usage = openai_response.usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content,
            role: MessageRole::Assistant,
            finish_reason: choice.finish_reason,
            usage,
        })
    }
}
