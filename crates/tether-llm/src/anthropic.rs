use super::provider::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tether_common_config::ApiKeys;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(model: &str, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.2,
            max_tokens: 4096,
        }
    }

    /// Create a provider using `ANTHROPIC_API_KEY` from the environment.
    pub fn from_env(model: &str) -> Result<Self, LlmError> {
        let api_key =
            ApiKeys::anthropic().map_err(|_| LlmError::MissingApiKey("ANTHROPIC_API_KEY"))?;
        Ok(Self::new(model, api_key))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_defaults(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    usage: Option<AnthropicUsage>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        // Build messages, extracting system prompt
        let mut system_prompt = request.system_prompt;
        let messages: Vec<_> = request.messages
            .into_iter()
            .filter_map(|m| match m.role {
                MessageRole::System => {
                    system_prompt = Some(m.content);
                    None
                }
                MessageRole::User => Some(AnthropicMessage {
                    role: "user".to_string(),
                    content: m.content,
                }),
                MessageRole::Assistant => Some(AnthropicMessage {
                    role: "assistant".to_string(),
                    content: m.content,
                }),
            })
            .collect();

        let api_request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            temperature: request.temperature.unwrap_or(self.temperature),
            messages,
            system: system_prompt,
        };

        let response = self.client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(LlmError::NetworkError)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let anthropic_response: AnthropicResponse = response.json().await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let content = anthropic_response.content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");

        let usage = anthropic_response.usage
            .map(|u| TokenUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content,
            role: MessageRole::Assistant,
            finish_reason: anthropic_response.stop_reason,
            usage,
        })
    }
}
