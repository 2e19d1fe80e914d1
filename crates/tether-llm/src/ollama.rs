use super::provider::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tether_common_config::{vars, Environment};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaProvider {
    /// Create a provider, honouring `OLLAMA_BASE_URL` when set.
    pub fn new(model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: Environment::get_or(vars::OLLAMA_BASE_URL, DEFAULT_BASE_URL),
            model: model.to_string(),
            temperature: 0.2,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[async_trait::async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        // Combine messages into prompt format for Ollama
        let system = request.system_prompt.or_else(|| {
            request.messages.iter()
                .find(|m| matches!(m.role, MessageRole::System))
                .map(|m| m.content.clone())
        });

        let prompt = request.messages.iter()
            .filter(|m| !matches!(m.role, MessageRole::System))
            .map(|m| match m.role {
                MessageRole::Assistant => format!("Assistant: {}", m.content),
                _ => m.content.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let api_request = OllamaRequest {
            model: self.model.clone(),
            prompt,
            system,
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature.unwrap_or(self.temperature),
                num_predict: request.max_tokens,
            },
        };

        let response = self.client
            .post(format!("{}/api/generate", self.base_url))
            .json(&api_request)
            .send()
            .await
            .map_err(LlmError::NetworkError)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let ollama_response: OllamaResponse = response.json().await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        Ok(LlmResponse {
            content: ollama_response.response,
            role: MessageRole::Assistant,
            finish_reason: ollama_response.done_reason,
            usage: TokenUsage {
                input_tokens: ollama_response.prompt_eval_count.unwrap_or(0),
                output_tokens: ollama_response.eval_count.unwrap_or(0),
            },
        })
    }
}
