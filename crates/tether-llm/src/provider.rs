use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub content: String,
}

impl LlmMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub messages: Vec<LlmMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
}

impl LlmRequest {
    /// A single-turn request carrying `prompt` as the user message.
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![LlmMessage::user(prompt)],
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Concatenated user-visible text of the request, system prompt first.
    pub fn full_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(system) = &self.system_prompt {
            parts.push(system);
        }
        parts.extend(self.messages.iter().map(|m| m.content.as_str()));
        parts.join("\n\n")
    }
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub role: MessageRole,
    pub finish_reason: Option<String>,
    pub usage: TokenUsage,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role: MessageRole::Assistant,
            finish_reason: Some("end_turn".to_string()),
            usage: TokenUsage::default(),
        }
    }

    /// Whether the provider stopped because it ran out of output tokens.
    pub fn is_truncated(&self) -> bool {
        matches!(self.finish_reason.as_deref(), Some("max_tokens" | "length"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: {0}")]
    MissingApiKey(&'static str),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Rate limited")]
    RateLimited,
}

impl LlmError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::NetworkError(_) | LlmError::RateLimited => true,
            LlmError::ApiError { status, .. } => *status >= 500,
            LlmError::MissingApiKey(_) | LlmError::ParseError(_) => false,
        }
    }
}

/// Map a non-success HTTP response to an error.
pub(crate) async fn error_from_response(response: reqwest::Response) -> LlmError {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return LlmError::RateLimited;
    }
    let body = response.text().await.unwrap_or_default();
    LlmError::ApiError { status: status.as_u16(), body }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_builder() {
        let request = LlmRequest::prompt("Extract claims")
            .with_system("You are precise")
            .with_max_tokens(1024)
            .with_temperature(0.0);

        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, MessageRole::User);
        assert_eq!(request.max_tokens, Some(1024));
        assert_eq!(request.full_text(), "You are precise\n\nExtract claims");
    }

    #[test]
    fn test_truncation_detection() {
        let mut response = LlmResponse::text("[{\"text\": ");
        assert!(!response.is_truncated());
        response.finish_reason = Some("max_tokens".into());
        assert!(response.is_truncated());
        response.finish_reason = Some("length".into());
        assert!(response.is_truncated());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(LlmError::RateLimited.is_retryable());
        assert!(LlmError::ApiError { status: 503, body: String::new() }.is_retryable());
        assert!(!LlmError::ApiError { status: 400, body: String::new() }.is_retryable());
        assert!(!LlmError::ParseError("bad".into()).is_retryable());
        assert!(!LlmError::MissingApiKey("ANTHROPIC_API_KEY").is_retryable());
    }
}
