//! Generative/verification service clients for Tether.

mod provider;
mod anthropic;
mod openai;
mod ollama;
pub mod json;

pub use provider::*;
pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
pub use ollama::OllamaProvider;
pub use json::{extract_json, parse_json};

use std::sync::Arc;
use tether_common_config::{BackendConfig, ProviderKind};

pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create(config: &BackendConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
        tracing::debug!(provider = ?config.provider, model = %config.model, "creating provider");

        match config.provider {
            ProviderKind::Anthropic => {
                let mut provider = AnthropicProvider::from_env(&config.model)?
                    .with_defaults(config.temperature, config.max_tokens);
                if let Some(url) = &config.base_url {
                    provider = provider.with_base_url(url);
                }
                Ok(Arc::new(provider))
            }
            ProviderKind::OpenAi => {
                let mut provider =
                    OpenAiProvider::from_env(&config.model, config.temperature, config.max_tokens)?;
                if let Some(url) = &config.base_url {
                    provider = provider.with_base_url(url);
                }
                Ok(Arc::new(provider))
            }
            ProviderKind::Ollama => {
                let mut provider =
                    OllamaProvider::new(&config.model).with_temperature(config.temperature);
                if let Some(url) = &config.base_url {
                    provider = provider.with_base_url(url);
                }
                Ok(Arc::new(provider))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_builds_ollama_without_key() {
        let config = BackendConfig {
            provider: ProviderKind::Ollama,
            model: "llama3:8b".to_string(),
            base_url: Some("http://127.0.0.1:1".to_string()),
            ..Default::default()
        };

        let provider = ProviderFactory::create(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.model(), "llama3:8b");
    }
}
