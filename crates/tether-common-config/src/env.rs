//! Environment variable handling.

use std::env;
use thiserror::Error;

/// Environment variable errors.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("required environment variable not set: {var}")]
    NotSet { var: String },

    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Environment variable names.
pub mod vars {
    // API Keys
    pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";

    // Endpoints
    pub const OLLAMA_BASE_URL: &str = "OLLAMA_BASE_URL";

    // Configuration
    pub const TETHER_CONFIG_PATH: &str = "TETHER_CONFIG_PATH";
    pub const TETHER_LOG_LEVEL: &str = "TETHER_LOG_LEVEL";
    pub const TETHER_ENV: &str = "TETHER_ENV";

    // Development
    pub const RUST_LOG: &str = "RUST_LOG";
}

/// Environment configuration.
pub struct Environment {
    _guard: (),
}

impl Environment {
    /// Initialize environment from .env files.
    pub fn init() -> Self {
        // Later files override earlier ones.
        let _ = dotenvy::from_filename(".env");
        let _ = dotenvy::from_filename(".env.local");

        if let Ok(env) = env::var(vars::TETHER_ENV) {
            let _ = dotenvy::from_filename(format!(".env.{}", env));
        }

        Self { _guard: () }
    }

    /// Get a required string variable.
    pub fn require(var: &str) -> Result<String, EnvError> {
        env::var(var).map_err(|_| EnvError::NotSet { var: var.to_string() })
    }

    /// Get an optional string variable.
    pub fn get(var: &str) -> Option<String> {
        env::var(var).ok().filter(|v| !v.is_empty())
    }

    /// Get a variable with a default value.
    pub fn get_or(var: &str, default: &str) -> String {
        Self::get(var).unwrap_or_else(|| default.to_string())
    }

    /// Get a boolean variable.
    pub fn get_bool(var: &str) -> Option<bool> {
        env::var(var)
            .ok()
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
    }

    /// Get an integer variable.
    pub fn get_int<T: std::str::FromStr>(var: &str) -> Result<Option<T>, EnvError> {
        match env::var(var) {
            Ok(v) => v.parse().map(Some).map_err(|_| EnvError::InvalidValue {
                var: var.to_string(),
                message: "expected integer".to_string(),
            }),
            Err(_) => Ok(None),
        }
    }
}

/// API key lookup for the generative service providers.
pub struct ApiKeys;

impl ApiKeys {
    /// Get Anthropic API key.
    pub fn anthropic() -> Result<String, EnvError> {
        Environment::require(vars::ANTHROPIC_API_KEY)
    }

    /// Get OpenAI API key.
    pub fn openai() -> Result<String, EnvError> {
        Environment::require(vars::OPENAI_API_KEY)
    }
}
