//! Configuration file loading and parsing.

use crate::env::{vars, Environment};
use crate::types::TetherConfig;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Config loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to read config: {source}")]
    ReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("invalid YAML at line {}: {message}", line_label(line))]
    ParseError { line: Option<usize>, message: String },

    #[error("validation error: {message}")]
    ValidationError { message: String },

    #[error("environment variable not found: {var}")]
    EnvVarNotFound { var: String },
}

fn line_label(line: &Option<usize>) -> String {
    line.map_or_else(|| "unknown".to_string(), |l| l.to_string())
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("static regex"))
}

/// Configuration loader.
pub struct ConfigLoader {
    base_path: PathBuf,
}

impl ConfigLoader {
    /// Create a loader for the given project directory.
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            base_path: project_dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the config file: `TETHER_CONFIG_PATH`, else `.tether/config.yaml`.
    pub fn config_path(&self) -> PathBuf {
        match Environment::get(vars::TETHER_CONFIG_PATH) {
            Some(path) => PathBuf::from(path),
            None => self.base_path.join(".tether/config.yaml"),
        }
    }

    /// Load configuration, falling back to defaults when no file exists.
    pub fn load(&self) -> Result<TetherConfig, ConfigError> {
        let config_path = self.config_path();

        if !config_path.exists() {
            return Ok(TetherConfig::default());
        }

        self.load_from(&config_path)
    }

    /// Load configuration from an explicit file, which must exist.
    pub fn load_from(&self, path: &Path) -> Result<TetherConfig, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let contents = std::fs::read_to_string(path)?;
        self.parse(&contents)
    }

    /// Parse configuration text (env expansion + validation).
    pub fn parse(&self, contents: &str) -> Result<TetherConfig, ConfigError> {
        let expanded = self.expand_env_vars(contents)?;

        let config: TetherConfig = serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::ParseError {
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?;

        validate(&config)?;
        Ok(config)
    }

    /// Expand environment variables in the form `${VAR}` or `${VAR:-default}`.
    fn expand_env_vars(&self, content: &str) -> Result<String, ConfigError> {
        let mut result = content.to_string();

        for cap in env_var_pattern().captures_iter(content) {
            let full_match = &cap[0];
            let var_name = &cap[1];
            let default = cap.get(2).map(|m| m.as_str());

            let value = match std::env::var(var_name) {
                Ok(v) => v,
                Err(_) => match default {
                    Some(d) => d.to_string(),
                    None => {
                        return Err(ConfigError::EnvVarNotFound {
                            var: var_name.to_string(),
                        })
                    }
                },
            };

            result = result.replace(full_match, &value);
        }

        Ok(result)
    }

    /// Save configuration to `.tether/config.yaml`.
    pub fn save(&self, config: &TetherConfig) -> Result<(), ConfigError> {
        let config_dir = self.base_path.join(".tether");
        std::fs::create_dir_all(&config_dir)?;

        let yaml = serde_yaml::to_string(config).map_err(|e| ConfigError::ParseError {
            line: None,
            message: e.to_string(),
        })?;

        std::fs::write(config_dir.join("config.yaml"), yaml)?;
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_default())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        message: message.into(),
    }
}

/// Validate configuration values.
pub fn validate(config: &TetherConfig) -> Result<(), ConfigError> {
    if config.extraction.chunk_max_chars < 256 {
        return Err(invalid("extraction.chunk_max_chars must be at least 256"));
    }

    if config.evidence.max_candidates == 0 {
        return Err(invalid("evidence.max_candidates must be greater than 0"));
    }

    if config.evidence.locator_batch_size == 0 {
        return Err(invalid("evidence.locator_batch_size must be greater than 0"));
    }

    if config.evidence.per_file_chars == 0
        || config.evidence.per_file_chars > config.evidence.total_chars
    {
        return Err(invalid(
            "evidence.per_file_chars must be between 1 and evidence.total_chars",
        ));
    }

    if config.assignment.batch_size == 0 {
        return Err(invalid("assignment.batch_size must be greater than 0"));
    }

    if config.concurrency.max_in_flight == 0 {
        return Err(invalid("concurrency.max_in_flight must be greater than 0"));
    }

    if config.retry.max_attempts == 0 {
        return Err(invalid("retry.max_attempts must be greater than 0"));
    }

    if config.retry.timeout_secs == 0 {
        return Err(invalid("retry.timeout_secs must be greater than 0"));
    }

    if !(0.0..=2.0).contains(&config.backend.temperature) {
        return Err(invalid("backend.temperature must be between 0.0 and 2.0"));
    }

    for pattern in &config.evidence.exclude {
        if glob::Pattern::new(pattern).is_err() {
            return Err(invalid(format!("evidence.exclude has an invalid glob: {}", pattern)));
        }
    }

    Ok(())
}
