//! Configuration types for Tether.
//!
//! This crate provides the configuration types used by Tether
//! for `.tether/config.yaml` files.

pub mod types;
pub mod loader;
pub mod env;

pub use types::*;
pub use loader::*;
pub use env::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_sensible_values() {
        let config = TetherConfig::default();

        assert_eq!(config.backend.provider, ProviderKind::Anthropic);
        assert!(config.backend.base_url.is_none());

        assert_eq!(config.extraction.chunk_max_chars, 12_000);
        assert!(config.extraction.split_compound);

        assert_eq!(config.evidence.max_candidates, 5);
        assert_eq!(config.evidence.per_file_chars, 10_000);
        assert_eq!(config.evidence.total_chars, 100_000);
        assert_eq!(config.evidence.locator, LocatorKind::Oracle);
        assert!(config.evidence.exclude.contains(&"target/**".to_string()));

        assert_eq!(config.assignment.batch_size, 15);
        assert!(config.assignment.routes.is_empty());

        assert_eq!(config.concurrency.max_in_flight, 4);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.regeneration.reality_context_chars, 8_000);
        assert_eq!(config.regeneration.fail_policy, FailPolicy::MarkAspirational);
    }

    #[test]
    fn test_config_serializes_to_yaml() {
        let yaml = serde_yaml::to_string(&TetherConfig::default()).unwrap();

        assert!(yaml.contains("backend:"));
        assert!(yaml.contains("evidence:"));
        assert!(yaml.contains("assignment:"));
        assert!(yaml.contains("provider: anthropic"));
        assert!(yaml.contains("batch_size: 15"));
        assert!(yaml.contains("fail_policy: mark_aspirational"));
    }

    #[test]
    fn test_partial_configs_merge_with_defaults() {
        let partial_yaml = r#"
backend:
  provider: ollama
  model: llama3:8b
assignment:
  batch_size: 10
"#;

        let config: TetherConfig = serde_yaml::from_str(partial_yaml).unwrap();

        assert_eq!(config.backend.provider, ProviderKind::Ollama);
        assert_eq!(config.backend.model, "llama3:8b");
        assert_eq!(config.assignment.batch_size, 10);

        assert_eq!(config.backend.max_tokens, 4096);
        assert_eq!(config.evidence.total_chars, 100_000);
        assert_eq!(config.retry.initial_backoff_ms, 500);
    }

    #[test]
    fn test_checker_routes_parse() {
        let yaml = r#"
assignment:
  routes:
    - category: security
      checker:
        kind: command
        program: cargo
        args: ["test", "--test", "auth"]
        timeout_secs: 300
    - category: data-privacy
      checker:
        kind: pattern
        pattern: "redact\\("
"#;
        let config: TetherConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.assignment.routes.len(), 2);

        match &config.assignment.routes[0].checker {
            CheckerSpec::Command { program, args, timeout_secs } => {
                assert_eq!(program, "cargo");
                assert_eq!(args.len(), 3);
                assert_eq!(*timeout_secs, 300);
            }
            other => panic!("expected command checker, got {:?}", other),
        }
        assert_eq!(
            config.assignment.routes[1].checker,
            CheckerSpec::Pattern { pattern: "redact\\(".to_string() }
        );
    }
}
