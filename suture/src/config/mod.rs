// Copyright 2026 The Suture Project
// SPDX-License-Identifier: Apache-2.0

// Config loader and validator.
//
// Loads suture.yaml, validates structure eagerly so a bad config fails at
// startup rather than mid-request, and computes a deterministic contract
// hash for log correlation.

mod error;
mod loader;
pub(crate) mod raw;
mod source;
mod types;

pub use error::ConfigError;
pub use loader::{compute_hash, load_config};
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::{Config, Group, ServerConfig, StreamOverrides};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::HeaderRuleAction;
    use crate::stream::Dialect;
    use std::time::Duration;

    const EXAMPLE_YAML: &str = r#"suture: v1

server:
  port: 9800

groups:
  gem:
    channel: gemini
    upstream: https://generativelanguage.googleapis.com/
    api_keys: ["key-a", "key-b"]
    header_rules:
      - { action: set, name: X-Org, value: "acme-${group}" }
      - { action: remove, name: X-Debug }
    stream:
      max_retries: 4
      retry_delay_ms: 250
      punctuation_heuristic: false
      done_tokens: ["[fin]"]
  oai:
    channel: openai
    upstream: https://api.openai.com
    api_keys: ["key-c"]
"#;

    fn make_source(yaml: &str) -> StringSource {
        StringSource {
            content: yaml.to_string(),
        }
    }

    // ---------------------------------------------------------------
    // Happy path
    // ---------------------------------------------------------------

    #[test]
    fn valid_config_parses_all_key_fields() {
        let config = load_config(&make_source(EXAMPLE_YAML)).unwrap();

        assert_eq!(config.server.port, Some(9800));
        assert_eq!(config.groups.len(), 2);

        let gem = &config.groups["gem"];
        assert_eq!(gem.name, "gem");
        assert_eq!(gem.dialect, Dialect::Gemini);
        // Trailing slash trimmed so URL joining stays predictable.
        assert_eq!(gem.upstream, "https://generativelanguage.googleapis.com");
        assert_eq!(gem.api_keys, vec!["key-a", "key-b"]);
        assert_eq!(gem.header_rules.len(), 2);
        assert_eq!(gem.header_rules[0].action, HeaderRuleAction::Set);
        assert_eq!(gem.header_rules[1].action, HeaderRuleAction::Remove);
        assert_eq!(gem.stream.max_retries, Some(4));
        assert_eq!(gem.stream.retry_delay, Some(Duration::from_millis(250)));
        assert_eq!(gem.stream.punctuation_heuristic, Some(false));
        assert_eq!(gem.stream.done_tokens, Some(vec!["[fin]".to_string()]));

        let oai = &config.groups["oai"];
        assert_eq!(oai.dialect, Dialect::OpenAi);
        assert_eq!(oai.stream, StreamOverrides::default());
    }

    #[test]
    fn minimal_config_is_valid() {
        let yaml = r#"
suture: v1
groups:
  g:
    channel: generic
    upstream: http://127.0.0.1:8080
    api_keys: ["k"]
"#;
        let config = load_config(&make_source(yaml)).unwrap();
        assert_eq!(config.server.port, None);
        assert_eq!(config.groups["g"].dialect, Dialect::Generic);
    }

    // ---------------------------------------------------------------
    // Validation failures
    // ---------------------------------------------------------------

    #[test]
    fn unsupported_version_rejected() {
        let yaml = "suture: v2\ngroups:\n  g:\n    channel: openai\n    upstream: https://x\n    api_keys: [k]\n";
        let err = load_config(&make_source(yaml)).unwrap_err();
        assert!(err.to_string().contains("v2"), "{err}");
    }

    #[test]
    fn empty_groups_rejected() {
        let err = load_config(&make_source("suture: v1\n")).unwrap_err();
        assert!(err.to_string().contains("at least one proxy group"), "{err}");
    }

    #[test]
    fn unknown_channel_rejected_naming_the_value() {
        let yaml = r#"
suture: v1
groups:
  g:
    channel: bedrock
    upstream: https://x.example
    api_keys: ["k"]
"#;
        let err = load_config(&make_source(yaml)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("bedrock"), "{msg}");
        assert!(msg.contains("unknown channel"), "{msg}");
    }

    #[test]
    fn non_http_upstream_rejected() {
        let yaml = r#"
suture: v1
groups:
  g:
    channel: openai
    upstream: ftp://example.com
    api_keys: ["k"]
"#;
        let err = load_config(&make_source(yaml)).unwrap_err();
        assert!(err.to_string().contains("http(s)"), "{err}");
    }

    #[test]
    fn missing_api_keys_rejected() {
        let yaml = r#"
suture: v1
groups:
  g:
    channel: openai
    upstream: https://x.example
"#;
        let err = load_config(&make_source(yaml)).unwrap_err();
        assert!(err.to_string().contains("at least one key"), "{err}");
    }

    #[test]
    fn blank_api_key_rejected() {
        let yaml = r#"
suture: v1
groups:
  g:
    channel: openai
    upstream: https://x.example
    api_keys: ["k", "  "]
"#;
        let err = load_config(&make_source(yaml)).unwrap_err();
        assert!(err.to_string().contains("empty keys"), "{err}");
    }

    #[test]
    fn unknown_header_rule_action_rejected() {
        let yaml = r#"
suture: v1
groups:
  g:
    channel: openai
    upstream: https://x.example
    api_keys: ["k"]
    header_rules:
      - { action: append, name: X-Org, value: v }
"#;
        let err = load_config(&make_source(yaml)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("append"), "{msg}");
    }

    #[test]
    fn set_rule_without_value_rejected() {
        let yaml = r#"
suture: v1
groups:
  g:
    channel: openai
    upstream: https://x.example
    api_keys: ["k"]
    header_rules:
      - { action: set, name: X-Org }
"#;
        let err = load_config(&make_source(yaml)).unwrap_err();
        assert!(err.to_string().contains("requires a value"), "{err}");
    }

    #[test]
    fn undefined_variable_in_rule_value_rejected() {
        let yaml = r#"
suture: v1
groups:
  g:
    channel: openai
    upstream: https://x.example
    api_keys: ["k"]
    header_rules:
      - { action: set, name: X-Org, value: "${mystery}" }
"#;
        let err = load_config(&make_source(yaml)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("mystery"), "{msg}");
        assert!(msg.contains("undefined variable"), "{msg}");
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = load_config(&make_source("suture: [unclosed")).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    // ---------------------------------------------------------------
    // Contract hash
    // ---------------------------------------------------------------

    #[test]
    fn contract_hash_is_deterministic() {
        let a = load_config(&make_source(EXAMPLE_YAML)).unwrap();
        let b = load_config(&make_source(EXAMPLE_YAML)).unwrap();
        assert_eq!(a.contract_hash, b.contract_hash);
        assert!(a.contract_hash.starts_with("sha256:"));
        assert_eq!(a.contract_hash.len(), 7 + 64);
    }

    #[test]
    fn different_yaml_produces_different_hash() {
        let other = EXAMPLE_YAML.replace("key-a", "key-z");
        let a = load_config(&make_source(EXAMPLE_YAML)).unwrap();
        let b = load_config(&make_source(&other)).unwrap();
        assert_ne!(a.contract_hash, b.contract_hash);
    }
}
