// Copyright 2026 The Suture Project
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::time::Duration;

use sha2::{Digest, Sha256};

use super::error::ConfigError;
use super::raw;
use super::source::ConfigSource;
use super::types::{Config, Group, ServerConfig, StreamOverrides};
use crate::headers::{unknown_variables, HeaderRule, HeaderRuleAction};
use crate::stream::Dialect;

/// Load and validate a suture config from the given source.
///
/// Steps:
/// 1. Read raw YAML from the source
/// 2. Compute the SHA-256 contract hash
/// 3. Parse into raw deserialization types
/// 4. Validate versions, channels, upstreams, keys, and header rules
/// 5. Build the typed `Config`
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let contract_hash = compute_hash(&raw_yaml);

    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.suture != "v1" {
        return Err(ConfigError::Validation(format!(
            "unsupported contract version \"{}\", expected \"v1\"",
            raw.suture
        )));
    }

    if raw.groups.is_empty() {
        return Err(ConfigError::Validation(
            "\"groups\" must define at least one proxy group".to_string(),
        ));
    }

    let mut groups = HashMap::with_capacity(raw.groups.len());
    for (name, raw_group) in raw.groups {
        let group = build_group(&name, raw_group)?;
        groups.insert(name, group);
    }

    Ok(Config {
        server: ServerConfig {
            port: raw.server.port,
        },
        groups,
        contract_hash,
    })
}

/// SHA-256 of the raw config text, prefixed for log readability.
pub fn compute_hash(raw_yaml: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_yaml.as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

fn build_group(name: &str, raw: raw::RawGroup) -> Result<Group, ConfigError> {
    let dialect = parse_dialect(name, &raw.channel)?;

    let upstream = raw.upstream.trim_end_matches('/').to_string();
    if upstream.is_empty() {
        return Err(ConfigError::Validation(format!(
            "group \"{name}\": \"upstream\" must not be empty"
        )));
    }
    if !upstream.starts_with("http://") && !upstream.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "group \"{name}\": \"upstream\" must be an http(s) URL, got \"{upstream}\""
        )));
    }

    if raw.api_keys.is_empty() {
        return Err(ConfigError::Validation(format!(
            "group \"{name}\": \"api_keys\" must list at least one key"
        )));
    }
    if raw.api_keys.iter().any(|k| k.trim().is_empty()) {
        return Err(ConfigError::Validation(format!(
            "group \"{name}\": \"api_keys\" must not contain empty keys"
        )));
    }

    let mut header_rules = Vec::with_capacity(raw.header_rules.len());
    for raw_rule in raw.header_rules {
        header_rules.push(build_header_rule(name, raw_rule)?);
    }

    Ok(Group {
        name: name.to_string(),
        dialect,
        upstream,
        api_keys: raw.api_keys,
        header_rules,
        stream: StreamOverrides {
            max_retries: raw.stream.max_retries,
            retry_delay: raw.stream.retry_delay_ms.map(Duration::from_millis),
            punctuation_heuristic: raw.stream.punctuation_heuristic,
            done_tokens: raw.stream.done_tokens,
        },
    })
}

fn parse_dialect(group: &str, channel: &str) -> Result<Dialect, ConfigError> {
    match channel {
        "openai" => Ok(Dialect::OpenAi),
        "gemini" => Ok(Dialect::Gemini),
        "anthropic" => Ok(Dialect::Anthropic),
        "generic" => Ok(Dialect::Generic),
        other => Err(ConfigError::Validation(format!(
            "group \"{group}\": unknown channel \"{other}\" \
             (expected openai, gemini, anthropic, or generic)"
        ))),
    }
}

fn build_header_rule(group: &str, raw: raw::RawHeaderRule) -> Result<HeaderRule, ConfigError> {
    let action = match raw.action.as_str() {
        "set" => HeaderRuleAction::Set,
        "remove" => HeaderRuleAction::Remove,
        other => {
            return Err(ConfigError::Validation(format!(
                "group \"{group}\": unknown header rule action \"{other}\" \
                 (expected set or remove)"
            )))
        }
    };

    if raw.name.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "group \"{group}\": header rule \"name\" must not be empty"
        )));
    }

    if action == HeaderRuleAction::Set {
        let value = raw.value.as_deref().ok_or_else(|| {
            ConfigError::Validation(format!(
                "group \"{group}\": header rule \"{}\" with action set requires a value",
                raw.name
            ))
        })?;
        let unknown = unknown_variables(value);
        if let Some(variable) = unknown.first() {
            return Err(ConfigError::Validation(format!(
                "group \"{group}\": header rule \"{}\" references undefined variable \
                 ${{{variable}}} (known: api_key, group)",
                raw.name
            )));
        }
    }

    Ok(HeaderRule {
        action,
        name: raw.name,
        value: raw.value,
    })
}
