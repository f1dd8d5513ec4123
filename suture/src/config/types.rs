// Copyright 2026 The Suture Project
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::time::Duration;

use crate::headers::HeaderRule;
use crate::stream::{Dialect, StreamConfig};

/// Fully validated configuration. Read-only after startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub groups: HashMap<String, Group>,
    /// SHA-256 of the raw YAML, logged so deployed config can be identified.
    pub contract_hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub port: Option<u16>,
}

/// One proxy group: a named route bound to an upstream, a key pool, and
/// per-group streaming overrides.
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub dialect: Dialect,
    /// Upstream base URL, without a trailing slash.
    pub upstream: String,
    pub api_keys: Vec<String>,
    pub header_rules: Vec<HeaderRule>,
    pub stream: StreamOverrides,
}

impl Group {
    /// The session tuning for this group: channel defaults with the group's
    /// overrides folded in.
    pub fn stream_config(&self) -> StreamConfig {
        let mut config = StreamConfig::for_dialect(self.dialect);
        self.stream.apply_to(&mut config);
        config
    }
}

/// Optional per-group overrides of the per-channel streaming defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamOverrides {
    pub max_retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub punctuation_heuristic: Option<bool>,
    pub done_tokens: Option<Vec<String>>,
}

impl StreamOverrides {
    pub fn apply_to(&self, config: &mut StreamConfig) {
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(retry_delay) = self.retry_delay {
            config.retry_delay = retry_delay;
        }
        if let Some(punctuation_heuristic) = self.punctuation_heuristic {
            config.punctuation_heuristic = punctuation_heuristic;
        }
        if let Some(done_tokens) = &self.done_tokens {
            config.done_tokens = done_tokens.clone();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
