// Copyright 2026 The Suture Project
// SPDX-License-Identifier: Apache-2.0

// Raw deserialization types for suture.yaml.
//
// These mirror the YAML shape one-to-one; the loader validates them and
// builds the typed `Config`. Keeping the two apart lets validation produce
// errors that name the offending value instead of serde's path soup.

use std::collections::HashMap;

#[derive(Debug, serde::Deserialize)]
pub struct RawConfig {
    /// Contract version marker, e.g. `suture: v1`.
    pub suture: String,

    #[serde(default)]
    pub server: RawServer,

    #[serde(default)]
    pub groups: HashMap<String, RawGroup>,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct RawServer {
    pub port: Option<u16>,
}

#[derive(Debug, serde::Deserialize)]
pub struct RawGroup {
    pub channel: String,
    pub upstream: String,

    #[serde(default)]
    pub api_keys: Vec<String>,

    #[serde(default)]
    pub header_rules: Vec<RawHeaderRule>,

    #[serde(default)]
    pub stream: RawStreamOverrides,
}

#[derive(Debug, serde::Deserialize)]
pub struct RawHeaderRule {
    pub action: String,
    pub name: String,

    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct RawStreamOverrides {
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub punctuation_heuristic: Option<bool>,
    pub done_tokens: Option<Vec<String>>,
}
