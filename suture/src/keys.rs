// Copyright 2026 The Suture Project
// SPDX-License-Identifier: Apache-2.0

// API key selection.
//
// Each proxy group carries a pool of upstream keys; sessions and resume
// attempts pull the next key round-robin. The provider is a trait so tests
// and future storage backends can slot in without touching the engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// An upstream API key. `Debug` masks the value so keys cannot leak through
/// logs or error chains.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw key material, for auth injection only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tail: String = self.0.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
        write!(f, "ApiKey(…{tail})")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("no key pool for group \"{0}\"")]
    UnknownGroup(String),

    #[error("group \"{0}\" has no API keys configured")]
    Empty(String),
}

/// Hands out one usable key per call.
pub trait KeyProvider: Send + Sync {
    fn select_key(&self, group: &str) -> Result<ApiKey, KeyError>;
}

// ---------------------------------------------------------------------------
// Round-robin provider
// ---------------------------------------------------------------------------

struct KeyRing {
    keys: Vec<ApiKey>,
    cursor: AtomicUsize,
}

/// Lock-free round-robin over the configured keys of each group.
pub struct RoundRobinKeyProvider {
    rings: HashMap<String, KeyRing>,
}

impl RoundRobinKeyProvider {
    pub fn new(pools: HashMap<String, Vec<String>>) -> Self {
        let rings = pools
            .into_iter()
            .map(|(group, keys)| {
                let ring = KeyRing {
                    keys: keys.into_iter().map(ApiKey::new).collect(),
                    cursor: AtomicUsize::new(0),
                };
                (group, ring)
            })
            .collect();
        Self { rings }
    }
}

impl KeyProvider for RoundRobinKeyProvider {
    fn select_key(&self, group: &str) -> Result<ApiKey, KeyError> {
        let ring = self
            .rings
            .get(group)
            .ok_or_else(|| KeyError::UnknownGroup(group.to_string()))?;
        if ring.keys.is_empty() {
            return Err(KeyError::Empty(group.to_string()));
        }
        let index = ring.cursor.fetch_add(1, Ordering::Relaxed) % ring.keys.len();
        Ok(ring.keys[index].clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
