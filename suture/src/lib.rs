// Copyright 2026 The Suture Project
// SPDX-License-Identifier: Apache-2.0

pub mod channel;
pub mod config;
pub mod engine;
pub mod headers;
pub mod keys;
pub mod proxy;
pub mod stream;
pub mod upstream;
