// Copyright 2026 The Suture Project
// SPDX-License-Identifier: Apache-2.0

// Group header rules.
//
// Groups may carry an ordered list of header rewrites applied to every
// outbound request, with `${api_key}` and `${group}` placeholders resolved
// against the request context. Unknown placeholders are rejected at config
// load time, so apply time only has to deal with malformed header values.

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderRuleAction {
    Set,
    Remove,
}

/// One ordered header rewrite.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct HeaderRule {
    pub action: HeaderRuleAction,
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

/// Variables available to `${...}` placeholders in rule values.
pub struct HeaderRuleContext<'a> {
    pub group: &'a str,
    pub api_key: &'a str,
}

/// Apply the rules in order. Rules that resolve to an invalid header name or
/// value are skipped with a warning rather than failing the request.
pub fn apply_header_rules(headers: &mut HeaderMap, rules: &[HeaderRule], ctx: &HeaderRuleContext<'_>) {
    for rule in rules {
        match rule.action {
            HeaderRuleAction::Remove => {
                headers.remove(rule.name.as_str());
            }
            HeaderRuleAction::Set => {
                let resolved = interpolate(rule.value.as_deref().unwrap_or(""), ctx);
                match (
                    HeaderName::try_from(rule.name.as_str()),
                    HeaderValue::try_from(resolved.as_str()),
                ) {
                    (Ok(name), Ok(value)) => {
                        headers.insert(name, value);
                    }
                    _ => {
                        tracing::warn!(
                            header = %rule.name,
                            "skipping header rule with invalid name or value"
                        );
                    }
                }
            }
        }
    }
}

/// Resolve `${var}` placeholders against the context. Unknown variables
/// resolve to nothing; the config loader refuses them up front.
pub fn interpolate(template: &str, ctx: &HeaderRuleContext<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                match &after[..end] {
                    "api_key" => out.push_str(ctx.api_key),
                    "group" => out.push_str(ctx.group),
                    _ => {}
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated placeholder: keep the literal text.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// Placeholder names a rule value may reference, for load-time validation.
pub fn unknown_variables(template: &str) -> Vec<String> {
    let mut unknown = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                if !matches!(name, "api_key" | "group") {
                    unknown.push(name.to_string());
                }
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    unknown
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
