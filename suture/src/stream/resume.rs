// Copyright 2026 The Suture Project
// SPDX-License-Identifier: Apache-2.0

// Resumption request bodies.
//
// When an upstream attempt dies early, the next attempt must carry everything
// the client has already seen, phrased the way each provider expects
// conversation context. Builders copy the original body and splice the
// continuation in; the original is never mutated.

use serde_json::{json, Map, Value};

use super::dialect::Dialect;

/// A decoded JSON request body.
pub type JsonMap = Map<String, Value>;

const GEMINI_RESUME_PROMPT: &str = "Continue exactly where you left off without any \
preamble or repetition. Remember to include [done] at the end.";

/// Build the request body for a resume attempt.
///
/// Every field of the original body is preserved; only the conversation array
/// (`messages` or `contents`) gains continuation context. Bodies without a
/// conversation array are returned as plain copies.
pub fn build_resume_body(dialect: Dialect, original: &JsonMap, accumulated_text: &str) -> JsonMap {
    let mut body = original.clone();
    match dialect {
        Dialect::OpenAi => prepend_system_context(&mut body, accumulated_text),
        Dialect::Gemini => insert_gemini_context(&mut body, accumulated_text),
        Dialect::Anthropic | Dialect::Generic => append_user_context(&mut body, accumulated_text),
    }
    body
}

/// OpenAI-style: a system message at index 0 framing the partial response.
fn prepend_system_context(body: &mut JsonMap, accumulated: &str) {
    let Some(Value::Array(messages)) = body.get_mut("messages") else {
        return;
    };
    let system = json!({
        "role": "system",
        "content": format!(
            "Continue from where you left off. Previous response: {accumulated}\n\n\
             Continue generating the response without repetition."
        ),
    });
    messages.insert(0, system);
}

/// Gemini: a model turn carrying the partial response plus a user turn asking
/// to continue, spliced in directly after the last user turn so any trailing
/// generation config entries keep their position.
fn insert_gemini_context(body: &mut JsonMap, accumulated: &str) {
    let Some(Value::Array(contents)) = body.get_mut("contents") else {
        return;
    };

    let model_turn = json!({ "role": "model", "parts": [{ "text": accumulated }] });
    let user_turn = json!({ "role": "user", "parts": [{ "text": GEMINI_RESUME_PROMPT }] });

    let last_user = contents
        .iter()
        .rposition(|entry| entry.get("role").and_then(Value::as_str) == Some("user"));

    match last_user {
        Some(idx) => {
            contents.insert(idx + 1, model_turn);
            contents.insert(idx + 2, user_turn);
        }
        None => {
            contents.push(model_turn);
            contents.push(user_turn);
        }
    }
}

/// Anthropic and generic: a trailing user message carrying the context.
fn append_user_context(body: &mut JsonMap, accumulated: &str) {
    let Some(Value::Array(messages)) = body.get_mut("messages") else {
        return;
    };
    messages.push(json!({
        "role": "user",
        "content": format!(
            "Continue from where you left off. Previous response: {accumulated}\n\n\
             Continue without repetition."
        ),
    }));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn as_map(value: Value) -> JsonMap {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn openai_resume_prepends_a_system_message() {
        let original = as_map(json!({
            "model": "gpt-4o",
            "stream": true,
            "messages": [{"role":"user","content":"tell me a story"}]
        }));

        let resumed = build_resume_body(Dialect::OpenAi, &original, "Once upon a time");
        let messages = resumed["messages"].as_array().unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], json!("system"));
        let content = messages[0]["content"].as_str().unwrap();
        assert!(content.contains("Once upon a time"));
        assert!(content.contains("without repetition"));
        assert_eq!(messages[1]["role"], json!("user"));
    }

    #[test]
    fn untouched_fields_survive_value_equal() {
        let original = as_map(json!({
            "model": "gemini-pro",
            "generationConfig": {"temperature": 0.5, "topK": 3},
            "safetySettings": [{"category":"HARM","threshold":"BLOCK_NONE"}],
            "contents": [{"role":"user","parts":[{"text":"go"}]}]
        }));

        let resumed = build_resume_body(Dialect::Gemini, &original, "partial");

        assert_eq!(resumed["model"], original["model"]);
        assert_eq!(resumed["generationConfig"], original["generationConfig"]);
        assert_eq!(resumed["safetySettings"], original["safetySettings"]);
        // The original is untouched.
        assert_eq!(original["contents"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn gemini_resume_splices_after_the_last_user_turn() {
        let original = as_map(json!({
            "contents": [
                {"role":"user","parts":[{"text":"first"}]},
                {"role":"model","parts":[{"text":"reply"}]},
                {"role":"user","parts":[{"text":"second"}]},
                {"role":"model","parts":[{"text":"trailing"}]}
            ]
        }));

        let resumed = build_resume_body(Dialect::Gemini, &original, "partial text");
        let contents = resumed["contents"].as_array().unwrap();

        assert_eq!(contents.len(), 6);
        assert_eq!(contents[2]["parts"][0]["text"], json!("second"));
        assert_eq!(contents[3]["role"], json!("model"));
        assert_eq!(contents[3]["parts"][0]["text"], json!("partial text"));
        assert_eq!(contents[4]["role"], json!("user"));
        let prompt = contents[4]["parts"][0]["text"].as_str().unwrap();
        assert!(prompt.contains("[done]"));
        // The entry that trailed the last user turn keeps its relative spot.
        assert_eq!(contents[5]["parts"][0]["text"], json!("trailing"));
    }

    #[test]
    fn gemini_resume_appends_when_no_user_turn_exists() {
        let original = as_map(json!({
            "contents": [{"role":"model","parts":[{"text":"x"}]}]
        }));

        let resumed = build_resume_body(Dialect::Gemini, &original, "y");
        let contents = resumed["contents"].as_array().unwrap();

        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["parts"][0]["text"], json!("x"));
        assert_eq!(contents[1]["role"], json!("model"));
        assert_eq!(contents[1]["parts"][0]["text"], json!("y"));
        assert_eq!(contents[2]["role"], json!("user"));
    }

    #[test]
    fn anthropic_resume_appends_a_user_message() {
        let original = as_map(json!({
            "model": "claude-3",
            "messages": [{"role":"user","content":"hi"}]
        }));

        let resumed = build_resume_body(Dialect::Anthropic, &original, "partial");
        let messages = resumed["messages"].as_array().unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["role"], json!("user"));
        let content = messages[1]["content"].as_str().unwrap();
        assert!(content.contains("partial"));
        assert!(content.ends_with("Continue without repetition."));
    }

    #[test]
    fn generic_resume_without_messages_is_a_plain_copy() {
        let original = as_map(json!({"prompt": "raw", "stream": true}));
        let resumed = build_resume_body(Dialect::Generic, &original, "partial");
        assert_eq!(Value::Object(resumed), Value::Object(original));
    }

    #[test]
    fn openai_resume_without_messages_is_a_plain_copy() {
        let original = as_map(json!({"model": "gpt-4o"}));
        let resumed = build_resume_body(Dialect::OpenAi, &original, "partial");
        assert_eq!(Value::Object(resumed), Value::Object(original));
    }
}
