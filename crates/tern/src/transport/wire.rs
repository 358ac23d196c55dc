//! Conversion between internal messages and the endpoint's wire format.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::TransportError;
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

/// Correlation ids are generated on our side; the wire carries none.
/// Millisecond timestamp plus a random suffix keeps them unique enough
/// to never collide within a session.
pub fn generate_call_id() -> String {
    let suffix: String = Uuid::new_v4().simple().to_string()[..8].to_string();
    format!("call_{}_{}", Utc::now().timestamp_millis(), suffix)
}

/// Convert a transcript into the endpoint's `contents` array.
///
/// The endpoint has no system role, so the system message's content is
/// prepended to the first user message before anything else is serialized.
/// `assistant` maps to the model-originated role, everything else to the
/// caller-originated one.
pub fn messages_to_contents(messages: &[Message]) -> Vec<Value> {
    // Recover call names for functionResponse parts, which are keyed by
    // name on the wire but by id internally.
    let mut call_names: HashMap<&str, &str> = HashMap::new();
    for message in messages {
        for call in &message.tool_calls {
            call_names.insert(&call.id, &call.name);
        }
    }

    let system_text = messages
        .first()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str());
    let body = if system_text.is_some() {
        &messages[1..]
    } else {
        messages
    };

    let mut contents = Vec::new();
    let mut pending_system = system_text;

    for message in body {
        let role = match message.role {
            Role::Assistant => "model",
            Role::User | Role::System => "user",
        };

        let mut parts = Vec::new();

        let mut text = message.content.clone();
        if message.role == Role::User {
            if let Some(system) = pending_system.take() {
                text = if text.is_empty() {
                    system.to_string()
                } else {
                    format!("{}\n\n{}", system, text)
                };
            }
        }
        if !text.is_empty() {
            parts.push(json!({ "text": text }));
        }

        for call in &message.tool_calls {
            parts.push(json!({
                "functionCall": { "name": call.name, "args": call.arguments }
            }));
        }

        for result in &message.tool_results {
            let name = call_names
                .get(result.tool_call_id.as_str())
                .copied()
                .unwrap_or(result.tool_call_id.as_str());
            let response = if result.is_error {
                json!({ "error": result.content })
            } else {
                json!({ "result": result.content })
            };
            parts.push(json!({
                "functionResponse": { "name": name, "response": response }
            }));
        }

        if parts.is_empty() {
            continue;
        }
        contents.push(json!({ "role": role, "parts": parts }));
    }

    // A transcript with no user turn yet still has to carry the instructions.
    if let Some(system) = pending_system {
        contents.insert(0, json!({ "role": "user", "parts": [{ "text": system }] }));
    }

    contents
}

/// Tool declarations, advertised verbatim.
pub fn tools_to_declarations(tools: &[Tool]) -> Value {
    let declarations: Vec<Value> = tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            })
        })
        .collect();
    json!([{ "functionDeclarations": declarations }])
}

/// Parse the single candidate of a non-streaming response: text parts
/// concatenated in order, each functionCall part becoming one ToolCall
/// with a freshly generated id.
pub fn response_to_message(response: &Value) -> Result<Message, TransportError> {
    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            TransportError::Malformed(format!("response has no candidate parts: {}", response))
        })?;

    let mut text = String::new();
    let mut message = Message::assistant();

    for part in parts {
        if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
            text.push_str(t);
        }
        if let Some(call) = part.get("functionCall") {
            let name = call
                .get("name")
                .and_then(|n| n.as_str())
                .ok_or_else(|| TransportError::Malformed("functionCall without name".into()))?;
            let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
            message = message.with_tool_call(ToolCall::new(generate_call_id(), name, args));
        }
    }

    Ok(message.with_text(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::ToolResult;

    #[test]
    fn test_generate_call_id_is_unique() {
        let a = generate_call_id();
        let b = generate_call_id();
        assert_ne!(a, b);
        assert!(a.starts_with("call_"));
    }

    #[test]
    fn test_system_message_merges_into_first_user_turn() {
        let messages = vec![
            Message::system().with_text("Be helpful."),
            Message::user().with_text("Hi"),
            Message::assistant().with_text("Hello!"),
        ];

        let contents = messages_to_contents(&messages);
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "Be helpful.\n\nHi");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["text"], "Hello!");
    }

    #[test]
    fn test_system_only_transcript_still_carries_instructions() {
        let messages = vec![Message::system().with_text("Be helpful.")];
        let contents = messages_to_contents(&messages);
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "Be helpful.");
    }

    #[test]
    fn test_tool_round_trip_serialization() {
        let call = ToolCall::new("call_1", "read_file", json!({"path": "a.txt"}));
        let messages = vec![
            Message::system().with_text("sys"),
            Message::user().with_text("read it"),
            Message::assistant().with_tool_call(call),
            Message::assistant().with_tool_result(ToolResult::success("call_1", "contents")),
        ];

        let contents = messages_to_contents(&messages);
        assert_eq!(contents.len(), 3);

        let call_part = &contents[1]["parts"][0]["functionCall"];
        assert_eq!(call_part["name"], "read_file");
        assert_eq!(call_part["args"]["path"], "a.txt");

        // The result message has empty text, so its only part is the response,
        // keyed by the name recovered from the call id.
        let response_part = &contents[2]["parts"][0]["functionResponse"];
        assert_eq!(response_part["name"], "read_file");
        assert_eq!(response_part["response"]["result"], "contents");
    }

    #[test]
    fn test_error_results_serialize_under_error_key() {
        let messages = vec![
            Message::assistant().with_tool_call(ToolCall::new("c1", "shell", json!({}))),
            Message::assistant().with_tool_result(ToolResult::error("c1", "exit 1")),
        ];
        let contents = messages_to_contents(&messages);
        let response = &contents[1]["parts"][0]["functionResponse"]["response"];
        assert_eq!(response["error"], "exit 1");
        assert!(response.get("result").is_none());
    }

    #[test]
    fn test_tools_to_declarations() {
        let tools = vec![Tool::new(
            "read_file",
            "Read a file",
            json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        )];
        let declarations = tools_to_declarations(&tools);
        let declaration = &declarations[0]["functionDeclarations"][0];
        assert_eq!(declaration["name"], "read_file");
        assert_eq!(declaration["parameters"]["type"], "object");
    }

    #[test]
    fn test_response_to_message_concatenates_text() {
        let response = json!({
            "candidates": [{"content": {"parts": [
                {"text": "Hello, "},
                {"text": "world"}
            ]}}]
        });
        let message = response_to_message(&response).unwrap();
        assert_eq!(message.content, "Hello, world");
        assert!(message.tool_calls.is_empty());
    }

    #[test]
    fn test_response_to_message_decodes_function_calls() {
        let response = json!({
            "candidates": [{"content": {"parts": [
                {"functionCall": {"name": "list_directory", "args": {"path": "."}}},
                {"functionCall": {"name": "read_file", "args": {"path": "b"}}}
            ]}}]
        });
        let message = response_to_message(&response).unwrap();
        assert_eq!(message.tool_calls.len(), 2);
        assert_eq!(message.tool_calls[0].name, "list_directory");
        assert_eq!(message.tool_calls[1].name, "read_file");
        assert_ne!(message.tool_calls[0].id, message.tool_calls[1].id);
    }

    #[test]
    fn test_response_without_candidates_is_malformed() {
        let err = response_to_message(&json!({"error": "nope"})).unwrap_err();
        assert!(matches!(err, TransportError::Malformed(_)));
    }
}
