//! Resolution of a chat completion request into a single gateway action

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::protocol::{ChatCompletionRequest, ChatMessage, LIST_TOOLS};
use crate::{Error, Result};

/// What a chat request asks the gateway to do
#[derive(Debug, Clone, PartialEq)]
pub enum ChatIntent {
    /// Return the visible catalogue
    ListTools,
    /// Invoke one tool
    Call {
        /// Tool name
        name: String,
        /// Raw arguments
        arguments: Value,
    },
}

/// Resolve the request to exactly one intent.
///
/// Checked in order: a system `list_tools` message, the last message that
/// carries `tool_calls`, then a `Call tool <Name> with arguments: {...}`
/// message. Anything else is a protocol error.
pub fn resolve(request: &ChatCompletionRequest) -> Result<ChatIntent> {
    if request.messages.is_empty() {
        return Err(Error::Protocol("'messages' must not be empty".into()));
    }

    if request.messages.iter().any(is_list_tools) {
        return Ok(ChatIntent::ListTools);
    }

    if let Some(message) = request.messages.iter().rev().find(|m| !m.tool_calls.is_empty()) {
        let [call] = message.tool_calls.as_slice() else {
            return Err(Error::Protocol(format!(
                "Expected exactly one tool call, got {}",
                message.tool_calls.len()
            )));
        };
        return Ok(ChatIntent::Call {
            name: call.function.name.clone(),
            arguments: call.function.parsed_arguments()?,
        });
    }

    for message in request.messages.iter().rev() {
        let Some(text) = message.text() else {
            continue;
        };
        if let Some(intent) = parse_call_text(&text)? {
            return Ok(intent);
        }
    }

    Err(Error::Protocol(
        "No tool call found: send a 'list_tools' system message, one tool call, \
         or 'Call tool <Name> with arguments: {...}'"
            .into(),
    ))
}

fn is_list_tools(message: &ChatMessage) -> bool {
    message.role == "system" && message.text().is_some_and(|t| t.trim() == LIST_TOOLS)
}

fn call_pattern() -> Option<&'static Regex> {
    static CALL_RE: OnceLock<Option<Regex>> = OnceLock::new();
    CALL_RE
        .get_or_init(|| {
            Regex::new(r"(?s)Call tool\s+([A-Za-z0-9_.\-]+)\s+with arguments:\s*(\{.*\})\s*$").ok()
        })
        .as_ref()
}

/// `Ok(None)` when the text is not a call; `Err` when it is one with
/// undecodable arguments.
fn parse_call_text(text: &str) -> Result<Option<ChatIntent>> {
    let Some(captures) = call_pattern().and_then(|re| re.captures(text)) else {
        return Ok(None);
    };
    let name = captures[1].to_string();
    let arguments = serde_json::from_str(&captures[2])
        .map_err(|e| Error::Protocol(format!("Invalid arguments for '{name}': {e}")))?;
    Ok(Some(ChatIntent::Call { name, arguments }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn request(messages: Value) -> ChatCompletionRequest {
        serde_json::from_value(json!({ "messages": messages })).unwrap()
    }

    fn tool_call(name: &str, args: &str) -> Value {
        json!({"type": "function", "function": {"name": name, "arguments": args}})
    }

    // ── Discovery ──

    #[test]
    fn system_list_tools_is_discovery() {
        let req = request(json!([
            {"role": "system", "content": "list_tools"},
            {"role": "user", "content": "hi"}
        ]));
        assert_eq!(resolve(&req).unwrap(), ChatIntent::ListTools);
    }

    #[test]
    fn user_list_tools_is_not_discovery() {
        let req = request(json!([{"role": "user", "content": "list_tools"}]));
        assert!(matches!(resolve(&req), Err(Error::Protocol(_))));
    }

    // ── Tool calls ──

    #[test]
    fn single_tool_call_resolved() {
        let req = request(json!([
            {"role": "user", "content": "agents?"},
            {"role": "assistant", "tool_calls": [tool_call("GetAgentsTool", r#"{"cluster":"lab"}"#)]}
        ]));
        assert_eq!(
            resolve(&req).unwrap(),
            ChatIntent::Call {
                name: "GetAgentsTool".into(),
                arguments: json!({"cluster": "lab"}),
            }
        );
    }

    #[test]
    fn last_tool_call_message_wins() {
        let req = request(json!([
            {"role": "assistant", "tool_calls": [tool_call("ListRulesTool", "{}")]},
            {"role": "tool", "content": "..."},
            {"role": "assistant", "tool_calls": [tool_call("GetAgentTool", "{}")]}
        ]));
        assert!(matches!(resolve(&req).unwrap(), ChatIntent::Call { name, .. } if name == "GetAgentTool"));
    }

    #[test]
    fn several_tool_calls_rejected() {
        let req = request(json!([
            {"role": "assistant", "tool_calls": [tool_call("A", "{}"), tool_call("B", "{}")]}
        ]));
        let err = resolve(&req).unwrap_err();
        assert!(err.to_string().contains("exactly one tool call, got 2"));
    }

    // ── Text convention ──

    #[test]
    fn call_text_resolved() {
        let req = request(json!([{
            "role": "user",
            "content": "Call tool GetAgentTool with arguments: {\"cluster\": \"lab\", \"agent_id\": \"001\"}"
        }]));
        assert_eq!(
            resolve(&req).unwrap(),
            ChatIntent::Call {
                name: "GetAgentTool".into(),
                arguments: json!({"cluster": "lab", "agent_id": "001"}),
            }
        );
    }

    #[test]
    fn call_text_with_bad_json_is_protocol_error() {
        let req = request(json!([{
            "role": "user",
            "content": "Call tool GetAgentTool with arguments: {cluster}"
        }]));
        assert!(matches!(resolve(&req), Err(Error::Protocol(_))));
    }

    #[test]
    fn plain_chat_rejected() {
        let req = request(json!([{"role": "user", "content": "hello"}]));
        assert!(matches!(resolve(&req), Err(Error::Protocol(_))));
    }

    #[test]
    fn empty_messages_rejected() {
        assert!(matches!(resolve(&request(json!([]))), Err(Error::Protocol(_))));
    }
}
