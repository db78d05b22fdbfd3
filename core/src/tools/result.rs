use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mcp::types::ToolCallContent;

/// Outcome of one logical tool call. Consumed right away by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ToolCallResult {
    /// Payload rendered as one display string
    Success(String),
    /// Unknown server, or server not running
    NotFound,
    /// Arguments were not a well-formed mapping
    InvalidArguments(String),
    ServerError(String),
    Timeout,
}

impl ToolCallResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolCallResult::Success(_))
    }

    pub fn code(&self) -> &'static str {
        match self {
            ToolCallResult::Success(_) => "SUCCESS",
            ToolCallResult::NotFound => "NOT_FOUND",
            ToolCallResult::InvalidArguments(_) => "INVALID_ARGUMENTS",
            ToolCallResult::ServerError(_) => "SERVER_ERROR",
            ToolCallResult::Timeout => "TIMEOUT",
        }
    }
}

/// Render a result payload for display.
///
/// Strings are used as-is, MCP content lists are joined, anything else is
/// compact JSON. `Err` carries the text of an MCP result flagged `isError`.
pub fn render_payload(payload: Value) -> Result<String, String> {
    match payload {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        Value::Object(ref map) if map.contains_key("content") => {
            match serde_json::from_value::<ToolCallContent>(payload.clone()) {
                Ok(content) if content.is_error => Err(content.joined_text()),
                Ok(content) => Ok(content.joined_text()),
                Err(_) => Ok(payload.to_string()),
            }
        }
        other => Ok(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_string_payload() {
        assert_eq!(render_payload(json!("a.txt")), Ok("a.txt".to_string()));
    }

    #[test]
    fn test_render_compact_json() {
        assert_eq!(
            render_payload(json!({"files": ["a", "b"], "count": 2})),
            Ok(r#"{"count":2,"files":["a","b"]}"#.to_string())
        );
        assert_eq!(render_payload(json!(42)), Ok("42".to_string()));
    }

    #[test]
    fn test_render_mcp_content() {
        let ok = json!({"content": [{"type": "text", "text": "one"}, {"type": "text", "text": "two"}]});
        assert_eq!(render_payload(ok), Ok("one\ntwo".to_string()));

        let failed = json!({"content": [{"type": "text", "text": "no such file"}], "isError": true});
        assert_eq!(render_payload(failed), Err("no such file".to_string()));
    }

    #[test]
    fn test_content_key_with_other_shape_is_json() {
        let odd = json!({"content": "plain"});
        assert_eq!(render_payload(odd), Ok(r#"{"content":"plain"}"#.to_string()));
    }
}
