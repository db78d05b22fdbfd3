// Tool protocol types
//
// Line-delimited JSON-RPC 2.0 frames exchanged with a tool server over its
// stdio, plus the declarative server configuration.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const JSONRPC_VERSION: &str = "2.0";

/// Method used to invoke one tool
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// Best-effort capability discovery
pub const METHOD_TOOLS_LIST: &str = "tools/list";

/// Declarative launch settings for one tool server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique key within a registry
    pub id: String,
    #[serde(rename = "name", default)]
    pub display_name: String,
    /// Executable path or name resolved through PATH
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Overrides merged over the inherited environment
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub description: String,
}

impl ServerConfig {
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            description: String::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Name shown to humans; falls back to the id
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.id
        } else {
            &self.display_name
        }
    }
}

/// Lifecycle of a registry handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Starting,
    Running,
    Failed,
    Stopped,
}

impl ServerStatus {
    pub fn is_running(self) -> bool {
        self == ServerStatus::Running
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServerStatus::Starting => "starting",
            ServerStatus::Running => "running",
            ServerStatus::Failed => "failed",
            ServerStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of a registry handle
#[derive(Debug, Clone)]
pub struct ServerSnapshot {
    pub config: ServerConfig,
    pub status: ServerStatus,
    pub pid: Option<u32>,
}

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String, // always "2.0"
    pub method: String,
    pub params: Value,
    pub id: u64,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value, // echo of the request id
    /// `Some(Value::Null)` for `"result": null`; `None` only when the key is absent
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Value::from(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: u64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Value::from(id),
            result: None,
            error: Some(JsonRpcError {
                code: None,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// tools/call request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    pub arguments: Value,
}

/// Tool descriptor returned by discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        rename = "inputSchema",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub input_schema: Option<Value>,
}

impl ToolDescriptor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
        }
    }
}

/// MCP-style content item inside a tools/call result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image {
        #[serde(rename = "mimeType", default)]
        mime_type: String,
    },
    #[serde(rename = "resource")]
    Resource { resource: ResourceContents },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceContents {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// tools/call result in MCP shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallContent {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolCallContent {
    /// Join every content item into one display string
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|item| match item {
                ToolContent::Text { text } => text.clone(),
                ToolContent::Image { .. } => "[image content]".to_string(),
                ToolContent::Resource { resource } => match &resource.text {
                    Some(text) => text.clone(),
                    None => format!("[resource: {}]", resource.uri),
                },
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parse a discovery payload: either a bare descriptor array or `{"tools": [...]}`
pub fn parse_tool_list(payload: Value) -> Option<Vec<ToolDescriptor>> {
    #[derive(Deserialize)]
    struct Wrapped {
        tools: Vec<ToolDescriptor>,
    }

    match payload {
        Value::Array(_) => serde_json::from_value(payload).ok(),
        Value::Object(_) => serde_json::from_value::<Wrapped>(payload)
            .ok()
            .map(|w| w.tools),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_frame_layout() {
        let req = JsonRpcRequest::new(
            7,
            METHOD_TOOLS_CALL,
            json!({"name": "list_files", "arguments": {"path": "."}}),
        );
        let line = serde_json::to_string(&req).unwrap();
        assert!(!line.contains('\n'));

        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(
            parsed,
            json!({
                "jsonrpc": "2.0",
                "method": "tools/call",
                "params": {"name": "list_files", "arguments": {"path": "."}},
                "id": 7
            })
        );
    }

    #[test]
    fn test_null_result_differs_from_missing_result() {
        let null: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","result":null,"id":4}"#).unwrap();
        assert_eq!(null.result, Some(Value::Null));
        assert!(null.error.is_none());

        let missing: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":4}"#).unwrap();
        assert!(missing.result.is_none());
    }

    #[test]
    fn test_error_response_without_code() {
        let resp: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","error":{"message":"boom"},"id":3}"#)
                .unwrap();
        assert!(resp.result.is_none());
        assert_eq!(resp.error.unwrap().message, "boom");
        assert_eq!(resp.id.as_u64(), Some(3));
    }

    #[test]
    fn test_server_config_from_record() {
        let cfg: ServerConfig = serde_json::from_value(json!({
            "id": "filesystem",
            "name": "File System",
            "command": "npx",
            "args": ["@modelcontextprotocol/server-filesystem", "."],
            "description": "Access local files"
        }))
        .unwrap();
        assert_eq!(cfg.id, "filesystem");
        assert_eq!(cfg.label(), "File System");
        assert_eq!(cfg.args.len(), 2);
        assert!(cfg.env.is_empty());
    }

    #[test]
    fn test_parse_tool_list_shapes() {
        let bare = parse_tool_list(json!([{"name": "a"}, {"name": "b", "extra": 1}])).unwrap();
        assert_eq!(bare.len(), 2);
        assert_eq!(bare[1].name, "b");

        let wrapped = parse_tool_list(json!({"tools": [{"name": "search"}]})).unwrap();
        assert_eq!(wrapped, vec![ToolDescriptor::named("search")]);

        assert!(parse_tool_list(json!("nope")).is_none());
    }

    #[test]
    fn test_content_joined_text() {
        let content: ToolCallContent = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "line one"},
                {"type": "resource", "resource": {"uri": "file:///a.txt"}}
            ]
        }))
        .unwrap();
        assert!(!content.is_error);
        assert_eq!(content.joined_text(), "line one\n[resource: file:///a.txt]");
    }
}
