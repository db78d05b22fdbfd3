// In-memory tool servers
//
// Deterministic stand-in for `ToolServerRegistry`: no processes, canned
// tool behaviour, failures injected on demand.
use super::error::{ConfigError, LaunchError, TransportError};
use super::registry::{check_unique_ids, LaunchReport, ToolServers};
use super::types::{
    CallToolParams, JsonRpcResponse, ServerConfig, ServerSnapshot, ServerStatus, METHOD_TOOLS_CALL,
    METHOD_TOOLS_LIST,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;
use tracing::debug;

/// What a fake tool does when called
#[derive(Debug, Clone)]
pub enum FakeReply {
    /// Successful result payload
    Result(Value),
    /// Error payload with this message
    Error(String),
    /// Behave like a server that never answers
    Timeout,
    /// Behave like a server whose stream broke
    Disconnect,
}

type Responder = Arc<dyn Fn(&Value) -> FakeReply + Send + Sync>;

struct FakeServer {
    config: ServerConfig,
    status: ServerStatus,
    pid: u32,
}

#[derive(Default)]
pub struct InMemoryToolServers {
    tools: HashMap<String, BTreeMap<String, Responder>>,
    launch_failures: HashSet<String>,
    no_discovery: HashSet<String>,
    servers: RwLock<BTreeMap<String, FakeServer>>,
    next_pid: AtomicU64,
    calls: RwLock<Vec<(String, String, Value)>>,
}

impl InMemoryToolServers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool that answers through `responder`
    pub fn with_tool<F>(mut self, server_id: &str, tool_name: &str, responder: F) -> Self
    where
        F: Fn(&Value) -> FakeReply + Send + Sync + 'static,
    {
        self.tools
            .entry(server_id.to_string())
            .or_default()
            .insert(tool_name.to_string(), Arc::new(responder));
        self
    }

    /// Register a tool that always gives the same reply
    pub fn with_reply(self, server_id: &str, tool_name: &str, reply: FakeReply) -> Self {
        self.with_tool(server_id, tool_name, move |_| reply.clone())
    }

    /// Launching this id fails with `LaunchError::NotFound`
    pub fn failing_launch(mut self, server_id: &str) -> Self {
        self.launch_failures.insert(server_id.to_string());
        self
    }

    /// This server rejects `tools/list`
    pub fn without_discovery(mut self, server_id: &str) -> Self {
        self.no_discovery.insert(server_id.to_string());
        self
    }

    /// Every `tools/call` received so far: (server, tool, arguments)
    pub async fn calls(&self) -> Vec<(String, String, Value)> {
        self.calls.read().await.clone()
    }

    /// Canned `filesystem` and `brave-search` servers for offline demos
    pub fn demo() -> Self {
        Self::new()
            .with_tool("filesystem", "read_file", |args| {
                let path = args.get("path").and_then(Value::as_str).unwrap_or("");
                FakeReply::Result(json!(format!(
                    "Mock file content from {path}\n# simulated file read\nprint('Hello from mock file')"
                )))
            })
            .with_tool("filesystem", "list_files", |args| {
                let path = args.get("path").and_then(Value::as_str).unwrap_or(".");
                FakeReply::Result(json!(format!(
                    "Mock directory listing for {path}:\n- file1.py\n- file2.txt\n- examples/"
                )))
            })
            .with_tool("filesystem", "search_files", |args| {
                let pattern = args.get("pattern").and_then(Value::as_str).unwrap_or("*");
                FakeReply::Result(json!([format!("match for {pattern}: file1.py")]))
            })
            .with_tool("brave-search", "search", |args| {
                let query = args.get("query").and_then(Value::as_str).unwrap_or("");
                FakeReply::Result(json!(format!(
                    "Mock search results for: {query}\n1. Information about {query}\n2. Latest developments in {query}"
                )))
            })
            .with_tool("brave-search", "news_search", |args| {
                let query = args.get("query").and_then(Value::as_str).unwrap_or("");
                FakeReply::Result(json!(format!("Mock news for: {query}")))
            })
    }

    /// Configs matching the servers that have registered tools
    pub fn configs(&self) -> Vec<ServerConfig> {
        let mut ids: Vec<&String> = self.tools.keys().collect();
        ids.sort();
        ids.into_iter()
            .map(|id| ServerConfig::new(id.clone(), "in-memory"))
            .collect()
    }

    fn answer(
        &self,
        id: &str,
        method: &str,
        params: &Value,
        request_id: u64,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, TransportError> {
        let tools = self.tools.get(id);
        match method {
            METHOD_TOOLS_LIST => {
                if self.no_discovery.contains(id) {
                    return Ok(JsonRpcResponse::failure(request_id, "Method not found"));
                }
                let names: Vec<Value> = tools
                    .map(|t| t.keys().map(|name| json!({ "name": name })).collect())
                    .unwrap_or_default();
                Ok(JsonRpcResponse::success(request_id, json!({ "tools": names })))
            }
            METHOD_TOOLS_CALL => {
                let call: CallToolParams = serde_json::from_value(params.clone())
                    .map_err(|e| TransportError::Protocol(e.to_string()))?;
                let Some(responder) = tools.and_then(|t| t.get(&call.name)) else {
                    return Ok(JsonRpcResponse::failure(
                        request_id,
                        format!("Unknown tool: {}", call.name),
                    ));
                };
                match responder(&call.arguments) {
                    FakeReply::Result(value) => Ok(JsonRpcResponse::success(request_id, value)),
                    FakeReply::Error(message) => Ok(JsonRpcResponse::failure(request_id, message)),
                    FakeReply::Timeout => Err(TransportError::Timeout(timeout)),
                    FakeReply::Disconnect => Err(TransportError::Io("stream closed".to_string())),
                }
            }
            other => Ok(JsonRpcResponse::failure(
                request_id,
                format!("Method not found: {other}"),
            )),
        }
    }
}

#[async_trait]
impl ToolServers for InMemoryToolServers {
    async fn start_all(&self, configs: Vec<ServerConfig>) -> Result<LaunchReport, ConfigError> {
        let mut servers = self.servers.write().await;
        check_unique_ids(&configs, servers.keys())?;

        let mut report = LaunchReport::new();
        for config in configs {
            let id = config.id.clone();
            if self.launch_failures.contains(&id) {
                report.insert(
                    id,
                    Err(LaunchError::NotFound {
                        command: config.command.clone(),
                    }),
                );
                continue;
            }
            let pid = 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst) as u32;
            servers.insert(
                id.clone(),
                FakeServer {
                    config,
                    status: ServerStatus::Running,
                    pid,
                },
            );
            report.insert(id, Ok(()));
        }
        Ok(report)
    }

    async fn get(&self, id: &str) -> Option<ServerSnapshot> {
        self.servers.read().await.get(id).map(|s| ServerSnapshot {
            config: s.config.clone(),
            status: s.status,
            pid: Some(s.pid),
        })
    }

    async fn list_ids(&self) -> BTreeSet<String> {
        self.servers.read().await.keys().cloned().collect()
    }

    async fn exchange(
        &self,
        id: &str,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, TransportError> {
        let running = self
            .servers
            .read()
            .await
            .get(id)
            .map(|s| s.status.is_running())
            .unwrap_or(false);
        if !running {
            return Err(TransportError::NotRunning(id.to_string()));
        }

        if method == METHOD_TOOLS_CALL {
            let tool = params
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
            self.calls
                .write()
                .await
                .push((id.to_string(), tool, arguments));
        }

        debug!(target: "tool_registry", server = %id, method = %method, "In-memory exchange");
        self.answer(id, method, &params, 1, timeout)
    }

    async fn mark_failed(&self, id: &str) {
        if let Some(server) = self.servers.write().await.get_mut(id) {
            if server.status.is_running() {
                server.status = ServerStatus::Failed;
            }
        }
    }

    async fn stop_all(&self) {
        self.servers.write().await.clear();
    }
}
