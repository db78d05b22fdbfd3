use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::result::{render_payload, ToolCallResult};
use crate::mcp::registry::ToolServers;
use crate::mcp::types::{CallToolParams, METHOD_TOOLS_CALL};
use crate::mcp::TransportError;

/// What the conversation engine needs from the tool layer
#[async_trait]
pub trait ToolCaller: Send + Sync {
    async fn invoke(
        &self,
        server_id: &str,
        tool_name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> ToolCallResult;
}

/// Lightweight counters for observability
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvocationStats {
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_timeouts: u64,
    pub avg_latency_ms: f64,
}

impl InvocationStats {
    fn record(&mut self, result: &ToolCallResult, elapsed_ms: f64) {
        self.total_calls += 1;
        if !result.is_success() {
            self.total_failures += 1;
        }
        if *result == ToolCallResult::Timeout {
            self.total_timeouts += 1;
        }
        let n = self.total_calls as f64;
        self.avg_latency_ms = ((self.avg_latency_ms * (n - 1.0)) + elapsed_ms) / n;
    }
}

/// Turns one (server, tool, arguments) triple into one protocol exchange.
///
/// Stateless apart from counters. Transport failures never escape: they
/// come back as `ToolCallResult` variants. No retries.
pub struct ToolInvoker {
    servers: Arc<dyn ToolServers>,
    stats: Mutex<InvocationStats>,
}

impl ToolInvoker {
    pub fn new(servers: Arc<dyn ToolServers>) -> Self {
        Self {
            servers,
            stats: Mutex::new(InvocationStats::default()),
        }
    }

    pub fn stats(&self) -> InvocationStats {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    #[tracing::instrument(name = "tool_invoker.invoke", skip(self, arguments), fields(server = %server_id, tool = %tool_name))]
    pub async fn invoke(
        &self,
        server_id: &str,
        tool_name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> ToolCallResult {
        let started = Instant::now();
        let result = self.call(server_id, tool_name, arguments, timeout).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        if let Ok(mut stats) = self.stats.lock() {
            stats.record(&result, elapsed_ms);
        }
        info!(
            target: "tool_invoker",
            server = %server_id,
            tool = %tool_name,
            status = result.code(),
            latency_ms = elapsed_ms,
            "Tool invocation finished"
        );
        result
    }

    async fn call(
        &self,
        server_id: &str,
        tool_name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> ToolCallResult {
        match self.servers.get(server_id).await {
            Some(snapshot) if snapshot.status.is_running() => {}
            Some(snapshot) => {
                debug!(target: "tool_invoker", server = %server_id, status = %snapshot.status, "Server not running");
                return ToolCallResult::NotFound;
            }
            None => {
                debug!(target: "tool_invoker", server = %server_id, "Unknown server");
                return ToolCallResult::NotFound;
            }
        }

        if !arguments.is_object() {
            return ToolCallResult::InvalidArguments(format!(
                "expected a JSON object, got {}",
                json_kind(&arguments)
            ));
        }

        let params = CallToolParams {
            name: tool_name.to_string(),
            arguments,
        };
        let params = match serde_json::to_value(params) {
            Ok(v) => v,
            Err(e) => return ToolCallResult::InvalidArguments(e.to_string()),
        };

        match self
            .servers
            .exchange(server_id, METHOD_TOOLS_CALL, params, timeout)
            .await
        {
            Ok(response) => {
                if let Some(error) = response.error {
                    return ToolCallResult::ServerError(error.message);
                }
                match response.result {
                    Some(payload) => match render_payload(payload) {
                        Ok(text) => ToolCallResult::Success(text),
                        Err(text) => ToolCallResult::ServerError(text),
                    },
                    None => {
                        warn!(target: "tool_invoker", server = %server_id, "Response carries neither result nor error");
                        self.servers.mark_failed(server_id).await;
                        ToolCallResult::ServerError("server unavailable".to_string())
                    }
                }
            }
            Err(TransportError::Timeout(_)) => ToolCallResult::Timeout,
            Err(TransportError::NotRunning(_)) => ToolCallResult::NotFound,
            Err(e) => {
                warn!(target: "tool_invoker", server = %server_id, error = %e, "Tool server stream broke");
                self.servers.mark_failed(server_id).await;
                ToolCallResult::ServerError("server unavailable".to_string())
            }
        }
    }
}

#[async_trait]
impl ToolCaller for ToolInvoker {
    async fn invoke(
        &self,
        server_id: &str,
        tool_name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> ToolCallResult {
        ToolInvoker::invoke(self, server_id, tool_name, arguments, timeout).await
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
