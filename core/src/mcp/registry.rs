//! Tool server registry
//!
//! Maps server ids to live handles and is the sole owner of every
//! `ToolServerProcess`. All status transitions happen here.
use super::error::{ConfigError, LaunchError, TransportError};
use super::process::{ToolServerProcess, DEFAULT_STOP_GRACE};
use super::types::{
    parse_tool_list, JsonRpcRequest, JsonRpcResponse, ServerConfig, ServerSnapshot, ServerStatus,
    ToolDescriptor, METHOD_TOOLS_LIST,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Bound on a discovery request
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of `start_all`: one launch result per configured id
pub type LaunchReport = BTreeMap<String, Result<(), LaunchError>>;

/// Capability set shared by the process-backed registry and the in-memory fake
#[async_trait]
pub trait ToolServers: Send + Sync {
    /// Start every config independently. A duplicate id fails the whole call
    /// before anything is launched.
    async fn start_all(&self, configs: Vec<ServerConfig>) -> Result<LaunchReport, ConfigError>;

    /// Read-only lookup; absence is not an error here
    async fn get(&self, id: &str) -> Option<ServerSnapshot>;

    async fn list_ids(&self) -> BTreeSet<String>;

    /// One request/response exchange with a running server
    async fn exchange(
        &self,
        id: &str,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, TransportError>;

    /// Record that a server's stream broke. Never overrides `stopped`.
    async fn mark_failed(&self, id: &str);

    /// Stop every handle; safe to call repeatedly
    async fn stop_all(&self);

    /// Tool descriptors via `tools/list`. Servers without discovery yield an
    /// empty list rather than an error.
    async fn list_tools(&self, id: &str) -> Vec<ToolDescriptor> {
        match self
            .exchange(id, METHOD_TOOLS_LIST, json!({}), DISCOVERY_TIMEOUT)
            .await
        {
            Ok(response) => {
                if let Some(error) = response.error {
                    debug!(target: "tool_registry", server = %id, error = %error.message, "Discovery not supported");
                    return Vec::new();
                }
                response
                    .result
                    .and_then(parse_tool_list)
                    .unwrap_or_else(|| {
                        debug!(target: "tool_registry", server = %id, "Unrecognised tools/list payload");
                        Vec::new()
                    })
            }
            Err(e) => {
                warn!(target: "tool_registry", server = %id, error = %e, "Discovery failed");
                if e.is_fatal() {
                    self.mark_failed(id).await;
                }
                Vec::new()
            }
        }
    }
}

/// Runtime record for one launched server
pub struct ToolServerHandle {
    config: ServerConfig,
    status: RwLock<ServerStatus>,
    /// One exchange at a time per server
    process: Mutex<Option<ToolServerProcess>>,
    request_id: AtomicU64,
    pid: Option<u32>,
}

impl ToolServerHandle {
    /// Handles begin as `Starting` until the registry has recorded them
    fn new(config: ServerConfig, process: ToolServerProcess) -> Self {
        Self {
            pid: process.pid(),
            config,
            status: RwLock::new(ServerStatus::Starting),
            process: Mutex::new(Some(process)),
            request_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub async fn status(&self) -> ServerStatus {
        *self.status.read().await
    }

    async fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            config: self.config.clone(),
            status: self.refresh_status().await,
            pid: self.pid,
        }
    }

    /// Notice a process that died while idle. Skips the check when an
    /// exchange holds the process.
    async fn refresh_status(&self) -> ServerStatus {
        let mut status = self.status.write().await;
        if status.is_running() {
            if let Ok(mut guard) = self.process.try_lock() {
                if let Some(process) = guard.as_mut() {
                    if process.has_exited() {
                        warn!(target: "tool_registry", server = %self.config.id, "Tool server exited unexpectedly");
                        *status = ServerStatus::Failed;
                    }
                }
            }
        }
        *status
    }

    /// `Starting` to `Running`; any other state is left alone
    async fn mark_running(&self) -> ServerStatus {
        let mut status = self.status.write().await;
        if *status == ServerStatus::Starting {
            *status = ServerStatus::Running;
        }
        *status
    }

    async fn mark_failed(&self) {
        let mut status = self.status.write().await;
        if matches!(*status, ServerStatus::Running | ServerStatus::Starting) {
            warn!(target: "tool_registry", server = %self.config.id, "Marking tool server failed");
            *status = ServerStatus::Failed;
        }
    }

    async fn stop(&self) {
        *self.status.write().await = ServerStatus::Stopped;
        // Waits for an in-flight exchange to finish first
        let mut guard = self.process.lock().await;
        if let Some(mut process) = guard.take() {
            process.stop(DEFAULT_STOP_GRACE).await;
        }
    }

    async fn exchange(
        &self,
        method: &str,
        params: Value,
        wait: Duration,
    ) -> Result<JsonRpcResponse, TransportError> {
        let mut guard = self.process.lock().await;
        let process = guard
            .as_mut()
            .ok_or_else(|| TransportError::NotRunning(self.config.id.clone()))?;
        if !self.status.read().await.is_running() {
            return Err(TransportError::NotRunning(self.config.id.clone()));
        }

        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);
        let frame = serde_json::to_vec(&request)
            .map_err(|e| TransportError::Protocol(format!("Failed to encode request: {e}")))?;

        debug!(target: "tool_registry", server = %self.config.id, id = id, method = %method, "Sending request");
        process.send(&frame).await?;

        let deadline = Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let line = match process.receive(remaining).await {
                Err(TransportError::Timeout(_)) => return Err(TransportError::Timeout(wait)),
                other => other?,
            };
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let response: JsonRpcResponse = serde_json::from_slice(&line).map_err(|e| {
                TransportError::Protocol(format!("Unparseable response frame: {e}"))
            })?;

            match response.id.as_u64() {
                Some(echo) if echo == id => return Ok(response),
                Some(echo) if echo < id => {
                    warn!(
                        target: "tool_registry",
                        server = %self.config.id,
                        id = echo,
                        "Discarding late response to an abandoned request"
                    );
                }
                _ => {
                    return Err(TransportError::Protocol(format!(
                        "Response id {} does not match request id {}",
                        response.id, id
                    )))
                }
            }
        }
    }
}

/// Process-backed registry
#[derive(Default)]
pub struct ToolServerRegistry {
    handles: RwLock<HashMap<String, Arc<ToolServerHandle>>>,
}

impl ToolServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch and register a single server
    pub async fn start(&self, config: ServerConfig) -> Result<Result<(), LaunchError>, ConfigError> {
        if self.handles.read().await.contains_key(&config.id) {
            return Err(ConfigError::DuplicateServerId(config.id));
        }
        Ok(self.launch(config).await)
    }

    /// Stop and forget one server; unknown ids are ignored
    pub async fn stop(&self, id: &str) {
        let handle = self.handles.write().await.remove(id);
        match handle {
            Some(handle) => {
                handle.stop().await;
                info!(target: "tool_registry", server = %id, "Tool server removed");
            }
            None => {
                warn!(target: "tool_registry", server = %id, "Server not found");
            }
        }
    }

    /// The live handle for `id`, if registered
    pub async fn handle(&self, id: &str) -> Option<Arc<ToolServerHandle>> {
        self.handles.read().await.get(id).cloned()
    }

    /// Recent stderr lines of a server, for status displays
    pub async fn diagnostics(&self, id: &str) -> Vec<String> {
        match self.handle(id).await {
            Some(handle) => match handle.process.try_lock() {
                Ok(guard) => guard
                    .as_ref()
                    .map(|p| p.recent_stderr())
                    .unwrap_or_default(),
                Err(_) => Vec::new(),
            },
            None => Vec::new(),
        }
    }

    async fn launch(&self, config: ServerConfig) -> Result<(), LaunchError> {
        let id = config.id.clone();
        let process = ToolServerProcess::start(&config)?;
        let handle = Arc::new(ToolServerHandle::new(config, process));

        let mut handles = self.handles.write().await;
        if handles.contains_key(&id) {
            // Lost a race with a concurrent start of the same id
            drop(handles);
            handle.stop().await;
            warn!(target: "tool_registry", server = %id, "Duplicate start discarded");
            return Ok(());
        }
        handles.insert(id.clone(), Arc::clone(&handle));
        drop(handles);
        let status = handle.mark_running().await;
        info!(target: "tool_registry", server = %id, status = %status, "Tool server registered");
        Ok(())
    }
}

/// Reject configs whose ids repeat among themselves or clash with `existing`
pub(crate) fn check_unique_ids<'a, I>(
    configs: &[ServerConfig],
    existing: I,
) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut seen: HashSet<&str> = existing.into_iter().map(String::as_str).collect();
    for config in configs {
        if !seen.insert(config.id.as_str()) {
            return Err(ConfigError::DuplicateServerId(config.id.clone()));
        }
    }
    Ok(())
}

#[async_trait]
impl ToolServers for ToolServerRegistry {
    async fn start_all(&self, configs: Vec<ServerConfig>) -> Result<LaunchReport, ConfigError> {
        check_unique_ids(&configs, self.handles.read().await.keys())?;

        info!(target: "tool_registry", count = configs.len(), "Starting tool servers");
        let mut report = LaunchReport::new();
        for config in configs {
            let id = config.id.clone();
            let outcome = self.launch(config).await;
            if let Err(ref e) = outcome {
                warn!(target: "tool_registry", server = %id, error = %e, "Tool server failed to launch");
            }
            report.insert(id, outcome);
        }
        Ok(report)
    }

    async fn get(&self, id: &str) -> Option<ServerSnapshot> {
        let handle = self.handle(id).await?;
        Some(handle.snapshot().await)
    }

    async fn list_ids(&self) -> BTreeSet<String> {
        self.handles.read().await.keys().cloned().collect()
    }

    async fn exchange(
        &self,
        id: &str,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, TransportError> {
        let handle = self
            .handle(id)
            .await
            .ok_or_else(|| TransportError::NotRunning(id.to_string()))?;
        handle.exchange(method, params, timeout).await
    }

    async fn mark_failed(&self, id: &str) {
        if let Some(handle) = self.handle(id).await {
            handle.mark_failed().await;
        }
    }

    async fn stop_all(&self) {
        info!(target: "tool_registry", "Stopping all tool servers");

        let handles: Vec<_> = {
            let mut map = self.handles.write().await;
            map.drain().collect()
        };

        for (id, handle) in handles {
            debug!(target: "tool_registry", server = %id, "Stopping server");
            handle.stop().await;
        }

        info!(target: "tool_registry", "Tool registry shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_ids_rejected() {
        let configs = vec![
            ServerConfig::new("a", "cat"),
            ServerConfig::new("b", "cat"),
            ServerConfig::new("a", "cat"),
        ];
        assert_eq!(
            check_unique_ids(&configs, std::iter::empty()),
            Err(ConfigError::DuplicateServerId("a".into()))
        );
    }

    #[test]
    fn test_clash_with_existing_rejected() {
        let existing = vec!["b".to_string()];
        let configs = vec![ServerConfig::new("b", "cat")];
        assert!(check_unique_ids(&configs, existing.iter()).is_err());
        assert!(check_unique_ids(&[ServerConfig::new("c", "cat")], existing.iter()).is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_handle_starts_then_runs() {
        let process = ToolServerProcess::start(&ServerConfig::new("cat", "cat")).unwrap();
        let handle = ToolServerHandle::new(ServerConfig::new("cat", "cat"), process);
        assert_eq!(handle.status().await, ServerStatus::Starting);

        assert_eq!(handle.mark_running().await, ServerStatus::Running);
        handle.stop().await;
        assert_eq!(handle.mark_running().await, ServerStatus::Stopped);
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let registry = ToolServerRegistry::new();
        assert!(registry.list_ids().await.is_empty());
        assert!(registry.get("missing").await.is_none());
        registry.stop_all().await;
        registry.stop("missing").await;
    }
}
