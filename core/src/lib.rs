// Tutor Core Library
// Tool-server runtime and turn-based conversation engine

pub mod agent;
pub mod llm;
pub mod mcp;
pub mod telemetry;
pub mod tools;

// Export core types
pub use agent::{
    BlockingConversation, ConversationEngine, ConversationStats, ConversationTurn, EngineOptions,
    Role, SessionState, ToolCatalog, END_OF_TURN,
};
pub use llm::{ChatCompletionClient, Completion, CompletionError, LlmClientConfig};
pub use mcp::{
    ConfigError, InMemoryToolServers, LaunchError, LaunchReport, ServerConfig, ServerSnapshot,
    ServerStatus, ToolServerRegistry, ToolServers, TransportError,
};
pub use tools::{InvocationStats, ToolCallResult, ToolCaller, ToolInvoker};

use std::sync::Arc;
use tracing::info;

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TutorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, TutorError>;

/// Core runtime: tool servers, the invoker over them, and one conversation
pub struct Tutor {
    pub servers: Arc<dyn ToolServers>,
    pub invoker: Arc<ToolInvoker>,
    pub engine: ConversationEngine,
}

impl Tutor {
    /// Launch every configured server and wire the engine to them.
    ///
    /// Only duplicate ids abort startup; individual launch failures are in
    /// the returned report.
    pub async fn start(
        servers: Arc<dyn ToolServers>,
        configs: Vec<ServerConfig>,
        completion: Arc<dyn Completion>,
        options: EngineOptions,
        tools_enabled: bool,
    ) -> Result<(Self, LaunchReport)> {
        info!("Starting tutor...");

        let report = servers.start_all(configs).await?;
        let invoker = Arc::new(ToolInvoker::new(Arc::clone(&servers)));
        let tools: Arc<dyn ToolCaller> = invoker.clone();
        let engine = ConversationEngine::new(completion, tools, tools_enabled).with_options(options);

        let mut tutor = Self {
            servers,
            invoker,
            engine,
        };
        tutor.refresh_catalog().await;

        let running = report.values().filter(|r| r.is_ok()).count();
        info!(running, configured = report.len(), "Tutor started");
        Ok((tutor, report))
    }

    /// Re-query every running server for its tools
    pub async fn refresh_catalog(&mut self) {
        let catalog = discover_catalog(self.servers.as_ref()).await;
        self.engine.set_tool_catalog(catalog);
    }

    /// Launch one more server while the session runs and pick up its tools
    pub async fn add_server(&mut self, config: ServerConfig) -> Result<()> {
        let id = config.id.clone();
        let mut report = self.servers.start_all(vec![config]).await?;
        match report.remove(&id) {
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(())) | None => {}
        }
        info!(server = %id, "Tool server added");
        self.refresh_catalog().await;
        Ok(())
    }

    /// Snapshots of every registered server, by id
    pub async fn server_snapshots(&self) -> Vec<ServerSnapshot> {
        let mut snapshots = Vec::new();
        for id in self.servers.list_ids().await {
            if let Some(snapshot) = self.servers.get(&id).await {
                snapshots.push(snapshot);
            }
        }
        snapshots
    }

    pub async fn shutdown(&self) {
        info!("Shutting down tutor...");
        self.servers.stop_all().await;
        info!("Tutor shut down");
    }
}

/// Tool names per running server
pub async fn discover_catalog(servers: &dyn ToolServers) -> ToolCatalog {
    let mut catalog = ToolCatalog::new();
    for id in servers.list_ids().await {
        let running = matches!(servers.get(&id).await, Some(s) if s.status.is_running());
        if !running {
            continue;
        }
        let tools: Vec<String> = servers
            .list_tools(&id)
            .await
            .into_iter()
            .map(|t| t.name)
            .collect();
        if !tools.is_empty() {
            catalog.insert(id, tools);
        }
    }
    catalog
}
