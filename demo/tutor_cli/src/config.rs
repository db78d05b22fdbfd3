use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tutor_core::agent::{EngineOptions, DEFAULT_MAX_TOOL_OUTPUT_CHARS};
use tutor_core::llm::LlmClientConfig;
use tutor_core::mcp::ServerConfig;

/// High-level configuration for the tutor CLI
#[derive(Clone, Debug)]
pub struct TutorConfig {
    pub tools_enabled: bool,
    pub tool_timeout_ms: u64,
    pub max_tool_output_chars: usize,
    /// Use canned in-memory tool servers instead of spawning processes
    pub mock_tools: bool,
    /// Syllabus text file; without it the syllabus is generated per topic
    pub syllabus_path: Option<PathBuf>,
    pub llm: LlmClientConfig,
    pub servers: Vec<ServerConfig>,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            tools_enabled: std::env::var("TUTOR_TOOLS_ENABLED")
                .ok()
                .and_then(|v| v.parse::<bool>().ok())
                .unwrap_or(true),
            tool_timeout_ms: 30_000,
            max_tool_output_chars: DEFAULT_MAX_TOOL_OUTPUT_CHARS,
            mock_tools: std::env::var("TUTOR_MOCK_TOOLS")
                .ok()
                .and_then(|v| v.parse::<bool>().ok())
                .unwrap_or(false),
            syllabus_path: None,
            llm: LlmClientConfig::default(),
            servers: vec![default_filesystem_server()],
        }
    }
}

fn default_filesystem_server() -> ServerConfig {
    let mut server = ServerConfig::new("filesystem", "npx")
        .with_args(["@modelcontextprotocol/server-filesystem", "."]);
    server.display_name = "File System".to_string();
    server.description = "Access local files for educational content".to_string();
    server
}

impl TutorConfig {
    /// Load configuration from a TOML file (path via TUTOR_CONFIG or ./tutor.toml),
    /// overlaying values onto defaults and env-driven defaults.
    pub fn load() -> Self {
        let path = std::env::var("TUTOR_CONFIG").unwrap_or_else(|_| "tutor.toml".into());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(p: &Path) -> Self {
        let default = Self::default();
        if !p.exists() {
            tracing::info!(target: "tutor_cli", path = %p.display(), "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match Self::from_toml(&s, default.clone()) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(target: "tutor_cli", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "tutor_cli", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }

    fn from_toml(s: &str, base: Self) -> Result<Self, toml::de::Error> {
        toml::from_str::<TutorToml>(s).map(|t| t.overlay(base))
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            tool_timeout: Duration::from_millis(self.tool_timeout_ms),
            max_tool_output_chars: self.max_tool_output_chars,
        }
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct TutorToml {
    pub tools_enabled: Option<bool>,
    pub tool_timeout_ms: Option<u64>,
    pub max_tool_output_chars: Option<usize>,
    pub mock_tools: Option<bool>,
    pub syllabus_path: Option<PathBuf>,
    pub llm: Option<LlmToml>,
    /// Replaces the default server list when present
    pub servers: Option<Vec<ServerConfig>>,
}

impl TutorToml {
    fn overlay(self, mut base: TutorConfig) -> TutorConfig {
        if let Some(v) = self.tools_enabled {
            base.tools_enabled = v;
        }
        if let Some(v) = self.tool_timeout_ms {
            base.tool_timeout_ms = v.max(1);
        }
        if let Some(v) = self.max_tool_output_chars {
            base.max_tool_output_chars = v;
        }
        if let Some(v) = self.mock_tools {
            base.mock_tools = v;
        }
        if let Some(v) = self.syllabus_path {
            base.syllabus_path = Some(v);
        }
        if let Some(l) = self.llm {
            l.apply(&mut base.llm);
        }
        if let Some(servers) = self.servers {
            base.servers = servers;
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct LlmToml {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl LlmToml {
    fn apply(self, l: &mut LlmClientConfig) {
        if let Some(x) = self.base_url {
            l.base_url = x;
        }
        if let Some(x) = self.model {
            l.model = x;
        }
        if let Some(x) = self.api_key.filter(|k| !k.is_empty()) {
            l.api_key = Some(x);
        }
        if let Some(x) = self.request_timeout_ms {
            l.request_timeout_ms = x;
        }
        if let Some(x) = self.temperature {
            l.temperature = x.clamp(0.0, 2.0);
        }
        if let Some(x) = self.max_tokens {
            l.max_tokens = x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_keeps_unset_defaults() {
        let base = TutorConfig::default();
        let base_model = base.llm.model.clone();
        let cfg = TutorConfig::from_toml("tool_timeout_ms = 500\nmock_tools = true\n", base).unwrap();

        assert_eq!(cfg.tool_timeout_ms, 500);
        assert!(cfg.mock_tools);
        assert_eq!(cfg.llm.model, base_model);
        assert_eq!(cfg.servers.len(), 1);
        assert_eq!(cfg.servers[0].id, "filesystem");
        assert_eq!(cfg.engine_options().tool_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_servers_table_replaces_defaults() {
        let toml = r#"
            tools_enabled = false

            [llm]
            model = "tiny"
            temperature = 9.0

            [[servers]]
            id = "brave-search"
            name = "Web Search"
            command = "npx"
            args = ["@modelcontextprotocol/server-brave-search"]
            env = { BRAVE_API_KEY = "k" }

            [[servers]]
            id = "local"
            command = "./tool"
        "#;
        let cfg = TutorConfig::from_toml(toml, TutorConfig::default()).unwrap();

        assert!(!cfg.tools_enabled);
        assert_eq!(cfg.llm.model, "tiny");
        assert_eq!(cfg.llm.temperature, 2.0);
        let ids: Vec<_> = cfg.servers.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["brave-search", "local"]);
        assert_eq!(cfg.servers[0].display_name, "Web Search");
        assert_eq!(cfg.servers[0].env["BRAVE_API_KEY"], "k");
        assert!(cfg.servers[1].args.is_empty());
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        assert!(TutorConfig::from_toml("tools_enabled = [", TutorConfig::default()).is_err());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let cfg = TutorConfig::load_from(Path::new("/nonexistent/tutor.toml"));
        assert_eq!(cfg.tool_timeout_ms, 30_000);
    }
}
