use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::json;
use tutor_core::mcp::{
    ConfigError, LaunchError, ServerConfig, ServerStatus, ToolServerRegistry, ToolServers,
};

fn mock_server(id: &str) -> ServerConfig {
    ServerConfig::new(id, env!("CARGO_BIN_EXE_mock_tool_server"))
}

#[tokio::test]
async fn test_start_all_registers_only_successful_launches() {
    let registry = ToolServerRegistry::new();
    let report = registry
        .start_all(vec![
            mock_server("alpha"),
            ServerConfig::new("ghost", "/nonexistent/tutor-tool-server"),
            mock_server("beta"),
        ])
        .await
        .unwrap();

    assert_eq!(report.len(), 3);
    assert!(report["alpha"].is_ok());
    assert!(report["beta"].is_ok());
    assert!(matches!(report["ghost"], Err(LaunchError::NotFound { .. })));

    let expected: BTreeSet<String> = ["alpha", "beta"].iter().map(|s| s.to_string()).collect();
    assert_eq!(registry.list_ids().await, expected);

    let alpha = registry.get("alpha").await.unwrap();
    assert_eq!(alpha.status, ServerStatus::Running);
    assert!(alpha.pid.is_some());
    assert!(registry.get("ghost").await.is_none());

    registry.stop_all().await;
}

#[tokio::test]
async fn test_duplicate_ids_fail_before_any_launch() {
    let registry = ToolServerRegistry::new();
    let err = registry
        .start_all(vec![mock_server("a"), mock_server("b"), mock_server("a")])
        .await
        .unwrap_err();

    assert_eq!(err, ConfigError::DuplicateServerId("a".to_string()));
    assert!(registry.list_ids().await.is_empty());
}

#[tokio::test]
async fn test_start_rejects_registered_id() {
    let registry = ToolServerRegistry::new();
    assert!(registry.start(mock_server("solo")).await.unwrap().is_ok());
    assert!(registry.start(mock_server("solo")).await.is_err());

    registry.stop("solo").await;
    assert!(registry.get("solo").await.is_none());
    registry.stop_all().await;
}

#[tokio::test]
async fn test_list_tools_via_discovery() {
    let registry = ToolServerRegistry::new();
    let no_discovery = mock_server("quiet").with_args(["--no-discovery"]);
    registry
        .start_all(vec![mock_server("fs"), no_discovery])
        .await
        .unwrap();

    let names: Vec<String> = registry
        .list_tools("fs")
        .await
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert!(names.contains(&"list_files".to_string()));
    assert!(names.contains(&"echo".to_string()));

    assert!(registry.list_tools("quiet").await.is_empty());
    assert_eq!(
        registry.get("quiet").await.unwrap().status,
        ServerStatus::Running
    );
    assert!(registry.list_tools("missing").await.is_empty());

    registry.stop_all().await;
}

#[tokio::test]
async fn test_exchange_ids_increase_per_server() {
    let registry = ToolServerRegistry::new();
    registry.start_all(vec![mock_server("fs")]).await.unwrap();

    let params = json!({"name": "echo", "arguments": {"n": 1}});
    let first = registry
        .exchange("fs", "tools/call", params.clone(), Duration::from_secs(5))
        .await
        .unwrap();
    let second = registry
        .exchange("fs", "tools/call", params, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(first.id, json!(1));
    assert_eq!(second.id, json!(2));
    assert_eq!(first.result, Some(json!({"n": 1})));

    registry.stop_all().await;
}

#[tokio::test]
async fn test_stderr_is_kept_for_diagnostics() {
    let registry = ToolServerRegistry::new();
    registry.start_all(vec![mock_server("fs")]).await.unwrap();
    // The ready line is written before the first request is read
    registry.list_tools("fs").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let lines = registry.diagnostics("fs").await;
    assert!(lines.iter().any(|l| l.contains("mock_tool_server ready")));

    registry.stop_all().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_exited_server_reported_failed() {
    let registry = ToolServerRegistry::new();
    registry
        .start_all(vec![ServerConfig::new("short", "true")])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(
        registry.get("short").await.unwrap().status,
        ServerStatus::Failed
    );
    registry.stop_all().await;
}

#[tokio::test]
async fn test_stop_all_is_repeatable() {
    let registry = ToolServerRegistry::new();
    registry
        .start_all(vec![
            mock_server("a"),
            ServerConfig::new("broken", "/nonexistent/tutor-tool-server"),
        ])
        .await
        .unwrap();

    registry.stop_all().await;
    assert!(registry.list_ids().await.is_empty());
    registry.stop_all().await;
}
