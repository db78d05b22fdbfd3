mod config;
use config::TutorConfig;
use std::fs;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};
use tutor_core::llm::{ChatCompletionClient, Completion};
use tutor_core::mcp::{InMemoryToolServers, ServerConfig, ToolServerRegistry, ToolServers};
use tutor_core::telemetry::init_logging;
use tutor_core::Tutor;

const HELP: &str = "\
Commands:
  /topic <name>    start a new topic (seeds the syllabus)
  /reset           forget the current topic
  /tools on|off    allow or forbid tool calls
  /servers         show tool server status
  /add <id> <command> [args...]
                   launch another tool server
  /stats           show conversation and tool statistics
  /quit            exit
Anything else is sent to the instructor.";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("warn,tutor_core=info,tutor_cli=info");
    info!(target: "tutor_cli", "Starting tutor CLI");

    // Load configuration (defaults + env + optional TOML overlay)
    let cfg = TutorConfig::load();

    let (servers, configs) = if cfg.mock_tools {
        let demo = InMemoryToolServers::demo();
        let configs = demo.configs();
        (Arc::new(demo) as Arc<dyn ToolServers>, configs)
    } else {
        let registry = Arc::new(ToolServerRegistry::new());
        (registry as Arc<dyn ToolServers>, cfg.servers.clone())
    };

    let completion: Arc<dyn Completion> = Arc::new(ChatCompletionClient::new(cfg.llm.clone())?);

    // Duplicate server ids abort here; single launch failures do not
    let (mut tutor, report) = Tutor::start(
        servers,
        configs,
        Arc::clone(&completion),
        cfg.engine_options(),
        cfg.tools_enabled,
    )
    .await?;

    for (id, outcome) in &report {
        match outcome {
            Ok(()) => println!("tool server {id}: running"),
            Err(e) => println!("tool server {id}: failed to start ({e})"),
        }
    }
    println!("{HELP}");

    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt_marker().await;
        let line = tokio::select! {
            _ = &mut shutdown => {
                info!(target: "tutor_cli", "Interrupted");
                break;
            }
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(target: "tutor_cli", error = %e, "Failed to read stdin");
                break;
            }
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input.split_once(' ').unwrap_or((input, "")) {
            ("/quit", _) | ("/exit", _) => break,
            ("/help", _) => println!("{HELP}"),
            ("/topic", topic) if !topic.trim().is_empty() => {
                let topic = topic.trim();
                let Some(syllabus) = load_syllabus(&cfg, completion.as_ref(), topic).await else {
                    continue;
                };
                println!("Syllabus:\n{syllabus}\n");
                tutor.engine.seed(syllabus, topic);
                let reply = tutor.engine.produce_instructor_turn().await;
                println!("\nInstructor: {reply}\n");
            }
            ("/topic", _) => println!("Usage: /topic <name>"),
            ("/reset", _) => {
                tutor.engine.reset();
                println!("Topic cleared. Use /topic to start again.");
            }
            ("/tools", "on") => tutor.engine.set_tools_enabled(true),
            ("/tools", "off") => tutor.engine.set_tools_enabled(false),
            ("/tools", _) => println!(
                "Tools are {}. Usage: /tools on|off",
                if tutor.engine.tools_enabled() { "on" } else { "off" }
            ),
            ("/servers", _) => {
                tutor.refresh_catalog().await;
                for snapshot in tutor.server_snapshots().await {
                    let tools = tutor
                        .engine
                        .tool_catalog()
                        .get(&snapshot.config.id)
                        .map(|t| t.join(", "))
                        .unwrap_or_default();
                    println!(
                        "{} ({}): {} pid={:?} tools=[{}]",
                        snapshot.config.id,
                        snapshot.config.label(),
                        snapshot.status,
                        snapshot.pid,
                        tools
                    );
                }
            }
            ("/add", spec) => match parse_server(spec) {
                Some(config) => {
                    let id = config.id.clone();
                    match tutor.add_server(config).await {
                        Ok(()) => println!("tool server {id}: running"),
                        Err(e) => println!("tool server {id}: not added ({e})"),
                    }
                }
                None => println!("Usage: /add <id> <command> [args...]"),
            },
            ("/stats", _) => {
                let stats = serde_json::json!({
                    "conversation": tutor.engine.stats(),
                    "tools": tutor.invoker.stats(),
                });
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
            _ => {
                tutor.engine.submit_student_turn(input);
                let reply = tutor.engine.produce_instructor_turn().await;
                println!("\nInstructor: {reply}\n");
            }
        }
    }

    tutor.shutdown().await;
    Ok(())
}

async fn prompt_marker() {
    let mut out = tokio::io::stdout();
    let _ = out.write_all(b"> ").await;
    let _ = out.flush().await;
}

/// `<id> <command> [args...]` as a server config
fn parse_server(spec: &str) -> Option<ServerConfig> {
    let mut words = spec.split_whitespace();
    let id = words.next()?;
    let command = words.next()?;
    Some(ServerConfig::new(id, command).with_args(words))
}

/// Syllabus from the configured file, or generated for the topic
async fn load_syllabus(cfg: &TutorConfig, completion: &dyn Completion, topic: &str) -> Option<String> {
    if let Some(path) = &cfg.syllabus_path {
        return match fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(target: "tutor_cli", path = %path.display(), error = %e, "Failed to read syllabus");
                println!("Could not read syllabus file {}: {e}", path.display());
                None
            }
        };
    }

    let request = format!(
        "Generate a course syllabus to teach the topic: {topic}\n\
         List the stages in teaching order as a numbered outline. \
         Reply with the outline only."
    );
    match completion.complete(&request).await {
        Ok(text) => Some(text.trim().to_string()),
        Err(e) => {
            warn!(target: "tutor_cli", error = %e, "Syllabus generation failed");
            println!("Error generating syllabus: {e}");
            None
        }
    }
}
