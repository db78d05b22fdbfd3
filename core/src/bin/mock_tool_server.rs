// Line-delimited JSON-RPC tool server used by integration tests and local demos.
//
// Tools:
//   echo        -> arguments back as a JSON object
//   list_files  -> "a.txt\nb.txt"
//   read_file   -> fixed content naming the requested path
//   env         -> value of the environment variable named by "name"
//   sleep       -> waits "ms" milliseconds, then answers "slept"
//   fail        -> error response ("message" or "tool failed")
//   crash       -> exits without answering
//   big         -> 1500 'x' characters
//   empty       -> empty string
//   null        -> null result
//   content     -> MCP content list with two text items
//   garbage     -> writes a line that is not JSON
//
// `--no-discovery` makes tools/list answer with an error.
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

const TOOLS: &[&str] = &[
    "echo",
    "list_files",
    "read_file",
    "env",
    "sleep",
    "fail",
    "crash",
    "big",
    "empty",
    "null",
    "content",
    "garbage",
];

enum Reply {
    Result(Value),
    Error(String),
    Raw(&'static str),
}

fn call_tool(name: &str, args: &Value) -> Reply {
    let str_arg = |key: &str| args.get(key).and_then(Value::as_str).unwrap_or_default();
    match name {
        "echo" => Reply::Result(args.clone()),
        "list_files" => Reply::Result(json!("a.txt\nb.txt")),
        "read_file" => Reply::Result(json!(format!("contents of {}", str_arg("path")))),
        "env" => Reply::Result(json!(std::env::var(str_arg("name")).unwrap_or_default())),
        "sleep" => {
            let ms = args.get("ms").and_then(Value::as_u64).unwrap_or(0);
            thread::sleep(Duration::from_millis(ms));
            Reply::Result(json!("slept"))
        }
        "fail" => {
            let message = args
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("tool failed");
            Reply::Error(message.to_string())
        }
        "crash" => std::process::exit(1),
        "big" => Reply::Result(json!("x".repeat(1500))),
        "empty" => Reply::Result(json!("")),
        "null" => Reply::Result(Value::Null),
        "content" => Reply::Result(json!({
            "content": [
                {"type": "text", "text": "line one"},
                {"type": "text", "text": "line two"}
            ]
        })),
        "garbage" => Reply::Raw("this is not json"),
        other => Reply::Error(format!("Unknown tool: {other}")),
    }
}

fn handle(request: &Value, discovery: bool) -> Reply {
    let params = request.get("params").cloned().unwrap_or(Value::Null);
    match request.get("method").and_then(Value::as_str) {
        Some("tools/list") if discovery => {
            let tools: Vec<Value> = TOOLS.iter().map(|t| json!({"name": t})).collect();
            Reply::Result(json!({ "tools": tools }))
        }
        Some("tools/call") => {
            let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
            let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            call_tool(name, &args)
        }
        Some(method) => Reply::Error(format!("Method not found: {method}")),
        None => Reply::Error("Invalid request".to_string()),
    }
}

fn main() -> io::Result<()> {
    let discovery = !std::env::args().any(|a| a == "--no-discovery");
    eprintln!("mock_tool_server ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let request: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                eprintln!("bad request: {e}");
                continue;
            }
        };
        let id = request.get("id").cloned().unwrap_or(Value::Null);

        let frame = match handle(&request, discovery) {
            Reply::Result(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string(),
            Reply::Error(message) => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32000, "message": message}
            })
            .to_string(),
            Reply::Raw(text) => text.to_string(),
        };
        writeln!(stdout, "{frame}")?;
        stdout.flush()?;
    }
    Ok(())
}
