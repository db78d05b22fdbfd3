use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::directive::{scan_directives, Directive};
use super::prompt::{render_prompt, strip_marker, ToolCatalog, END_OF_TURN};
use super::session::{AgentSession, ConversationStats, ConversationTurn, SessionState};
use crate::llm::Completion;
use crate::tools::{ToolCallResult, ToolCaller};

/// Default per-call deadline for tool invocations
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);
/// Successful tool output longer than this (in characters) is truncated
pub const DEFAULT_MAX_TOOL_OUTPUT_CHARS: usize = 1000;
pub const TRUNCATION_MARKER: &str = "… [truncated]";
/// Returned instead of a generated turn while no topic is seeded
pub const IDLE_NOTICE: &str = "No topic has been started yet. Choose a topic to begin the lesson.";

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub tool_timeout: Duration,
    pub max_tool_output_chars: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            max_tool_output_chars: DEFAULT_MAX_TOOL_OUTPUT_CHARS,
        }
    }
}

/// Drives one learner session: prompt assembly, completion, directive
/// execution, marker handling.
///
/// Calls are expected one at a time; `produce_instructor_turn` takes
/// `&mut self` so a second turn cannot start while one is in flight.
pub struct ConversationEngine {
    session: AgentSession,
    completion: Arc<dyn Completion>,
    tools: Arc<dyn ToolCaller>,
    catalog: ToolCatalog,
    options: EngineOptions,
}

impl ConversationEngine {
    pub fn new(
        completion: Arc<dyn Completion>,
        tools: Arc<dyn ToolCaller>,
        tools_enabled: bool,
    ) -> Self {
        Self {
            session: AgentSession::new(tools_enabled),
            completion,
            tools,
            catalog: ToolCatalog::new(),
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn seed(&mut self, syllabus: impl Into<String>, topic: impl Into<String>) {
        self.session.seed(syllabus, topic);
        info!(target: "conversation", topic = %self.session.topic(), "Session seeded");
    }

    /// No-op for blank input or an idle session
    pub fn submit_student_turn(&mut self, text: &str) {
        if !self.session.append_student_turn(text) {
            debug!(target: "conversation", state = ?self.session.state(), "Student turn ignored");
        }
    }

    /// Generate, execute directives, store, and return the display text
    pub async fn produce_instructor_turn(&mut self) -> String {
        if self.session.state() == SessionState::Idle {
            return IDLE_NOTICE.to_string();
        }

        let prompt = render_prompt(&self.session, &self.catalog);
        debug!(target: "conversation", prompt_chars = prompt.len(), "Requesting instructor turn");

        let raw = match self.completion.complete(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(target: "conversation", error = %e, "Completion failed");
                let display = format!("Error generating instructor response: {e}");
                self.session
                    .append_instructor_turn(format!("{display}{END_OF_TURN}"));
                return display;
            }
        };

        let body = strip_marker(&raw).to_string();
        let display = if self.session.tools_enabled() {
            let blocks = self.run_directives(&body).await;
            if blocks.is_empty() {
                body
            } else {
                format!("{body}\n\n{}", blocks.join("\n\n"))
            }
        } else {
            body
        };

        self.session
            .append_instructor_turn(format!("{display}{END_OF_TURN}"));
        display
    }

    /// Strictly sequential, in order of appearance
    async fn run_directives(&self, body: &str) -> Vec<String> {
        let directives = scan_directives(body);
        if !directives.is_empty() {
            info!(target: "conversation", count = directives.len(), "Executing tool directives");
        }

        let mut blocks = Vec::with_capacity(directives.len());
        for Directive {
            server_id,
            tool_name,
            arguments,
            ..
        } in directives
        {
            let result = match arguments {
                Ok(args) => {
                    self.tools
                        .invoke(&server_id, &tool_name, args, self.options.tool_timeout)
                        .await
                }
                Err(e) => ToolCallResult::InvalidArguments(format!(
                    "{} in {}",
                    e.reason,
                    clip(&e.raw, 200)
                )),
            };
            blocks.push(render_result_block(
                &server_id,
                &tool_name,
                &result,
                &self.options,
            ));
        }
        blocks
    }

    pub fn reset(&mut self) {
        self.session.reset();
        info!(target: "conversation", "Session reset");
    }

    pub fn set_tools_enabled(&mut self, enabled: bool) {
        self.session.set_tools_enabled(enabled);
        info!(target: "conversation", enabled, "Tool directives toggled");
    }

    pub fn tools_enabled(&self) -> bool {
        self.session.tools_enabled()
    }

    pub fn set_tool_catalog(&mut self, catalog: ToolCatalog) {
        self.catalog = catalog;
    }

    pub fn tool_catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn history(&self) -> &[ConversationTurn] {
        self.session.history()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &AgentSession {
        &self.session
    }

    pub fn stats(&self) -> ConversationStats {
        self.session.stats()
    }
}

/// Human-readable annotation for one tool call
pub fn render_result_block(
    server_id: &str,
    tool_name: &str,
    result: &ToolCallResult,
    options: &EngineOptions,
) -> String {
    let label = format!("{server_id}.{tool_name}");
    match result {
        ToolCallResult::Success(text) if text.trim().is_empty() => {
            format!("**Tool {label} returned no results.**")
        }
        ToolCallResult::Success(text) => format!(
            "**Tool result ({label}):**\n{}",
            truncate_chars(text, options.max_tool_output_chars)
        ),
        ToolCallResult::NotFound => {
            format!("**Tool error ({label}):** server or tool not available")
        }
        ToolCallResult::InvalidArguments(reason) => {
            format!("**Tool error ({label}):** invalid arguments: {reason}")
        }
        ToolCallResult::ServerError(message) => format!("**Tool error ({label}):** {message}"),
        ToolCallResult::Timeout => format!(
            "**Tool timeout ({label}):** no response within {:?}",
            options.tool_timeout
        ),
    }
}

/// Keep the first `max` characters, marking the cut
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}

fn clip(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::CompletionError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;

    struct Scripted(Mutex<Vec<Result<String, CompletionError>>>);

    impl Scripted {
        fn new(replies: Vec<Result<String, CompletionError>>) -> Arc<Self> {
            let mut replies = replies;
            replies.reverse();
            Arc::new(Self(Mutex::new(replies)))
        }
    }

    #[async_trait]
    impl Completion for Scripted {
        async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
            self.0
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(CompletionError::Empty))
        }
    }

    struct Echo;

    #[async_trait]
    impl ToolCaller for Echo {
        async fn invoke(&self, _s: &str, _t: &str, args: Value, _d: Duration) -> ToolCallResult {
            ToolCallResult::Success(args.to_string())
        }
    }

    #[test]
    fn test_truncate_counts_characters() {
        let text = "é".repeat(1500);
        let out = truncate_chars(&text, 1000);
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert_eq!(out.trim_end_matches(TRUNCATION_MARKER).chars().count(), 1000);
        assert_eq!(truncate_chars("short", 1000), "short");
        assert_eq!(truncate_chars(&"a".repeat(1000), 1000), "a".repeat(1000));
    }

    #[test]
    fn test_render_blocks() {
        let opts = EngineOptions::default();
        let ok = render_result_block("fs", "ls", &ToolCallResult::Success("a.txt".into()), &opts);
        assert_eq!(ok, "**Tool result (fs.ls):**\na.txt");
        let empty = render_result_block("fs", "ls", &ToolCallResult::Success(String::new()), &opts);
        assert!(empty.contains("returned no results"));
        let timeout = render_result_block("fs", "ls", &ToolCallResult::Timeout, &opts);
        assert_eq!(timeout, "**Tool timeout (fs.ls):** no response within 30s");
        let missing = render_result_block("fs", "ls", &ToolCallResult::NotFound, &opts);
        assert!(missing.starts_with("**Tool error (fs.ls):**"));
    }

    #[tokio::test]
    async fn test_idle_turn_is_notice_without_history() {
        let completion = Scripted::new(vec![Ok("never".into())]);
        let mut engine = ConversationEngine::new(completion, Arc::new(Echo), true);
        assert_eq!(engine.produce_instructor_turn().await, IDLE_NOTICE);
        assert!(engine.history().is_empty());
    }

    #[tokio::test]
    async fn test_tools_disabled_leaves_directives_as_text() {
        let completion = Scripted::new(vec![Ok("Look: TOOL: fs ls {}<END_OF_TURN>".into())]);
        let mut engine = ConversationEngine::new(completion, Arc::new(Echo), false);
        engine.seed("S", "T");
        let out = engine.produce_instructor_turn().await;
        assert_eq!(out, "Look: TOOL: fs ls {}");
    }

    #[tokio::test]
    async fn test_stored_turn_carries_marker_once() {
        let completion = Scripted::new(vec![Ok("Hi\n<END_OF_TURN>\n".into())]);
        let mut engine = ConversationEngine::new(completion, Arc::new(Echo), true);
        engine.seed("S", "T");
        let out = engine.produce_instructor_turn().await;
        assert_eq!(out, "Hi");
        assert_eq!(engine.history()[0].text, "Hi<END_OF_TURN>");
    }
}
