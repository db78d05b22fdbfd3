//! Conversation layer
//!
//! An [`AgentSession`] holds syllabus, topic and turn history. The
//! [`ConversationEngine`] renders it into a prompt, asks a [`Completion`]
//! backend for the next instructor turn, executes any embedded tool
//! directives through a [`ToolCaller`], and stores the result.
//!
//! [`Completion`]: crate::llm::Completion
//! [`ToolCaller`]: crate::tools::ToolCaller

mod blocking;
mod directive;
mod engine;
mod prompt;
mod session;

pub use blocking::BlockingConversation;
pub use directive::{scan_directives, ArgumentError, Directive, DIRECTIVE_PREFIX};
pub use engine::{
    render_result_block, ConversationEngine, EngineOptions, DEFAULT_MAX_TOOL_OUTPUT_CHARS,
    DEFAULT_TOOL_TIMEOUT, IDLE_NOTICE, TRUNCATION_MARKER,
};
pub use prompt::{render_prompt, strip_marker, ToolCatalog, END_OF_TURN};
pub use session::{AgentSession, ConversationStats, ConversationTurn, Role, SessionState};
