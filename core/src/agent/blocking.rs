// Synchronous wrapper over ConversationEngine for callers without a runtime
use std::future::Future;

use tokio::runtime::{Builder, Runtime};

use super::engine::ConversationEngine;
use super::session::{ConversationStats, ConversationTurn, SessionState};

/// Owns one current-thread runtime and drives the engine on it.
///
/// Must not be used from inside another tokio runtime; `block_on` panics there.
pub struct BlockingConversation {
    runtime: Runtime,
    engine: ConversationEngine,
}

impl BlockingConversation {
    pub fn new(engine: ConversationEngine) -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { runtime, engine })
    }

    pub fn seed(&mut self, syllabus: impl Into<String>, topic: impl Into<String>) {
        self.engine.seed(syllabus, topic);
    }

    pub fn submit_student_turn(&mut self, text: &str) {
        self.engine.submit_student_turn(text);
    }

    pub fn produce_instructor_turn(&mut self) -> String {
        self.runtime.block_on(self.engine.produce_instructor_turn())
    }

    pub fn reset(&mut self) {
        self.engine.reset();
    }

    pub fn set_tools_enabled(&mut self, enabled: bool) {
        self.engine.set_tools_enabled(enabled);
    }

    pub fn history(&self) -> &[ConversationTurn] {
        self.engine.history()
    }

    pub fn state(&self) -> SessionState {
        self.engine.state()
    }

    pub fn stats(&self) -> ConversationStats {
        self.engine.stats()
    }

    /// Run any other future (server startup, shutdown) on the owned runtime
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    pub fn engine(&self) -> &ConversationEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ConversationEngine {
        &mut self.engine
    }

    pub fn into_engine(self) -> ConversationEngine {
        self.engine
    }
}
