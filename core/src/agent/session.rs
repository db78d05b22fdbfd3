use serde::{Deserialize, Serialize};

/// Who spoke a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
}

/// One utterance. Position in the history is its only ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No syllabus seeded
    Idle,
    Active,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationStats {
    pub total_turns: usize,
    pub student_turns: usize,
    pub instructor_turns: usize,
    pub topic: String,
    pub tools_enabled: bool,
}

/// State of one learner session.
///
/// The history is the only memory the completion call ever sees.
#[derive(Debug, Clone)]
pub struct AgentSession {
    syllabus: String,
    topic: String,
    history: Vec<ConversationTurn>,
    tools_enabled: bool,
    state: SessionState,
}

impl AgentSession {
    pub fn new(tools_enabled: bool) -> Self {
        Self {
            syllabus: String::new(),
            topic: String::new(),
            history: Vec::new(),
            tools_enabled,
            state: SessionState::Idle,
        }
    }

    /// Start a topic, discarding any previous session
    pub fn seed(&mut self, syllabus: impl Into<String>, topic: impl Into<String>) {
        self.syllabus = syllabus.into();
        self.topic = topic.into();
        self.history.clear();
        self.state = SessionState::Active;
    }

    /// Append a student turn. Blank text and idle sessions are ignored.
    pub fn append_student_turn(&mut self, text: &str) -> bool {
        if self.state == SessionState::Idle || text.trim().is_empty() {
            return false;
        }
        self.history.push(ConversationTurn {
            role: Role::Student,
            text: text.to_string(),
        });
        true
    }

    pub fn append_instructor_turn(&mut self, text: String) {
        self.history.push(ConversationTurn {
            role: Role::Instructor,
            text,
        });
    }

    pub fn reset(&mut self) {
        self.syllabus.clear();
        self.topic.clear();
        self.history.clear();
        self.state = SessionState::Idle;
    }

    pub fn syllabus(&self) -> &str {
        &self.syllabus
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn tools_enabled(&self) -> bool {
        self.tools_enabled
    }

    pub fn set_tools_enabled(&mut self, enabled: bool) {
        self.tools_enabled = enabled;
    }

    pub fn stats(&self) -> ConversationStats {
        let student_turns = self
            .history
            .iter()
            .filter(|t| t.role == Role::Student)
            .count();
        ConversationStats {
            total_turns: self.history.len(),
            student_turns,
            instructor_turns: self.history.len() - student_turns,
            topic: self.topic.clone(),
            tools_enabled: self.tools_enabled,
        }
    }
}
