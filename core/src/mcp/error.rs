use std::time::Duration;
use thiserror::Error;

/// A tool server process could not be spawned. Fatal for that server only.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Executable not found: {command}")]
    NotFound { command: String },

    #[error("Invalid command for server {id}: command is empty")]
    InvalidCommand { id: String },

    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to capture {0} of child process")]
    MissingStdio(&'static str),
}

impl LaunchError {
    pub(crate) fn from_spawn(command: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            LaunchError::NotFound {
                command: command.to_string(),
            }
        } else {
            LaunchError::Spawn {
                command: command.to_string(),
                source,
            }
        }
    }
}

/// Failures of one request/response exchange after launch
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server not running: {0}")]
    NotRunning(String),
}

impl TransportError {
    pub fn code(&self) -> &'static str {
        match self {
            TransportError::Io(_) => "IO_ERROR",
            TransportError::Timeout(_) => "TIMEOUT",
            TransportError::Protocol(_) => "PROTOCOL_ERROR",
            TransportError::NotRunning(_) => "NOT_RUNNING",
        }
    }

    /// Broken stream or garbled frame: the server can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Io(_) | TransportError::Protocol(_))
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e.to_string())
    }
}

/// Configuration errors abort startup instead of degrading
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Duplicate tool server id: {0}")]
    DuplicateServerId(String),
}
