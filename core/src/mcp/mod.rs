//! Tool server runtime
//!
//! Launches external helper programs and speaks a line-delimited JSON-RPC
//! protocol with them over stdio.
//!
//! Architecture:
//! - `process`: one child process and its framed streams
//! - `registry`: named collection of processes (`ToolServers` trait)
//! - `fake`: deterministic in-memory `ToolServers` for tests and demos
//! - `types`: wire frames and server configuration
pub mod error;
pub mod fake;
pub mod process;
pub mod registry;
pub mod types;

pub use error::{ConfigError, LaunchError, TransportError};
pub use fake::{FakeReply, InMemoryToolServers};
pub use process::{ToolServerProcess, DEFAULT_STOP_GRACE};
pub use registry::{LaunchReport, ToolServerHandle, ToolServerRegistry, ToolServers};
pub use types::{
    JsonRpcRequest, JsonRpcResponse, ServerConfig, ServerSnapshot, ServerStatus, ToolDescriptor,
};
