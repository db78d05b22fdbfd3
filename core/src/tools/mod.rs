pub mod invoker;
pub mod result;

// Re-export common types
pub use invoker::{InvocationStats, ToolCaller, ToolInvoker};
pub use result::{render_payload, ToolCallResult};
