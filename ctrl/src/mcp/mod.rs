//! MCP (Model Context Protocol) gateway core
//!
//! JSON-RPC 2.0 codec, session lifecycle, tool registry and the device tool
//! catalogue. The HTTP transports live in [`crate::api`].

pub mod args;
pub mod channels;
pub mod content;
pub mod handler;
pub mod jsonrpc;
pub mod session;
pub mod tools;

pub use channels::{SseChannels, SseEvent};
pub use content::{CallToolResult, ContentBlock};
pub use handler::{CallContext, McpHandler, McpReply};
pub use jsonrpc::{Envelope, JsonRpcResponse, RpcError};
pub use session::{SessionManager, SessionRef};
pub use tools::{register_device_tools, McpTool, ToolContext, ToolError, ToolRegistry};
