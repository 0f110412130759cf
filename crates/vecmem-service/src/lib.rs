//! Tool server for vecmem.
//!
//! Exposes the memory service over line-delimited JSON-RPC 2.0 on stdio,
//! speaking the tool-call subset of the Model Context Protocol:
//! - `initialize` / `ping`
//! - `tools/list`: `add_text`, `search`, `reset_memory`
//! - `tools/call`: runs a tool and returns its output

pub mod error;
pub mod protocol;
pub mod server;
pub mod tools;

pub use error::ServiceError;
pub use protocol::{Request, RequestId, Response, RpcError};
pub use server::{run_stdio_server, ToolServer, DEFAULT_PROTOCOL_VERSION, SERVER_NAME};
pub use tools::{execute, tool_definitions, ToolCall, ToolDefinition, ToolOutput};
