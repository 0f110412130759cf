//! Tool catalogue and dispatch.
//!
//! Three tools are exposed: `add_text`, `search` and `reset_memory`. Tool
//! results carry the operation output both as JSON text content and as
//! `structuredContent`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use vecmem_store::{MemoryService, StoreError};

use crate::protocol::RpcError;

pub const ADD_TEXT: &str = "add_text";
pub const SEARCH: &str = "search";
pub const RESET_MEMORY: &str = "reset_memory";

/// Entry in the `tools/list` response.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Tools offered by the server, in listing order.
pub fn tool_definitions(default_top_k: usize) -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: ADD_TEXT,
            description: "Save text into vector memory",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "Text to remember"}
                },
                "required": ["text"]
            }),
        },
        ToolDefinition {
            name: SEARCH,
            description: "search through memory",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Text to search for"},
                    "top_k": {
                        "type": "integer",
                        "minimum": 0,
                        "default": default_top_k,
                        "description": "Maximum number of matches"
                    }
                },
                "required": ["query"]
            }),
        },
        ToolDefinition {
            name: RESET_MEMORY,
            description: "Clear vector index and database",
            input_schema: json!({"type": "object", "properties": {}}),
        },
    ]
}

#[derive(Debug, Deserialize)]
struct AddTextArgs {
    text: String,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

/// A validated tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    AddText { text: String },
    Search { query: String, top_k: usize },
    ResetMemory,
}

impl ToolCall {
    /// Validate a `tools/call` name and its arguments.
    pub fn parse(name: &str, arguments: Value, default_top_k: usize) -> Result<Self, RpcError> {
        // Missing arguments behave like an empty object
        let arguments = if arguments.is_null() {
            json!({})
        } else {
            arguments
        };

        match name {
            ADD_TEXT => {
                let args: AddTextArgs =
                    serde_json::from_value(arguments).map_err(RpcError::invalid_params)?;
                Ok(ToolCall::AddText { text: args.text })
            }
            SEARCH => {
                let args: SearchArgs =
                    serde_json::from_value(arguments).map_err(RpcError::invalid_params)?;
                Ok(ToolCall::Search {
                    query: args.query,
                    top_k: args.top_k.unwrap_or(default_top_k),
                })
            }
            RESET_MEMORY => Ok(ToolCall::ResetMemory),
            other => Err(RpcError::invalid_params(format!("Unknown tool: {other}"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::AddText { .. } => ADD_TEXT,
            ToolCall::Search { .. } => SEARCH,
            ToolCall::ResetMemory => RESET_MEMORY,
        }
    }
}

/// Result of running a tool, before it is wrapped for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub structured: Value,
    pub is_error: bool,
}

impl ToolOutput {
    /// `tools/call` result body.
    pub fn into_call_result(self) -> Value {
        let text = self.structured.to_string();
        json!({
            "content": [{"type": "text", "text": text}],
            "structuredContent": self.structured,
            "isError": self.is_error,
        })
    }
}

/// Run a tool against the service. Blocking.
pub fn execute(service: &MemoryService, call: ToolCall) -> Result<ToolOutput, StoreError> {
    debug!(tool = call.name(), "Executing tool");

    let output = match call {
        ToolCall::AddText { text } => {
            let result = service.add_text(&text);
            ToolOutput {
                is_error: !result.ok,
                structured: serde_json::to_value(result)?,
            }
        }
        ToolCall::Search { query, top_k } => ToolOutput {
            structured: serde_json::to_value(service.search(&query, top_k)?)?,
            is_error: false,
        },
        ToolCall::ResetMemory => {
            let result = service.reset_memory();
            ToolOutput {
                is_error: !result.ok,
                structured: serde_json::to_value(result)?,
            }
        }
    };
    Ok(output)
}
