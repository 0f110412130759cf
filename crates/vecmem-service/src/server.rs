//! Stdio tool server.
//!
//! Reads line-delimited JSON-RPC requests, dispatches them to the memory
//! service and writes one response line per request. Requests are handled
//! one at a time; store calls run on the blocking pool.
//!
//! stdout carries protocol frames only. Logging must go to stderr.

use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use vecmem_store::MemoryService;

use crate::error::ServiceError;
use crate::protocol::{Request, RequestId, Response, RpcError, JSONRPC_VERSION};
use crate::tools::{execute, tool_definitions, ToolCall};

/// Protocol revision announced when the client does not request one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name announced in `initialize`
pub const SERVER_NAME: &str = "vecmem";

/// JSON-RPC front end for a [`MemoryService`].
pub struct ToolServer {
    service: Arc<MemoryService>,
    default_top_k: usize,
}

impl ToolServer {
    pub fn new(service: Arc<MemoryService>, default_top_k: usize) -> Self {
        Self {
            service,
            default_top_k,
        }
    }

    /// Serve until the reader reaches EOF.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<(), ServiceError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.serve_with_shutdown(reader, writer, std::future::pending())
            .await
    }

    /// Serve until EOF or until `shutdown` resolves.
    pub async fn serve_with_shutdown<R, W, F>(
        &self,
        mut reader: R,
        mut writer: W,
        shutdown: F,
    ) -> Result<(), ServiceError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = tokio::select! {
                read = reader.read_until(b'\n', &mut buf) => read?,
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping tool server");
                    break;
                }
            };
            if read == 0 {
                info!("Input closed, stopping tool server");
                break;
            }

            let response = match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => self.handle_line(line.trim()).await,
                Err(e) => {
                    warn!(error = %e, "Message is not valid UTF-8");
                    Some(Response::failure(None, RpcError::parse_error(e)))
                }
            };

            if let Some(response) = response {
                let mut frame = serde_json::to_vec(&response)?;
                frame.push(b'\n');
                writer.write_all(&frame).await?;
                writer.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle one raw message. Returns `None` for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<Response> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Unparseable message");
                return Some(Response::failure(None, RpcError::parse_error(e)));
            }
        };

        let request: Request = match serde_json::from_value(value.clone()) {
            Ok(request) => request,
            Err(e) => {
                let id = value
                    .get("id")
                    .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());
                return Some(Response::failure(id, RpcError::invalid_request(e)));
            }
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(Response::failure(
                request.id,
                RpcError::invalid_request(format!(
                    "unsupported jsonrpc version {:?}",
                    request.jsonrpc
                )),
            ));
        }

        if request.is_notification() {
            debug!(method = %request.method, "Notification received");
            return None;
        }

        let id = request.id.clone();
        let result = self.dispatch(request).await;
        Some(Response::from_result(id, result))
    }

    async fn dispatch(&self, request: Request) -> Result<Value, RpcError> {
        debug!(method = %request.method, "Request received");
        let params = request.params.unwrap_or(Value::Null);

        match request.method.as_str() {
            "initialize" => Ok(self.initialize(&params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": tool_definitions(self.default_top_k) })),
            "tools/call" => self.call_tool(params).await,
            other => Err(RpcError::method_not_found(other)),
        }
    }

    fn initialize(&self, params: &Value) -> Value {
        let protocol_version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROTOCOL_VERSION);

        info!(protocol_version, "Client initialized");
        json!({
            "protocolVersion": protocol_version,
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": { "tools": {} },
        })
    }

    async fn call_tool(&self, params: Value) -> Result<Value, RpcError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("missing tool name"))?;
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
        let call = ToolCall::parse(name, arguments, self.default_top_k)?;

        let service = Arc::clone(&self.service);
        let output = tokio::task::spawn_blocking(move || execute(&service, call))
            .await
            .map_err(RpcError::internal)?
            .map_err(RpcError::internal)?;

        Ok(output.into_call_result())
    }
}

/// Serve the tool protocol on this process's stdin and stdout.
pub async fn run_stdio_server<F>(
    service: Arc<MemoryService>,
    default_top_k: usize,
    shutdown: F,
) -> Result<(), ServiceError>
where
    F: Future<Output = ()>,
{
    info!("Starting stdio tool server");
    let server = ToolServer::new(service, default_top_k);
    server
        .serve_with_shutdown(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), shutdown)
        .await
}
