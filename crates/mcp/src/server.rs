// MCP protocol server: JSON-RPC dispatch for tools/list and tools/call

use crate::protocol::{
    CallToolParams, CallToolResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, JSONRPC_VERSION,
};
use crate::tools::ToolRegistry;
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::Instrument;

pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// Dispatches JSON-RPC requests against an immutable tool registry.
///
/// Holds no per-call state; concurrent requests are independent.
pub struct ProtocolServer {
    registry: ToolRegistry,
    closed: AtomicBool,
}

impl ProtocolServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            closed: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop accepting requests. Calls already in flight run to completion.
    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("MCP protocol server closed");
        }
    }

    /// Validate a decoded JSON body as a JSON-RPC request and dispatch it.
    pub async fn dispatch(&self, body: Value) -> JsonRpcResponse {
        match parse_envelope(body) {
            Ok(request) => self.handle_request(request).await,
            Err(response) => response,
        }
    }

    /// Handle a single well-formed request.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.response_id();

        if self.is_closed() {
            return JsonRpcResponse::error(id, JsonRpcError::server_closed());
        }

        tracing::debug!(method = %request.method, "Dispatching JSON-RPC request");

        let outcome = match request.method.as_str() {
            METHOD_TOOLS_LIST => self.list_tools(),
            METHOD_TOOLS_CALL => self.call_tool(request.params).await,
            other => Err(JsonRpcError::method_not_found(other)),
        };

        match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        }
    }

    fn list_tools(&self) -> Result<Value, JsonRpcError> {
        let result = ListToolsResult {
            tools: self.registry.list_schemas(),
        };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = match params {
            Some(v) => serde_json::from_value(v)
                .map_err(|e| JsonRpcError::invalid_params(format!("Invalid tools/call params: {}", e)))?,
            None => return Err(JsonRpcError::invalid_params("Missing tools/call params")),
        };

        let tool = self
            .registry
            .get(&params.name)
            .ok_or_else(|| JsonRpcError::tool_not_found(&params.name))?;

        let arguments = params
            .arguments
            .unwrap_or_else(|| Value::Object(Default::default()));

        if let Err(detail) = tool.validate_arguments(&arguments) {
            return Err(JsonRpcError::invalid_params(format!(
                "Invalid arguments for tool '{}': {}",
                params.name, detail
            )));
        }

        let span = tracing::info_span!("tools/call", tool = %params.name);
        let started = Instant::now();
        let outcome = AssertUnwindSafe(tool.execute(arguments))
            .catch_unwind()
            .instrument(span)
            .await;

        match outcome {
            Ok(Ok(output)) => {
                tracing::info!(
                    tool = %params.name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Tool call succeeded"
                );
                serde_json::to_value(CallToolResult::from_output(output))
                    .map_err(|e| JsonRpcError::internal_error(e.to_string()))
            }
            Ok(Err(e)) => {
                tracing::warn!(tool = %params.name, "Tool call failed: {:#}", e);
                Err(JsonRpcError::tool_execution_failed(&params.name, format!("{:#}", e)))
            }
            Err(_) => {
                tracing::error!(tool = %params.name, "Tool panicked during execution");
                Err(JsonRpcError::tool_execution_failed(&params.name, "tool panicked"))
            }
        }
    }
}

/// Turn an arbitrary JSON value into a request, or the error response for it.
fn parse_envelope(body: Value) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let mut object = match body {
        Value::Object(object) => object,
        Value::Array(_) => {
            return Err(JsonRpcResponse::error(
                Value::Null,
                JsonRpcError::invalid_request("Batch requests are not supported"),
            ))
        }
        _ => {
            return Err(JsonRpcResponse::error(
                Value::Null,
                JsonRpcError::invalid_request("Request must be a JSON object"),
            ))
        }
    };

    let id = match object.remove("id") {
        None | Some(Value::Null) => None,
        Some(id @ (Value::String(_) | Value::Number(_))) => Some(id),
        Some(_) => {
            return Err(JsonRpcResponse::error(
                Value::Null,
                JsonRpcError::invalid_request("Request id must be a string, number or null"),
            ))
        }
    };
    let reply_id = id.clone().unwrap_or(Value::Null);

    match object.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        Some(other) => {
            return Err(JsonRpcResponse::error(
                reply_id,
                JsonRpcError::invalid_request(format!("Unsupported jsonrpc version: {}", other)),
            ))
        }
        None => {
            return Err(JsonRpcResponse::error(
                reply_id,
                JsonRpcError::invalid_request("Missing jsonrpc version"),
            ))
        }
    }

    let method = match object.remove("method") {
        Some(Value::String(method)) => method,
        _ => {
            return Err(JsonRpcResponse::error(
                reply_id,
                JsonRpcError::invalid_request("Missing or invalid method"),
            ))
        }
    };

    let params = match object.remove("params") {
        None | Some(Value::Null) => None,
        Some(params @ (Value::Object(_) | Value::Array(_))) => Some(params),
        Some(_) => {
            return Err(JsonRpcResponse::error(
                reply_id,
                JsonRpcError::invalid_request("Params must be an object or array"),
            ))
        }
    };

    Ok(JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id,
        method,
        params,
    })
}
