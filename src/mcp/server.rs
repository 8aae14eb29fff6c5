//! MCP server implementation
//!
//! Serves the registered tools over newline-delimited JSON-RPC on stdio.
//! Requests are handled one at a time; progress notifications produced
//! while a tool runs are written as they arrive, before its response.

use crate::mcp::protocol::*;
use crate::pipeline::{Arguments, CallContext, ProgressUpdate, RequestContext};
use crate::tools::ToolRegistry;
use crate::types::ToolError;
use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

const PROGRESS_TOKEN_KEY: &str = "progressToken";

pub struct McpServer {
    registry: Arc<ToolRegistry>,
    info: ServerInfo,
    instructions: Option<String>,
    initialized: Mutex<bool>,
}

impl McpServer {
    pub fn new(registry: ToolRegistry, name: impl Into<String>) -> Self {
        Self {
            registry: Arc::new(registry),
            info: ServerInfo {
                name: name.into(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: None,
            initialized: Mutex::new(false),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Serve on stdin/stdout until the client closes the connection.
    pub async fn run(&self) -> Result<()> {
        info!("MCP server starting on stdio");
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            debug!("Received request: {}", line);

            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
            let handler = self.handle_request(line, progress_tx);
            tokio::pin!(handler);

            let response = loop {
                tokio::select! {
                    response = &mut handler => break response,
                    Some(update) = progress_rx.recv() => {
                        write_message(&mut writer, &progress_notification(update)).await?;
                    }
                }
            };
            while let Ok(update) = progress_rx.try_recv() {
                write_message(&mut writer, &progress_notification(update)).await?;
            }

            if let Some(response) = response {
                write_message(&mut writer, &response).await?;
                debug!("Sent response");
            }
        }

        info!("Client closed connection");
        Ok(())
    }

    /// Handle one raw message. Notifications produce no response.
    pub async fn handle_request(
        &self,
        content: &str,
        progress: mpsc::UnboundedSender<ProgressUpdate>,
    ) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(content) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    JsonRpcError::new(PARSE_ERROR, format!("Parse error: {}", e)),
                ));
            }
        };

        let Some(id) = request.id.clone() else {
            debug!("Received notification: {}", request.method);
            return None;
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::failure(
                id,
                JsonRpcError::new(INVALID_REQUEST, "Only JSON-RPC 2.0 is supported"),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(id.clone(), request.params, progress).await,
            _ => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            )),
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        })
    }

    async fn handle_initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = serde_json::from_value(params.unwrap_or_else(|| json!({})))
            .map_err(|e| {
                JsonRpcError::new(INVALID_PARAMS, format!("Invalid initialize params: {}", e))
            })?;

        if let Some(client) = &params.client_info {
            info!(
                "Client connected: {} {}",
                client.name,
                client.version.as_deref().unwrap_or("")
            );
        }

        *self.initialized.lock().await = true;

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                logging: None,
                tools: Some(json!({})),
            },
            server_info: self.info.clone(),
            instructions: self.instructions.clone(),
        };

        to_result(&result)
    }

    fn handle_list_tools(&self) -> Result<Value, JsonRpcError> {
        let tools = self
            .registry
            .tools()
            .iter()
            .map(ToolDefinition::from)
            .collect();

        to_result(&ListToolsResult { tools })
    }

    async fn handle_call_tool(
        &self,
        request_id: Value,
        params: Option<Value>,
        progress: mpsc::UnboundedSender<ProgressUpdate>,
    ) -> Result<Value, JsonRpcError> {
        if !*self.initialized.lock().await {
            return Err(JsonRpcError::new(INTERNAL_ERROR, "Server not initialized"));
        }

        let params: CallToolParams = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|e| {
                JsonRpcError::new(INVALID_PARAMS, format!("Invalid tool call params: {}", e))
            })?;

        let Some(tool) = self.registry.get(&params.name) else {
            warn!("Call to unknown tool: {}", params.name);
            return Err(JsonRpcError::new(
                INVALID_PARAMS,
                ToolError::UnknownTool(params.name.clone()).to_string(),
            ));
        };

        let meta = params.meta.unwrap_or_default();
        let wants_progress = meta.contains_key(PROGRESS_TOKEN_KEY);
        let mut request = RequestContext::new(Some(request_id), meta);
        if wants_progress {
            request = request.with_progress(progress);
        }

        let args = Arguments::from(params.arguments.unwrap_or_default());
        let result = match tool.call(CallContext::with_request(request), args).await {
            Ok(value) => CallToolResult::text(render(&value)),
            Err(e) => CallToolResult::error(format!("Error executing tool {}: {}", params.name, e)),
        };

        to_result(&result)
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn progress_notification(update: ProgressUpdate) -> JsonRpcNotification {
    JsonRpcNotification {
        jsonrpc: JSONRPC_VERSION.to_string(),
        method: "notifications/progress".to_string(),
        params: serde_json::to_value(ProgressParams::from(update)).unwrap_or(Value::Null),
    }
}

fn to_result<T: Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| {
        JsonRpcError::new(INTERNAL_ERROR, format!("Failed to serialize result: {}", e))
    })
}

async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_system::{LogLevel, UnifiedLogger};
    use crate::pipeline::{InvocationConfig, Pipeline};
    use crate::tools::register_example_tools;

    fn server() -> (UnifiedLogger, McpServer) {
        let logger = UnifiedLogger::new(Vec::new(), LogLevel::Debug);
        let pipeline = Pipeline::new(logger.clone(), InvocationConfig::default());
        let mut registry = ToolRegistry::new();
        register_example_tools(&mut registry, &pipeline).unwrap();
        (logger, McpServer::new(registry, "test-server"))
    }

    async fn exchange(server: &McpServer, input: &str) -> Vec<Value> {
        let mut output = Vec::new();
        server.serve(input.as_bytes(), &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    const INIT: &str =
        r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"test","version":"1"}}}"#;

    #[tokio::test]
    async fn test_initialize_and_list() {
        let (logger, server) = server();
        let input = format!(
            "{}\n{}\n{}\n",
            INIT,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#
        );
        let responses = exchange(&server, &input).await;
        logger.close().await.unwrap();

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], "test-server");
        assert_eq!(responses[0]["result"]["protocolVersion"], PROTOCOL_VERSION);

        let tools = responses[1]["result"]["tools"].as_array().unwrap();
        let batch = tools
            .iter()
            .find(|t| t["name"] == "process_batch_data")
            .unwrap();
        assert_eq!(batch["inputSchema"]["required"], json!(["kwargs_list"]));
        let echo = tools.iter().find(|t| t["name"] == "echo").unwrap();
        assert_eq!(echo["inputSchema"]["properties"]["message"]["type"], "string");
    }

    #[tokio::test]
    async fn test_tool_errors_are_results_unknown_tools_are_errors() {
        let (logger, server) = server();
        let input = format!(
            "{}\n{}\n{}\n{}\n",
            INIT,
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"echo","arguments":{"message":"hi"}}}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"calculate_fibonacci","arguments":{"n":"-3"}}}"#,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"nope","arguments":{}}}"#
        );
        let responses = exchange(&server, &input).await;
        logger.close().await.unwrap();

        assert_eq!(responses[1]["result"]["content"][0]["text"], "Echo: hi");
        assert!(responses[1]["result"].get("isError").is_none());

        assert_eq!(responses[2]["result"]["isError"], true);
        assert!(responses[2]["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("n must be non-negative"));

        assert_eq!(responses[3]["error"]["code"], INVALID_PARAMS);
        assert_eq!(responses[3]["error"]["message"], "Unknown tool: nope");
    }

    #[tokio::test]
    async fn test_call_before_initialize_is_rejected() {
        let (logger, server) = server();
        let responses = exchange(
            &server,
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"echo","arguments":{"message":"hi"}}}"#,
        )
        .await;
        logger.close().await.unwrap();

        assert_eq!(responses[0]["error"]["message"], "Server not initialized");
    }

    #[tokio::test]
    async fn test_parse_error_and_unknown_method() {
        let (logger, server) = server();
        let responses = exchange(
            &server,
            "not json\n{\"jsonrpc\":\"2.0\",\"id\":9,\"method\":\"resources/list\"}\n",
        )
        .await;
        logger.close().await.unwrap();

        assert_eq!(responses[0]["error"]["code"], PARSE_ERROR);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[1]["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(responses[1]["id"], 9);
    }

    #[tokio::test]
    async fn test_batch_progress_precedes_response() {
        let (logger, server) = server();
        let input = format!(
            "{}\n{}\n",
            INIT,
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"process_batch_data","arguments":{"kwargs_list":[{"items":["a"]},{"items":["b"],"operation":"reverse"}]},"_meta":{"progressToken":"p1"}}}"#
        );
        let messages = exchange(&server, &input).await;
        logger.close().await.unwrap();

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1]["method"], "notifications/progress");
        assert_eq!(messages[1]["params"]["progressToken"], "p1");
        assert_eq!(messages[2]["params"]["progress"], 2.0);
        assert_eq!(messages[3]["id"], 5);

        let text = messages[3]["result"]["content"][0]["text"].as_str().unwrap();
        let results: Value = serde_json::from_str(text).unwrap();
        assert_eq!(results[0]["processed"], json!(["A"]));
        assert_eq!(results[1]["processed"], json!(["b"]));
    }
}
