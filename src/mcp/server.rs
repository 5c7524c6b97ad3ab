//! MCP Server Implementation
//!
//! Line-delimited JSON-RPC over any async reader/writer pair, with stdio as
//! the production transport.

use crate::mcp::errors::{ErrorHandler, McpError};
use crate::mcp::protocol::*;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Connection state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Tool handler trait for implementing tool execution
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult>;
}

struct RegisteredTool {
    definition: Tool,
    handler: Box<dyn ToolHandler>,
}

/// MCP server state and registered tools
pub struct McpServer {
    pub server_info: Implementation,
    pub capabilities: ServerCapabilities,
    tools: RwLock<BTreeMap<String, RegisteredTool>>,
    connection_state: RwLock<ConnectionState>,
}

impl McpServer {
    #[inline]
    pub fn new(name: String, version: String) -> Self {
        Self {
            server_info: Implementation { name, version },
            capabilities: ServerCapabilities {
                logging: Some(LoggingCapability {}),
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
            },
            tools: RwLock::new(BTreeMap::new()),
            connection_state: RwLock::new(ConnectionState::Uninitialized),
        }
    }

    /// Register a tool with the server
    #[inline]
    pub async fn register_tool<H>(&self, definition: Tool, handler: H)
    where
        H: ToolHandler + 'static,
    {
        let name = definition.name.clone();
        self.tools.write().await.insert(
            name.clone(),
            RegisteredTool {
                definition,
                handler: Box::new(handler),
            },
        );
        debug!("Registered tool: {}", name);
    }

    /// Names of registered tools in sorted order
    #[inline]
    pub async fn tool_names(&self) -> Vec<String> {
        self.tools.read().await.keys().cloned().collect()
    }

    #[inline]
    pub async fn connection_state(&self) -> ConnectionState {
        *self.connection_state.read().await
    }

    /// Serve on stdin/stdout until EOF
    #[inline]
    pub async fn serve_stdio(&self) -> Result<()> {
        info!("Starting MCP server with stdio transport");
        let mut stdout = io::stdout();
        self.serve(BufReader::new(io::stdin()), &mut stdout).await
    }

    /// Serve one connection: read line-delimited messages from `reader` and
    /// write responses to `writer` until EOF
    #[inline]
    pub async fn serve<R, W>(&self, mut reader: R, writer: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    info!("EOF reached, closing connection");
                    break;
                }
                Ok(_) => {
                    if let Some(reply) = self.handle_line(&line).await {
                        send_message(writer, &reply).await?;
                    }
                }
                Err(e) => {
                    error!("Error reading from client: {}", e);
                    break;
                }
            }
        }

        *self.connection_state.write().await = ConnectionState::Closed;
        info!("MCP server stopped");
        Ok(())
    }

    /// Process one raw line. Notifications and blank lines produce no reply.
    #[inline]
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcMessage> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let raw: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to parse JSON: {}", e);
                return Some(error_message(JsonRpcError::parse_error(), None));
            }
        };

        let message = match parse_message(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("Invalid JSON-RPC message: {}", e);
                return Some(error_message(JsonRpcError::invalid_request(), None));
            }
        };

        match message {
            JsonRpcMessage::Request(request) => Some(self.handle_request(request).await),
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(&notification).await;
                None
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::ErrorResponse(_) => {
                warn!("Received unexpected response message from client");
                None
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcMessage {
        debug!("Handling request {}", request.method);

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_call_tool(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            _ => {
                return error_message(JsonRpcError::method_not_found(), Some(request.id));
            }
        };

        match result {
            Ok(result) => JsonRpcMessage::Response(JsonRpcResponse::new(result, request.id)),
            Err(e) => ErrorHandler::handle_error(&e, Some(request.id)),
        }
    }

    async fn handle_notification(&self, notification: &JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" | "initialized" => {
                *self.connection_state.write().await = ConnectionState::Ready;
                info!("Server ready to handle requests");
            }
            "notifications/cancelled" => {
                debug!("Received cancellation notification");
            }
            _ => {
                warn!("Unknown notification method: {}", notification.method);
            }
        }
    }

    async fn handle_initialize(&self, params: Option<Value>) -> Result<Value> {
        let params: InitializeParams = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| McpError::InvalidParameters {
                message: e.to_string(),
            })?,
            None => {
                return Err(McpError::InvalidParameters {
                    message: "Initialize request missing parameters".to_string(),
                }
                .into());
            }
        };

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str()) {
            return Err(McpError::UnsupportedProtocolVersion {
                version: params.protocol_version,
                supported: SUPPORTED_PROTOCOL_VERSIONS
                    .iter()
                    .map(|v| (*v).to_string())
                    .collect(),
            }
            .into());
        }

        *self.connection_state.write().await = ConnectionState::Initializing;

        let result = InitializeResult {
            protocol_version: params.protocol_version,
            capabilities: self.capabilities.clone(),
            server_info: self.server_info.clone(),
            instructions: Some(
                "Product recommendations blending content similarity with user behavior"
                    .to_string(),
            ),
        };

        info!("Client initialized: {}", params.client_info.name);
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_list_tools(&self) -> Result<Value> {
        let tools = self.tools.read().await;
        let result = ListToolsResult {
            tools: tools.values().map(|t| t.definition.clone()).collect(),
        };
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value> {
        let params: CallToolParams = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| McpError::InvalidParameters {
                message: e.to_string(),
            })?,
            None => {
                return Err(McpError::InvalidParameters {
                    message: "Tool call request missing parameters".to_string(),
                }
                .into());
            }
        };

        let tools = self.tools.read().await;
        let tool = tools.get(&params.name).ok_or_else(|| McpError::ToolNotFound {
            name: params.name.clone(),
        })?;

        let result = tool.handler.handle(params).await?;
        Ok(serde_json::to_value(result)?)
    }
}

/// Parse a JSON value as a JSON-RPC 2.0 message
fn parse_message(raw: Value) -> Result<JsonRpcMessage, McpError> {
    if raw.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(McpError::InvalidRequest {
            message: "jsonrpc must be \"2.0\"".to_string(),
        });
    }
    if !raw.is_object() || (raw.get("method").is_none() && raw.get("id").is_none()) {
        return Err(McpError::InvalidRequest {
            message: "message has neither method nor id".to_string(),
        });
    }
    Ok(serde_json::from_value(raw)?)
}

fn error_message(error: JsonRpcError, id: Option<RequestId>) -> JsonRpcMessage {
    JsonRpcMessage::ErrorResponse(JsonRpcErrorResponse::new(error, id))
}

async fn send_message<W>(writer: &mut W, message: &JsonRpcMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(message)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
