//! MCP Error Handling
//!
//! Protocol failures become JSON-RPC error responses. Recommender failures
//! inside a tool call become tool results flagged with `isError`, carrying a
//! machine-readable kind.

use crate::RecError;
use crate::mcp::protocol::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Errors that end a request with a JSON-RPC error response
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Protocol version not supported: {version}. Supported versions: {supported:?}")]
    UnsupportedProtocolVersion {
        version: String,
        supported: Vec<String>,
    },

    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("Invalid tool parameters for {tool}: {message}")]
    InvalidToolParameters { tool: String, message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Internal server error: {message}")]
    InternalError { message: String },

    #[error("JSON-RPC parse error: {message}")]
    ParseError { message: String },

    #[error("Invalid parameters: {message}")]
    InvalidParameters { message: String },
}

impl McpError {
    #[inline]
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        match self {
            Self::UnsupportedProtocolVersion { version, supported } => JsonRpcError::new(
                mcp_error_codes::INVALID_PROTOCOL_VERSION,
                format!(
                    "Unsupported protocol version: {}. Supported: {}",
                    version,
                    supported.join(", ")
                ),
                None,
            ),
            Self::ToolNotFound { name } => JsonRpcError::new(
                mcp_error_codes::TOOL_NOT_FOUND,
                format!("Tool not found: {}", name),
                None,
            ),
            Self::InvalidToolParameters { tool, message } => JsonRpcError::new(
                error_codes::INVALID_PARAMS,
                format!("Invalid parameters for tool '{}': {}", tool, message),
                None,
            ),
            Self::InvalidRequest { message } => {
                JsonRpcError::new(error_codes::INVALID_REQUEST, message.clone(), None)
            }
            Self::InternalError { message } => {
                JsonRpcError::new(error_codes::INTERNAL_ERROR, message.clone(), None)
            }
            Self::ParseError { message } => {
                JsonRpcError::new(error_codes::PARSE_ERROR, message.clone(), None)
            }
            Self::InvalidParameters { message } => {
                JsonRpcError::new(error_codes::INVALID_PARAMS, message.clone(), None)
            }
        }
    }

    #[inline]
    pub fn to_error_response(&self, id: Option<RequestId>) -> JsonRpcMessage {
        JsonRpcMessage::ErrorResponse(JsonRpcErrorResponse::new(self.to_jsonrpc_error(), id))
    }

    #[inline]
    pub fn log(&self) {
        match self {
            Self::ParseError { .. }
            | Self::InvalidRequest { .. }
            | Self::InvalidParameters { .. }
            | Self::InvalidToolParameters { .. } => {
                warn!("Client error: {}", self);
            }
            Self::ToolNotFound { .. } => {
                warn!("Not found error: {}", self);
            }
            _ => {
                error!("MCP error: {}", self);
            }
        }
    }
}

/// Error handler utility for consistent error processing
pub struct ErrorHandler;

impl ErrorHandler {
    /// Convert any handler error into a JSON-RPC error response
    #[inline]
    pub fn handle_error(error: &anyhow::Error, id: Option<RequestId>) -> JsonRpcMessage {
        if let Some(mcp_error) = error.downcast_ref::<McpError>() {
            mcp_error.log();
            return mcp_error.to_error_response(id);
        }

        error!("Unexpected error: {:#}", error);
        McpError::InternalError {
            message: format!("{:#}", error),
        }
        .to_error_response(id)
    }
}

impl From<serde_json::Error> for McpError {
    #[inline]
    fn from(error: serde_json::Error) -> Self {
        Self::ParseError {
            message: error.to_string(),
        }
    }
}

/// Machine-readable name of a recommender failure
#[inline]
pub fn error_kind(error: &RecError) -> &'static str {
    match error {
        RecError::UnknownUser(_) => "unknown_user",
        RecError::InvalidParameter(_) => "invalid_parameter",
        RecError::ProductNotFound(_) => "product_not_found",
        RecError::EmbeddingDimensionMismatch { .. } => "embedding_dimension_mismatch",
        RecError::InvalidEmbedding { .. } => "invalid_embedding",
        RecError::ExplanationUnavailable(_) => "explanation_unavailable",
        RecError::Config(_) => "config",
        RecError::Database(_) => "database",
        RecError::Network(_) => "network",
        RecError::Embedding(_) => "embedding",
        RecError::Io(_) => "io",
        RecError::Other(_) => "internal",
    }
}

#[derive(Debug, Serialize)]
struct ToolErrorBody<'a> {
    error: ToolErrorDetail<'a>,
}

#[derive(Debug, Serialize)]
struct ToolErrorDetail<'a> {
    kind: &'static str,
    message: String,
    client_error: bool,
    tool: &'a str,
}

/// Tool result reporting a recommender failure
#[inline]
pub fn tool_error_result(tool: &str, error: &RecError) -> CallToolResult {
    if error.is_client_error() {
        warn!("Tool {} rejected request: {}", tool, error);
    } else {
        error!("Tool {} failed: {}", tool, error);
    }

    let body = ToolErrorBody {
        error: ToolErrorDetail {
            kind: error_kind(error),
            message: error.to_string(),
            client_error: error.is_client_error(),
            tool,
        },
    };

    CallToolResult::error_json(&body).unwrap_or_else(|_| CallToolResult {
        content: vec![ToolContent::Text {
            text: error.to_string(),
        }],
        is_error: Some(true),
    })
}
