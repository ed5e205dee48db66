//! MCP Error Handling
//!
//! Errors raised while dispatching a request, with their JSON-RPC codes.

use crate::mcp::protocol::{JsonRpcError, SUPPORTED_PROTOCOL_VERSIONS, codes};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum McpError {
    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    #[error(
        "Unsupported protocol version: {version}. Supported: {supported}",
        supported = SUPPORTED_PROTOCOL_VERSIONS.join(", ")
    )]
    UnsupportedProtocolVersion { version: String },

    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("Missing parameters for {method}")]
    MissingParameters { method: String },

    #[error("Invalid parameters: {message}")]
    InvalidParameters { message: String },
}

impl McpError {
    #[inline]
    pub const fn code(&self) -> i32 {
        match self {
            Self::MethodNotFound { .. } => codes::METHOD_NOT_FOUND,
            Self::UnsupportedProtocolVersion { .. } => codes::UNSUPPORTED_PROTOCOL_VERSION,
            Self::ToolNotFound { .. } => codes::TOOL_NOT_FOUND,
            Self::MissingParameters { .. } | Self::InvalidParameters { .. } => {
                codes::INVALID_PARAMS
            }
        }
    }

    /// Map any handler error onto a JSON-RPC error; anything that is not an
    /// `McpError` is an internal error
    #[inline]
    pub fn classify(error: &anyhow::Error) -> JsonRpcError {
        match error.downcast_ref::<Self>() {
            Some(mcp) => JsonRpcError::new(mcp.code(), mcp.to_string()),
            None => JsonRpcError::new(codes::INTERNAL_ERROR, error.to_string()),
        }
    }
}
