//! MCP (Model Context Protocol) Server Implementation
//!
//! Exposes the ticket retrieval engine to AI agents as JSON-RPC 2.0 tools
//! over stdio, following MCP protocol version 2025-06-18.

#[cfg(test)]
mod tests;

pub mod errors;
pub mod protocol;
pub mod server;
pub mod tools;

pub use errors::McpError;
pub use protocol::{CallToolParams, CallToolResult, Tool, ToolContent};
pub use server::{ConnectionState, McpServer, ToolHandler};
