//! MCP Server Implementation
//!
//! Reads one JSON-RPC message per line from any async reader and writes at
//! most one reply line per message. Requests are answered in arrival order.

use crate::mcp::errors::McpError;
use crate::mcp::protocol::{
    CallToolParams, CallToolResult, Envelope, Implementation, Inbound, InitializeParams,
    InitializeResult, JsonRpcError, ListToolsResult, Reply, SUPPORTED_PROTOCOL_VERSIONS,
    ServerCapabilities, Tool, ToolsCapability,
};
use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult>;
}

pub struct RegisteredTool {
    pub definition: Tool,
    handler: Box<dyn ToolHandler>,
}

pub struct McpServer {
    pub server_info: Implementation,
    /// Keyed by name, so `tools/list` comes out sorted
    pub tools: RwLock<BTreeMap<String, RegisteredTool>>,
    state: RwLock<ConnectionState>,
    instructions: Option<String>,
}

impl McpServer {
    #[inline]
    pub fn new(name: String, version: String) -> Self {
        Self {
            server_info: Implementation { name, version },
            tools: RwLock::new(BTreeMap::new()),
            state: RwLock::new(ConnectionState::Uninitialized),
            instructions: None,
        }
    }

    /// Text returned to the client from `initialize`
    #[inline]
    #[must_use]
    pub fn with_instructions(mut self, instructions: String) -> Self {
        self.instructions = Some(instructions);
        self
    }

    /// Register a tool; a later registration under the same name replaces it
    #[inline]
    pub async fn register_tool<H>(&self, definition: Tool, handler: H)
    where
        H: ToolHandler + 'static,
    {
        debug!("Registered tool: {}", definition.name);
        self.tools.write().await.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                handler: Box::new(handler),
            },
        );
    }

    #[inline]
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }

    #[inline]
    pub async fn serve_stdio(self: Arc<Self>) -> Result<()> {
        info!("Starting MCP server with stdio transport");
        self.serve(BufReader::new(io::stdin()), io::stdout()).await
    }

    /// Serve until `reader` reaches EOF or fails. Only write failures are
    /// returned as errors.
    #[inline]
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let handler = MessageHandler::new(Arc::clone(&self));
        let mut lines = reader.lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("EOF reached, closing connection");
                    break;
                }
                Err(e) => {
                    error!("Failed to read from client: {}", e);
                    break;
                }
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(reply) = handler.respond(line).await {
                write_reply(&mut writer, &reply).await?;
            }
        }

        self.set_state(ConnectionState::Closed).await;
        info!("MCP server stopped");
        Ok(())
    }
}

async fn write_reply<W>(writer: &mut W, reply: &Reply) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = serde_json::to_vec(reply)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

fn parse_params<T: DeserializeOwned>(method: &str, params: Option<Value>) -> Result<T, McpError> {
    let params = params.ok_or_else(|| McpError::MissingParameters {
        method: method.to_string(),
    })?;
    serde_json::from_value(params).map_err(|e| McpError::InvalidParameters {
        message: e.to_string(),
    })
}

/// Turns inbound lines into replies for one server
pub struct MessageHandler {
    server: Arc<McpServer>,
}

impl MessageHandler {
    #[inline]
    pub const fn new(server: Arc<McpServer>) -> Self {
        Self { server }
    }

    /// Answer one line. `None` means nothing is written back, which is the
    /// case for notifications and for replies sent by the client.
    #[inline]
    pub async fn respond(&self, line: &str) -> Option<Reply> {
        let envelope: Envelope = match serde_json::from_str(line) {
            Ok(envelope) => envelope,
            Err(e) if e.is_data() => {
                warn!("Rejecting malformed JSON-RPC message: {}", e);
                return Some(Reply::failure(None, JsonRpcError::invalid_request()));
            }
            Err(e) => {
                error!("Failed to parse JSON: {}", e);
                return Some(Reply::failure(None, JsonRpcError::parse_error()));
            }
        };

        match envelope.classify() {
            Some(Inbound::Request { id, method, params }) => {
                let reply = match self.dispatch(&method, params).await {
                    Ok(result) => Reply::success(id, result),
                    Err(e) => {
                        warn!("Request {} failed: {:#}", method, e);
                        Reply::failure(Some(id), McpError::classify(&e))
                    }
                };
                Some(reply)
            }
            Some(Inbound::Notification { method }) => {
                self.notify(&method).await;
                None
            }
            Some(Inbound::Reply) => {
                warn!("Ignoring response message from client");
                None
            }
            None => {
                warn!("Rejecting message that is not JSON-RPC 2.0");
                Some(Reply::failure(None, JsonRpcError::invalid_request()))
            }
        }
    }

    /// Run a request method and produce its `result`
    #[inline]
    pub async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value> {
        match method {
            "initialize" => self.handle_initialize(params).await,
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_call_tool(params).await,
            "ping" => Ok(json!({})),
            _ => Err(McpError::MethodNotFound {
                method: method.to_string(),
            }
            .into()),
        }
    }

    async fn notify(&self, method: &str) {
        match method {
            "initialized" | "notifications/initialized" => {
                self.server.set_state(ConnectionState::Ready).await;
                info!("Server ready to handle requests");
            }
            // requests are answered in order, so nothing is ever in flight here
            "notifications/cancelled" => debug!("Received cancellation notification"),
            _ => warn!("Unknown notification method: {}", method),
        }
    }

    #[inline]
    pub async fn handle_initialize(&self, params: Option<Value>) -> Result<Value> {
        let params: InitializeParams = parse_params("initialize", params)?;
        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str()) {
            return Err(McpError::UnsupportedProtocolVersion {
                version: params.protocol_version,
            }
            .into());
        }

        self.server.set_state(ConnectionState::Initializing).await;
        info!(
            "Client {} {} initialized with protocol {}",
            params.client_info.name, params.client_info.version, params.protocol_version
        );

        let result = InitializeResult {
            protocol_version: params.protocol_version,
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
            },
            server_info: self.server.server_info.clone(),
            instructions: self.server.instructions.clone(),
        };
        Ok(serde_json::to_value(result)?)
    }

    #[inline]
    pub async fn handle_list_tools(&self) -> Result<Value> {
        let tools = self
            .server
            .tools
            .read()
            .await
            .values()
            .map(|tool| tool.definition.clone())
            .collect();
        Ok(serde_json::to_value(ListToolsResult { tools })?)
    }

    #[inline]
    pub async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value> {
        let params: CallToolParams = parse_params("tools/call", params)?;

        let tools = self.server.tools.read().await;
        let tool = tools.get(&params.name).ok_or_else(|| McpError::ToolNotFound {
            name: params.name.clone(),
        })?;

        debug!("Calling tool {}", params.name);
        let result = tool.handler.handle(params).await?;
        Ok(serde_json::to_value(result)?)
    }
}
