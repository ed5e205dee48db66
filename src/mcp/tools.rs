//! MCP Tools Implementation
//!
//! Tool definitions and handlers exposing the retrieval engine to MCP clients.

use crate::engine::Engine;
use crate::filter::PredicateSet;
use crate::mcp::errors::McpError;
use crate::mcp::protocol::*;
use crate::mcp::server::{McpServer, ToolHandler};
use crate::records::{TicketPreview, parse_timestamp};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Free-text query routed through intent parsing
pub struct SearchTicketsHandler {
    engine: Arc<Engine>,
}

/// Similarity search with an explicit result count
pub struct SemanticSearchHandler {
    engine: Arc<Engine>,
}

/// Structured filtering with caller-supplied predicates
pub struct FilterTicketsHandler {
    engine: Arc<Engine>,
}

/// Every ticket in the loaded snapshot
pub struct ListTicketsHandler {
    engine: Arc<Engine>,
}

/// Register every ticket tool on `server`
#[inline]
pub async fn register_ticket_tools(server: &McpServer, engine: &Arc<Engine>) {
    server
        .register_tool(
            SearchTicketsHandler::tool_definition(),
            SearchTicketsHandler::new(Arc::clone(engine)),
        )
        .await;
    server
        .register_tool(
            SemanticSearchHandler::tool_definition(),
            SemanticSearchHandler::new(Arc::clone(engine)),
        )
        .await;
    server
        .register_tool(
            FilterTicketsHandler::tool_definition(),
            FilterTicketsHandler::new(Arc::clone(engine)),
        )
        .await;
    server
        .register_tool(
            ListTicketsHandler::tool_definition(),
            ListTicketsHandler::new(Arc::clone(engine)),
        )
        .await;
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult> {
    Ok(CallToolResult::text(serde_json::to_string_pretty(value)?))
}

fn required_str<'a>(args: &'a HashMap<String, Value>, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            McpError::InvalidParameters {
                message: format!("Missing required parameter: {}", key),
            }
            .into()
        })
}

fn optional_str<'a>(args: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

impl SearchTicketsHandler {
    #[inline]
    pub const fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "search_tickets".to_string(),
            description: Some(
                "Search support tickets. Queries naming a category, priority, status or \
                 'last N days' are filtered exactly; anything else uses semantic search."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Free-text search query"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for SearchTicketsHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let query = required_str(&args, "query")?;

        debug!("Routing ticket query: '{}'", query);

        match self.engine.route(query).await {
            Ok(outcome) => json_result(&outcome),
            Err(e) => {
                error!("Ticket search failed: {}", e);
                Ok(CallToolResult::error(format!("Search error: {}", e)))
            }
        }
    }
}

impl SemanticSearchHandler {
    #[inline]
    pub const fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "semantic_search".to_string(),
            description: Some("Find tickets most similar in meaning to a query".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Text to compare tickets against"
                    },
                    "top_k": {
                        "type": "integer",
                        "description": "Maximum number of results (default: configured top_k)"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for SemanticSearchHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let query = required_str(&args, "query")?;

        let top_k = match args.get("top_k").map(Value::as_u64) {
            None => self.engine.settings().top_k,
            Some(Some(k)) => usize::try_from(k).unwrap_or(usize::MAX),
            Some(None) => {
                return Err(McpError::InvalidParameters {
                    message: "top_k must be a non-negative integer".to_string(),
                }
                .into());
            }
        };

        debug!("Semantic search: query='{}', top_k={}", query, top_k);

        match self.engine.semantic_search(query, top_k).await {
            Ok(outcome) => json_result(&outcome),
            Err(e) => {
                error!("Semantic search failed: {}", e);
                Ok(CallToolResult::error(format!("Search error: {}", e)))
            }
        }
    }
}

impl FilterTicketsHandler {
    #[inline]
    pub const fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "filter_tickets".to_string(),
            description: Some("Filter tickets by exact attributes and date range".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "category": {
                        "type": "string",
                        "description": "Optional: Payment, Login, Order, Shipping"
                    },
                    "priority": {
                        "type": "string",
                        "description": "Optional: High, Medium, Low"
                    },
                    "status": {
                        "type": "string",
                        "description": "Optional: Open, Closed, Resolved"
                    },
                    "start_date": {
                        "type": "string",
                        "description": "Optional: earliest creation time (ISO 8601)"
                    },
                    "end_date": {
                        "type": "string",
                        "description": "Optional: latest creation time (ISO 8601)"
                    }
                },
                "additionalProperties": false
            }),
        }
    }

    fn predicates(args: &HashMap<String, Value>) -> Result<PredicateSet> {
        let date = |key: &str| -> Result<_> {
            optional_str(args, key)
                .map(|raw| {
                    parse_timestamp(raw).map_err(|message| McpError::InvalidParameters {
                        message: format!("{}: {}", key, message),
                    })
                })
                .transpose()
                .map_err(Into::into)
        };

        Ok(PredicateSet {
            category: optional_str(args, "category").map(str::to_string),
            priority: optional_str(args, "priority").map(str::to_string),
            status: optional_str(args, "status").map(str::to_string),
            start_date: date("start_date")?,
            end_date: date("end_date")?,
        })
    }
}

#[async_trait]
impl ToolHandler for FilterTicketsHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let predicates = Self::predicates(&args)?;

        debug!("Filtering tickets: {:?}", predicates);

        match self.engine.filter(predicates) {
            Ok(outcome) => json_result(&outcome),
            Err(e) => {
                error!("Filter failed: {}", e);
                Ok(CallToolResult::error(format!("Filter error: {}", e)))
            }
        }
    }
}

impl ListTicketsHandler {
    #[inline]
    pub const fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "list_tickets".to_string(),
            description: Some("List every loaded support ticket".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for ListTicketsHandler {
    #[inline]
    async fn handle(&self, _params: CallToolParams) -> Result<CallToolResult> {
        debug!("Listing tickets");

        let tickets: Vec<TicketPreview> = self
            .engine
            .records()
            .iter()
            .map(|record| record.preview())
            .collect();

        json_result(&json!({ "tickets": tickets }))
    }
}
