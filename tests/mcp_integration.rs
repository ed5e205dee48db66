#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! MCP Server Integration Tests
//!
//! Ticket tools registered on a server backed by an engine loaded from disk,
//! driven through the message handler the way a client would.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use ticket_search::config::{Config, DatasetConfig};
use ticket_search::embeddings::EmbeddingProvider;
use ticket_search::engine::Engine;
use ticket_search::mcp::protocol::ListToolsResult;
use ticket_search::mcp::server::MessageHandler;
use ticket_search::mcp::tools::{
    ListTicketsHandler, SemanticSearchHandler, register_ticket_tools,
};
use ticket_search::mcp::{CallToolParams, ConnectionState, McpServer, ToolContent, ToolHandler};

/// Embeds everything onto the login axis
#[derive(Debug)]
struct LoginProvider;

#[async_trait]
impl EmbeddingProvider for LoginProvider {
    fn dimension(&self) -> usize {
        3
    }

    async fn embed(&self, _text: &str) -> ticket_search::Result<Vec<f32>> {
        Ok(vec![0.1, 1.0, 0.0])
    }
}

/// Test helper to write a dataset and load an engine over it
fn setup_test_environment(
    provider: Option<Arc<dyn EmbeddingProvider>>,
) -> (TempDir, Arc<Engine>) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dataset = temp_dir.path().join("tickets.json");

    let tickets = json!([
        {
            "id": 10,
            "title": "Invoice shows wrong amount",
            "description": "Billed for the annual plan instead of monthly",
            "category": "Payment",
            "priority": "High",
            "status": "Open",
            "created_at": "2025-11-02T09:30:00.000000",
            "embedding": [1.0, 0.0, 0.0]
        },
        {
            "id": 11,
            "title": "Cannot sign in after update",
            "description": "Two-factor code rejected",
            "category": "Login",
            "priority": "Medium",
            "status": "Open",
            "created_at": "2025-11-03T10:00:00.000000",
            "embedding": [0.0, 1.0, 0.0]
        },
        {
            "id": 12,
            "title": "Parcel delivered to neighbour",
            "description": "Tracking says delivered but nothing arrived",
            "category": "Shipping",
            "priority": "Low",
            "status": "Closed",
            "created_at": "2025-11-04T11:15:00.000000",
            "embedding": [0.0, 0.0, 1.0]
        }
    ]);
    std::fs::write(&dataset, tickets.to_string()).expect("Failed to write dataset");

    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        dataset: DatasetConfig {
            path: Some(dataset),
        },
        ..Config::default()
    };
    config.ollama.embedding_dimension = 3;

    let engine = Engine::load(&config, provider).expect("Failed to load engine");
    (temp_dir, Arc::new(engine))
}

async fn setup_server(engine: &Arc<Engine>) -> Arc<McpServer> {
    let server = McpServer::new("ticket-search".to_string(), "1.0.0".to_string());
    register_ticket_tools(&server, engine).await;
    Arc::new(server)
}

fn call(name: &str, arguments: Value) -> CallToolParams {
    let arguments: HashMap<String, Value> =
        serde_json::from_value(arguments).expect("arguments should be an object");
    CallToolParams {
        name: name.to_string(),
        arguments: Some(arguments),
    }
}

fn text_json(content: &ToolContent) -> Value {
    let ToolContent::Text { text } = content;
    serde_json::from_str(text).expect("Failed to parse JSON response")
}

/// Test MCP server creation and basic initialization
#[tokio::test]
async fn mcp_server_initialization() {
    let server = McpServer::new("test-server".to_string(), "1.0.0".to_string());

    assert_eq!(server.server_info.name, "test-server");
    assert_eq!(server.server_info.version, "1.0.0");
    assert_eq!(
        server.connection_state().await,
        ConnectionState::Uninitialized
    );
    assert!(server.tools.read().await.is_empty());
}

/// Test that every ticket tool is registered and listed
#[tokio::test]
async fn message_handler_list_tools() {
    let (_temp_dir, engine) = setup_test_environment(None);
    let server = setup_server(&engine).await;

    let handler = MessageHandler::new(Arc::clone(&server));
    let result = handler
        .handle_list_tools()
        .await
        .expect("Failed to list tools");

    let tools_result: ListToolsResult =
        serde_json::from_value(result).expect("Failed to deserialize tools result");

    assert_eq!(tools_result.tools.len(), 4);
    assert!(
        tools_result
            .tools
            .iter()
            .all(|tool| tool.input_schema["type"] == "object")
    );
}

/// Test list_tickets over the loaded snapshot
#[tokio::test]
async fn list_tickets_tool() {
    let (_temp_dir, engine) = setup_test_environment(None);

    let handler = ListTicketsHandler::new(Arc::clone(&engine));
    let result = handler
        .handle(call("list_tickets", json!({})))
        .await
        .expect("Tool execution failed");

    assert_eq!(result.is_error, Some(false));
    assert_eq!(result.content.len(), 1);

    let response = text_json(&result.content[0]);
    let tickets = response["tickets"].as_array().expect("is array");
    assert_eq!(tickets.len(), 3);
    assert_eq!(tickets[2]["title"], "Parcel delivered to neighbour");
}

/// Test a free-text call routed through structured filtering
#[tokio::test]
async fn search_tickets_with_structured_intent() {
    let (_temp_dir, engine) = setup_test_environment(None);
    let server = setup_server(&engine).await;

    let handler = MessageHandler::new(Arc::clone(&server));
    let result = handler
        .handle_call_tool(Some(json!({
            "name": "search_tickets",
            "arguments": { "query": "any invoice problems?" }
        })))
        .await
        .expect("Tool call should succeed");

    assert_eq!(result["isError"], false);
    let text = result["content"][0]["text"].as_str().expect("text content");
    let outcome: Value = serde_json::from_str(text).expect("outcome JSON");
    assert_eq!(outcome["strategy"], "filter");
    assert_eq!(outcome["predicates_used"]["category"], "Payment");
    assert_eq!(outcome["results"][0]["record_id"], 10);
}

/// Test semantic search with a provider and an explicit top_k
#[tokio::test]
async fn semantic_search_tool_ranks_results() {
    let provider = Arc::new(LoginProvider) as Arc<dyn EmbeddingProvider>;
    let (_temp_dir, engine) = setup_test_environment(Some(provider));

    let handler = SemanticSearchHandler::new(Arc::clone(&engine));
    let result = handler
        .handle(call(
            "semantic_search",
            json!({ "query": "two-factor trouble", "top_k": 2 }),
        ))
        .await
        .expect("Tool execution failed");

    assert_eq!(result.is_error, Some(false));
    let outcome = text_json(&result.content[0]);
    assert_eq!(outcome["strategy"], "semantic");
    assert_eq!(outcome["result_count"], 2);
    assert_eq!(outcome["results"][0]["record_id"], 11);
    assert_eq!(outcome["results"][1]["record_id"], 10);
}

/// Test that a zero top_k is reported as a tool error, not a protocol error
#[tokio::test]
async fn semantic_search_rejects_zero_top_k() {
    let provider = Arc::new(LoginProvider) as Arc<dyn EmbeddingProvider>;
    let (_temp_dir, engine) = setup_test_environment(Some(provider));

    let handler = SemanticSearchHandler::new(Arc::clone(&engine));
    let result = handler
        .handle(call("semantic_search", json!({ "query": "x", "top_k": 0 })))
        .await
        .expect("Tool execution failed");

    assert_eq!(result.is_error, Some(true));
}

/// Test error handling for invalid tool calls
#[tokio::test]
async fn error_handling_invalid_tool() {
    let server = Arc::new(McpServer::new(
        "test-server".to_string(),
        "1.0.0".to_string(),
    ));

    let handler = MessageHandler::new(Arc::clone(&server));
    let result = handler
        .handle_call_tool(Some(json!({
            "name": "nonexistent_tool",
            "arguments": {}
        })))
        .await;

    let error_message = result.expect_err("is error").to_string();
    assert!(error_message.contains("Tool not found"));

    // Missing 'name' field
    let result = handler
        .handle_call_tool(Some(json!({ "invalid": "parameters" })))
        .await;
    assert!(result.is_err());

    assert_eq!(
        server.connection_state().await,
        ConnectionState::Uninitialized
    );
}

/// Test concurrent tool calls against one shared engine
#[tokio::test]
async fn concurrent_tool_operations() {
    let (_temp_dir, engine) = setup_test_environment(None);
    let server = setup_server(&engine).await;

    let handles: Vec<_> = ["closed delivery", "open login", "high priority billing"]
        .into_iter()
        .cycle()
        .take(12)
        .map(|query| {
            let handler = MessageHandler::new(Arc::clone(&server));
            tokio::spawn(async move {
                let result = handler
                    .handle_call_tool(Some(json!({
                        "name": "search_tickets",
                        "arguments": { "query": query }
                    })))
                    .await
                    .expect("Tool call should succeed");
                (query, result)
            })
        })
        .collect();

    for handle in handles {
        let (query, result) = handle.await.expect("Task failed");
        let text = result["content"][0]["text"].as_str().expect("text content");
        let outcome: Value = serde_json::from_str(text).expect("outcome JSON");

        let expected = match query {
            "closed delivery" => 12,
            "open login" => 11,
            _ => 10,
        };
        assert_eq!(outcome["results"][0]["record_id"], expected, "{}", query);
        assert_eq!(outcome["result_count"], 1, "{}", query);
    }
}
