//! MCP server and ticket tool tests

use crate::config::RetrievalConfig;
use crate::engine::Engine;
use crate::mcp::protocol::*;
use crate::mcp::server::{ConnectionState, McpServer, ToolHandler};
use crate::mcp::tools::*;
use crate::records::{Category, Priority, Record, RecordStore, Status};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

fn create_test_engine() -> Arc<Engine> {
    let record = |id: i64, category: Category, priority: Priority, status: Status| Record {
        id,
        title: format!("Ticket {}", id),
        description: "Description".to_string(),
        category,
        priority,
        status,
        created_at: Utc::now() - Duration::days(id),
        embedding: vec![1.0, id as f32],
    };

    let store = RecordStore::from_records(vec![
        record(1, Category::Payment, Priority::High, Status::Open),
        record(2, Category::Login, Priority::Low, Status::Closed),
        record(3, Category::Payment, Priority::Medium, Status::Resolved),
    ])
    .expect("should build store");

    Arc::new(Engine::new(store, 2, None, RetrievalConfig::default()).expect("should build engine"))
}

async fn create_test_server() -> Arc<McpServer> {
    let server = McpServer::new("ticket-search".to_string(), "0.1.0".to_string());
    register_ticket_tools(&server, &create_test_engine()).await;
    Arc::new(server)
}

/// Feed one JSON message per line to the server and collect its replies
async fn run_session(server: Arc<McpServer>, messages: &[&str]) -> Vec<Value> {
    let input = messages.join("\n");
    let mut output = Vec::new();

    server
        .serve(input.as_bytes(), &mut output)
        .await
        .expect("session should complete");

    String::from_utf8(output)
        .expect("output should be utf-8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("reply should be JSON"))
        .collect()
}

fn call_params(name: &str, arguments: Value) -> CallToolParams {
    let arguments: HashMap<String, Value> =
        serde_json::from_value(arguments).expect("arguments should be an object");
    CallToolParams {
        name: name.to_string(),
        arguments: Some(arguments),
    }
}

fn result_text(result: &CallToolResult) -> &str {
    match &result.content[0] {
        ToolContent::Text { text } => text,
    }
}

#[test]
fn search_tickets_tool_definition() {
    let tool = SearchTicketsHandler::tool_definition();

    assert_eq!(tool.name, "search_tickets");

    let schema = tool.input_schema;
    let properties = schema["properties"].as_object().expect("has properties");
    assert!(properties.contains_key("query"));

    let required = schema["required"].as_array().expect("has required array");
    assert_eq!(required.len(), 1);
    assert_eq!(required[0], "query");
}

#[test]
fn filter_tickets_tool_has_only_optional_parameters() {
    let tool = FilterTicketsHandler::tool_definition();
    let schema = tool.input_schema;

    let properties = schema["properties"].as_object().expect("has properties");
    for key in ["category", "priority", "status", "start_date", "end_date"] {
        assert!(properties.contains_key(key), "missing {}", key);
    }
    assert!(schema.get("required").is_none());
}

#[test]
fn list_tickets_tool_definition() {
    let tool = ListTicketsHandler::tool_definition();

    assert_eq!(tool.name, "list_tickets");
    let properties = tool.input_schema["properties"]
        .as_object()
        .expect("has properties");
    assert!(properties.is_empty());
}

#[tokio::test]
async fn search_tickets_routes_through_filter() {
    let handler = SearchTicketsHandler::new(create_test_engine());

    let result = handler
        .handle(call_params("search_tickets", json!({"query": "urgent payment"})))
        .await
        .expect("should handle call");

    assert_eq!(result.is_error, Some(false));
    let outcome: Value = serde_json::from_str(result_text(&result)).expect("should be JSON");
    assert_eq!(outcome["strategy"], "filter");
    assert_eq!(outcome["result_count"], 1);
    assert_eq!(outcome["results"][0]["record_id"], 1);
    assert!(outcome["results"][0].get("score").is_none());
}

#[tokio::test]
async fn search_tickets_reports_unavailable_retrieval() {
    let handler = SearchTicketsHandler::new(create_test_engine());

    let result = handler
        .handle(call_params(
            "search_tickets",
            json!({"query": "something about satisfaction"}),
        ))
        .await
        .expect("should handle call");

    assert_eq!(result.is_error, Some(true));
    assert!(result_text(&result).contains("Retrieval unavailable"));
}

#[tokio::test]
async fn search_tickets_requires_query() {
    let handler = SearchTicketsHandler::new(create_test_engine());

    let result = handler
        .handle(call_params("search_tickets", json!({})))
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn filter_tickets_applies_predicates() {
    let handler = FilterTicketsHandler::new(create_test_engine());

    let result = handler
        .handle(call_params("filter_tickets", json!({"category": "Payment"})))
        .await
        .expect("should handle call");

    let outcome: Value = serde_json::from_str(result_text(&result)).expect("should be JSON");
    let ids: Vec<i64> = outcome["results"]
        .as_array()
        .expect("results array")
        .iter()
        .filter_map(|r| r["record_id"].as_i64())
        .collect();
    assert_eq!(ids, vec![1, 3]);
    assert_eq!(outcome["predicates_used"], json!({"category": "Payment"}));
}

#[tokio::test]
async fn filter_tickets_rejects_inverted_range() {
    let handler = FilterTicketsHandler::new(create_test_engine());

    let result = handler
        .handle(call_params(
            "filter_tickets",
            json!({"start_date": "2025-12-20", "end_date": "2025-12-01"}),
        ))
        .await
        .expect("should handle call");

    assert_eq!(result.is_error, Some(true));
    assert!(result_text(&result).contains("Invalid predicate"));
}

#[tokio::test]
async fn filter_tickets_rejects_unparseable_date() {
    let handler = FilterTicketsHandler::new(create_test_engine());

    let result = handler
        .handle(call_params("filter_tickets", json!({"start_date": "yesterday"})))
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn list_tickets_returns_store_order() {
    let handler = ListTicketsHandler::new(create_test_engine());

    let result = handler
        .handle(call_params("list_tickets", json!({})))
        .await
        .expect("should handle call");

    let body: Value = serde_json::from_str(result_text(&result)).expect("should be JSON");
    let tickets = body["tickets"].as_array().expect("tickets array");
    assert_eq!(tickets.len(), 3);
    assert_eq!(tickets[0]["id"], 1);
    assert!(tickets[0].get("embedding").is_none());
}

#[tokio::test]
async fn session_initialize_list_and_call() {
    let server = create_test_server().await;

    let replies = run_session(
        Arc::clone(&server),
        &[
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18","capabilities":{},"clientInfo":{"name":"test","version":"1"}}}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"search_tickets","arguments":{"query":"closed login"}}}"#,
            r#"{"jsonrpc":"2.0","id":4,"method":"ping"}"#,
        ],
    )
    .await;

    assert_eq!(replies.len(), 4);
    assert_eq!(replies[0]["result"]["serverInfo"]["name"], "ticket-search");
    assert_eq!(replies[0]["result"]["protocolVersion"], "2025-06-18");

    let names: Vec<&str> = replies[1]["result"]["tools"]
        .as_array()
        .expect("tools array")
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "filter_tickets",
            "list_tickets",
            "search_tickets",
            "semantic_search"
        ]
    );

    assert_eq!(replies[2]["id"], 3);
    assert_eq!(replies[2]["result"]["isError"], false);
    let text = replies[2]["result"]["content"][0]["text"]
        .as_str()
        .expect("text content");
    let outcome: Value = serde_json::from_str(text).expect("should be JSON");
    assert_eq!(outcome["results"][0]["record_id"], 2);

    assert_eq!(replies[3]["result"], json!({}));
    assert_eq!(server.connection_state().await, ConnectionState::Closed);
}

#[tokio::test]
async fn session_reports_protocol_errors() {
    let server = create_test_server().await;

    let replies = run_session(
        server,
        &[
            "{not json",
            r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"resources/list"}"#,
            r#"{"jsonrpc":"2.0","id":3,"method":"initialize","params":{"protocolVersion":"1999-01-01","capabilities":{},"clientInfo":{"name":"old","version":"0"}}}"#,
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"missing_tool"}}"#,
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call"}"#,
        ],
    )
    .await;

    let codes: Vec<i64> = replies
        .iter()
        .filter_map(|reply| reply["error"]["code"].as_i64())
        .collect();
    assert_eq!(
        codes,
        vec![
            i64::from(codes::PARSE_ERROR),
            i64::from(codes::INVALID_REQUEST),
            i64::from(codes::METHOD_NOT_FOUND),
            i64::from(codes::UNSUPPORTED_PROTOCOL_VERSION),
            i64::from(codes::TOOL_NOT_FOUND),
            i64::from(codes::INVALID_PARAMS),
        ]
    );
    assert!(replies[0]["id"].is_null());
    assert_eq!(replies[2]["id"], 2);
    assert!(replies.iter().all(|reply| reply["jsonrpc"] == "2.0"));
    assert!(replies.iter().all(|reply| reply.get("result").is_none()));
}

#[tokio::test]
async fn session_answers_requests_only() {
    let server = create_test_server().await;

    let replies = run_session(
        Arc::clone(&server),
        &[
            r#"{"jsonrpc":"2.0","id":9,"result":{}}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":1}}"#,
            "",
            r#"{"jsonrpc":"2.0","id":"abc","method":"ping"}"#,
        ],
    )
    .await;

    assert_eq!(replies, vec![json!({"jsonrpc": "2.0", "id": "abc", "result": {}})]);
    assert_eq!(server.connection_state().await, ConnectionState::Closed);
}

#[test]
fn envelopes_are_classified_by_id_and_method() {
    let classify = |line: &str| {
        serde_json::from_str::<Envelope>(line)
            .expect("should parse envelope")
            .classify()
    };

    assert!(matches!(
        classify(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#),
        Some(Inbound::Request { id: RequestId::Number(1), .. })
    ));
    assert!(matches!(
        classify(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#),
        Some(Inbound::Notification { .. })
    ));
    assert!(matches!(
        classify(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-1,"message":"x"}}"#),
        Some(Inbound::Reply)
    ));
    assert!(classify(r#"{"jsonrpc":"2.0","id":1}"#).is_none());
    assert!(classify(r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#).is_none());
}

#[tokio::test]
async fn initialize_advertises_tools_only() {
    let server = create_test_server().await;
    let handler = crate::mcp::server::MessageHandler::new(Arc::clone(&server));

    let result = handler
        .handle_initialize(Some(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {"name": "test", "version": "1"}
        })))
        .await
        .expect("should initialize");

    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert_eq!(result["capabilities"], json!({"tools": {"listChanged": false}}));
    assert!(result.get("instructions").is_none());
    assert_eq!(server.connection_state().await, ConnectionState::Initializing);
}
