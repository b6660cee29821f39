//! Integration tests for the MCP client over real HTTP.
//!
//! A `wiremock` server plays the MCP endpoint. The client is blocking, so every
//! exchange runs inside `spawn_blocking` on a multi-thread runtime.

use std::time::Duration;

use conduit_mcp::{
    ApprovalPolicy, Catalog, HttpTransportConfig, InvocationResult, InvocationRouter, McpError,
    McpSession, RpcOutcome, StaticApprovalHandler,
};
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SESSION: &str = "7f3c9a1e-session";

fn sse(result: Value) -> ResponseTemplate {
    let body = format!(
        "event: message\ndata: {}\n\n",
        json!({"jsonrpc": "2.0", "id": 1, "result": result})
    );
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

fn rpc_error(code: i64, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0", "id": 1, "error": {"code": code, "message": message}
    }))
}

async fn mount_initialize(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({"method": "initialize"})))
        .respond_with(
            sse(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}, "resources": {}},
                "serverInfo": {"name": "bb-demo", "version": "1.0.0"}
            }))
            .insert_header("mcp-session-id", SESSION),
        )
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(
            json!({"method": "notifications/initialized"}),
        ))
        .and(header("mcp-session-id", SESSION))
        .respond_with(ResponseTemplate::new(202))
        .mount(server)
        .await;
}

fn config(server: &MockServer) -> HttpTransportConfig {
    HttpTransportConfig::new(format!("{}/mcp", server.uri()))
        .with_timeout(Duration::from_secs(5))
        .with_retries(0)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_discover_and_call_over_http() {
    let server = MockServer::start().await;
    mount_initialize(&server).await;

    // Every post-handshake call must carry the session header to match.
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "tools/list"})))
        .and(header("mcp-session-id", SESSION))
        .respond_with(sse(json!({"tools": [
            {"name": "add_two_numbers", "description": "Adds two integer numbers together.",
             "inputSchema": {"type": "object",
                "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
                "required": ["a", "b"]}},
            {"name": "get_user_info", "description": "Returns user info.",
             "inputSchema": {"type": "object",
                "properties": {"user_id": {"type": "integer"}}, "required": ["user_id"]}}
        ]})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "resources/list"})))
        .and(header("mcp-session-id", SESSION))
        .respond_with(sse(json!({"resources": [
            {"uri": "config://app_config", "name": "get_config",
             "description": "Provides the application configuration."}
        ]})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(body_partial_json(
            json!({"method": "resources/templates/list"}),
        ))
        .and(header("mcp-session-id", SESSION))
        .respond_with(sse(json!({"resourceTemplates": [
            {"uriTemplate": "users://{user_id}/profile", "name": "get_user_profile",
             "description": "Returns a user's profile."}
        ]})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "prompts/list"})))
        .and(header("mcp-session-id", SESSION))
        .respond_with(sse(json!({"prompts": [
            {"name": "summarize_user", "arguments": [{"name": "user_id", "required": true}]}
        ]})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "tools/call",
            "params": {"name": "add_two_numbers", "arguments": {"a": 5, "b": 3}}
        })))
        .and(header("mcp-session-id", SESSION))
        .respond_with(sse(
            json!({"content": [{"type": "text", "text": "8"}], "isError": false}),
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "resources/read",
            "params": {"uri": "users://42/profile"}
        })))
        .and(header("mcp-session-id", SESSION))
        .respond_with(sse(json!({"contents": [{
            "uri": "users://42/profile",
            "mimeType": "application/json",
            "text": "{\"name\": \"User 42\", \"status\": \"active\"}"
        }]})))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server);
    tokio::task::spawn_blocking(move || {
        let session = McpSession::connect_http(config).unwrap();
        assert_eq!(session.initialize().unwrap().as_deref(), Some(SESSION));
        assert_eq!(session.server_info().unwrap().name, "bb-demo");

        let catalog = Catalog::refresh(&session).unwrap();
        assert_eq!(
            catalog.names(),
            vec![
                "add_two_numbers",
                "get_user_info",
                "resource_get_config",
                "resource_get_user_profile"
            ]
        );
        let profile = catalog.find("resource_get_user_profile").unwrap();
        assert_eq!(profile.parameters["properties"]["user_id"]["type"], "integer");
        assert_eq!(catalog.prompts()[0].name, "summarize_user");
        assert!(catalog.find("summarize_user").is_none());

        let router = InvocationRouter::new(
            catalog,
            ApprovalPolicy::default(),
            StaticApprovalHandler::decline_all(),
        );

        let sum = router
            .invoke(&session, "add_two_numbers", json!({"a": 5, "b": 3}))
            .unwrap();
        assert_eq!(sum.display_text(), "8");

        let profile = router
            .invoke_json(&session, "resource_get_user_profile", r#"{"user_id": 42}"#)
            .unwrap();
        assert!(profile.display_text().contains("\"status\": \"active\""));

        // Declined: no tools/call for get_user_info is mounted, and none is sent.
        let declined = router
            .invoke(&session, "get_user_info", json!({"user_id": 1}))
            .unwrap();
        assert!(matches!(declined, InvocationResult::Declined { .. }));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_optional_listings_missing_are_tolerated() {
    let server = MockServer::start().await;
    mount_initialize(&server).await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "tools/list"})))
        .respond_with(sse(json!({"tools": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "resources/list"})))
        .respond_with(sse(json!({"resources": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(
            json!({"method": "resources/templates/list"}),
        ))
        .respond_with(rpc_error(-32601, "Method not found"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "prompts/list"})))
        .respond_with(rpc_error(-32601, "Method not found"))
        .mount(&server)
        .await;

    let config = config(&server);
    tokio::task::spawn_blocking(move || {
        let session = McpSession::connect_http(config).unwrap();
        session.initialize().unwrap();
        let catalog = Catalog::refresh(&session).unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.prompts().is_empty());
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_expired_session_requires_reinitialize() {
    let server = MockServer::start().await;
    mount_initialize(&server).await;

    // First tools/list is refused; later ones succeed.
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "tools/list"})))
        .respond_with(ResponseTemplate::new(404).set_body_string("Session not found"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "tools/list"})))
        .respond_with(sse(json!({"tools": []})))
        .mount(&server)
        .await;

    let config = config(&server);
    let result = tokio::task::spawn_blocking(move || {
        let session = McpSession::connect_http(config).unwrap();
        session.initialize().unwrap();

        let err = session.request("tools/list", None).unwrap_err();
        assert!(
            matches!(&err, McpError::SessionExpired { session_id } if session_id == SESSION),
            "unexpected error: {err:?}"
        );
        session.request("tools/list", None).unwrap()
    })
    .await
    .unwrap();

    assert_eq!(result, RpcOutcome::Result(json!({"tools": []})));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_failure_is_transport_level() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let config = config(&server);
    let err = tokio::task::spawn_blocking(move || {
        let session = McpSession::connect_http(config).unwrap();
        session.initialize().unwrap_err()
    })
    .await
    .unwrap();

    assert!(matches!(err, McpError::Http { status: 500, .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(sse(json!({})).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let config = config(&server).with_timeout(Duration::from_millis(300));
    let err = tokio::task::spawn_blocking(move || {
        let session = McpSession::connect_http(config).unwrap();
        session.request("tools/list", None).unwrap_err()
    })
    .await
    .unwrap();

    assert!(matches!(err, McpError::Timeout), "unexpected error: {err:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_plain_json_reply_without_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "initialize"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": {"protocolVersion": "2024-11-05"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&server)
        .await;

    let config = config(&server);
    let (session_id, outcome) = tokio::task::spawn_blocking(move || {
        let session = McpSession::connect_http(config).unwrap();
        let id = session.initialize().unwrap();
        (id, session.request("tools/list", None).unwrap())
    })
    .await
    .unwrap();

    assert_eq!(session_id, None);
    assert_eq!(outcome, RpcOutcome::Empty);
}
