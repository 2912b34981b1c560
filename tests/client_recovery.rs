//! Client-side reconnect protocol.
//!
//! The wiremock suites forge the exact signals a recycled backend produces
//! (session-update side channel, reset flags, session-loss phrases) and
//! verify the client performs exactly one bounded recovery per call. The
//! tail of the file drives the client against the real server for the happy
//! path.

mod common;

use mcp_bridge::client::{ConnectionState, McpClient};
use mcp_bridge::mcp::SessionStore;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn initialize_success() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {
            "protocolVersion": "2024-11-05",
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": { "name": "mock-mcp", "version": "0.0.0" }
        }
    }))
}

fn rpc_error(message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 2,
        "error": { "code": -32000, "message": message }
    }))
}

fn tools_success(marker: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 2,
        "result": { "tools": [ { "name": marker, "description": "", "inputSchema": {} } ] }
    }))
}

async fn mock_handshake(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "initialize" })))
        .respond_with(initialize_success())
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "notifications/initialized" })))
        .respond_with(ResponseTemplate::new(202))
        .mount(server)
        .await;
}

#[tokio::test]
async fn session_update_reconnects_once_and_returns_the_retried_result() {
    let server = MockServer::start().await;
    mock_handshake(&server).await;

    // Retry carrying the announced replacement id gets the real answer.
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "tools/list" })))
        .and(header("x-mcp-session-id", "fresh"))
        .respond_with(tools_success("recovered"))
        .expect(1)
        .mount(&server)
        .await;

    // First attempt: success result with the session-update side channel.
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "tools/list" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": {
                "tools": [],
                "__session_update": { "oldSessionId": null, "newSessionId": "fresh" }
            }
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    let mut client = McpClient::new(&server.uri());
    let result = client.call("tools/list", json!({})).await.expect("call should recover");

    assert_eq!(result["tools"][0]["name"], "recovered");
    assert_eq!(client.session().session_id.as_deref(), Some("fresh"));
    assert!(client.session().is_connected());
}

#[tokio::test]
async fn reset_flag_in_error_text_forces_a_completely_new_session() {
    let server = MockServer::start().await;
    mock_handshake(&server).await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "tools/list" })))
        .respond_with(rpc_error(r#"Backend recycled {"resetRequested": true}, reconnect"#))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "tools/list" })))
        .respond_with(tools_success("after-reset"))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = McpClient::new(&server.uri());
    client.connect(false).await.expect("connect");
    let before = client.session().session_id.clone().unwrap();

    let result = client.call("tools/list", json!({})).await.expect("call should recover");

    assert_eq!(result["tools"][0]["name"], "after-reset");
    let after = client.session().session_id.clone().unwrap();
    assert_ne!(before, after, "a completely new session must carry a new token");
}

#[tokio::test]
async fn already_initialized_retries_as_is_without_reconnecting() {
    let server = MockServer::start().await;

    // The handshake must run exactly once: the as-is retry never reconnects.
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "initialize" })))
        .respond_with(initialize_success())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "notifications/initialized" })))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "tools/list" })))
        .respond_with(rpc_error("Transport already initialized"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "tools/list" })))
        .respond_with(tools_success("benign"))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = McpClient::new(&server.uri());
    let result = client.call("tools/list", json!({})).await.expect("call should recover");

    assert_eq!(result["tools"][0]["name"], "benign");
}

#[tokio::test]
async fn session_lost_phrase_clears_the_id_and_reconnects() {
    let server = MockServer::start().await;

    // Initial connect plus the recovery reconnect.
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "initialize" })))
        .respond_with(initialize_success())
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "notifications/initialized" })))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "tools/list" })))
        .respond_with(rpc_error("Session not found: it expired"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "tools/list" })))
        .respond_with(tools_success("relocated"))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = McpClient::new(&server.uri());
    client.connect(false).await.expect("connect");
    let before = client.session().session_id.clone().unwrap();

    let result = client.call("tools/list", json!({})).await.expect("call should recover");

    assert_eq!(result["tools"][0]["name"], "relocated");
    assert_ne!(client.session().session_id.clone().unwrap(), before);
}

#[tokio::test]
async fn unrecognized_errors_propagate_without_retry() {
    let server = MockServer::start().await;
    mock_handshake(&server).await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "tools/list" })))
        .respond_with(rpc_error("quota exceeded for this key"))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = McpClient::new(&server.uri());
    let err = client
        .call("tools/list", json!({}))
        .await
        .expect_err("unrecognized errors must surface verbatim");

    assert!(err.to_string().contains("quota exceeded"));
}

#[tokio::test]
async fn a_retry_failure_is_never_itself_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "initialize" })))
        .respond_with(initialize_success())
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "notifications/initialized" })))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    // Both the original attempt and the single retry report session loss;
    // the second failure must propagate rather than loop.
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "tools/list" })))
        .respond_with(rpc_error("Session not found"))
        .expect(2)
        .mount(&server)
        .await;

    let mut client = McpClient::new(&server.uri());
    client.connect(false).await.expect("connect");

    let err = client
        .call("tools/list", json!({}))
        .await
        .expect_err("second failure must propagate");

    assert!(err.to_string().contains("Session not found"));
}

// ── Against the real server ──────────────────────────

#[tokio::test]
async fn client_adopts_the_server_minted_session_transparently() {
    let app = common::spawn_app().await;

    let mut client = McpClient::new(&app.address);
    client.connect(false).await.expect("connect");

    // The client's locally minted token was unknown to the server; the
    // server minted a replacement and the client adopted it silently.
    let adopted = client.session().session_id.clone().unwrap();
    assert!(app.store.get_session(&adopted).await.is_some());

    let result = client
        .call_tool("echo", json!({ "message": "continuity" }))
        .await
        .expect("tool call");
    assert_eq!(result["content"][0]["text"], "continuity");

    // Still the same session: nothing else was minted.
    assert_eq!(client.session().session_id.as_deref(), Some(adopted.as_str()));
    assert_eq!(app.store.list_sessions().await.len(), 1);

    let record = app.store.get_session(&adopted).await.unwrap();
    assert_eq!(record.method.as_deref(), Some("tools/call"));
}

#[tokio::test]
async fn shutdown_leaves_an_unterminatable_session_active() {
    let app = common::spawn_app().await;

    let mut client = McpClient::new(&app.address);
    client.connect(false).await.expect("connect");
    let id = client.session().session_id.clone().unwrap();

    client.shutdown().await;

    // Termination is unsupported server-side: the identity survives, only
    // the link state drops.
    assert_eq!(client.session().session_id.as_deref(), Some(id.as_str()));
    assert_eq!(client.session().connection_state, ConnectionState::Disconnected);
    assert!(app.store.get_session(&id).await.is_some());
}

#[tokio::test]
async fn reset_session_starts_over_with_a_server_assigned_identity() {
    let app = common::spawn_app().await;

    let mut client = McpClient::new(&app.address);
    client.connect(false).await.expect("connect");
    let first = client.session().session_id.clone().unwrap();

    client.reset_session().await.expect("reset");
    let second = client.session().session_id.clone().unwrap();

    assert_ne!(first, second);
    assert!(app.store.get_session(&second).await.is_some());
}
