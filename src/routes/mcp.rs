//! HTTP surface of the MCP endpoint.
//!
//! One POST route carries every JSON-RPC exchange; the same path answers a
//! GET status probe and a DELETE termination attempt. Session identity
//! travels in the `x-mcp-session-id` header (query fallback) and is echoed
//! back on every response so stateless callers can keep their token.

use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use chrono::Utc;
use std::time::Duration;
use tokio::time::timeout;

use crate::mcp::{
    resolve_session_id, AdaptedRequest, EndpointManager, JsonRpcError, JsonRpcResponse,
    SESSION_ID_HEADER,
};

/// Upper bound on the diagnostic probe; a wedged store must not hang it.
const STATUS_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

fn http_status_for(response: &JsonRpcResponse) -> actix_web::http::StatusCode {
    match response.error.as_ref().map(|e| e.code) {
        // Malformed envelope: the HTTP layer agrees with the RPC layer.
        Some(-32700) | Some(-32600) => actix_web::http::StatusCode::BAD_REQUEST,
        _ => actix_web::http::StatusCode::OK,
    }
}

#[tracing::instrument(name = "MCP request", skip(req, body, manager))]
#[post("/mcp")]
pub async fn mcp_handler(
    req: HttpRequest,
    body: web::Bytes,
    manager: web::Data<EndpointManager>,
) -> Result<HttpResponse, crate::mcp::EndpointError> {
    let presented = resolve_session_id(&req);
    let lease = manager.acquire(presented.as_deref()).await?;

    let adapted = AdaptedRequest::from_http(&req, body, lease.active_session_id());

    let http_response = match lease.handle(adapted).await {
        Some(response) => {
            let mut builder = HttpResponse::build(http_status_for(&response));
            if let Some(id) = lease.active_session_id() {
                builder.insert_header((SESSION_ID_HEADER, id));
            }
            builder.json(&response)
        }
        // Notification: accepted, nothing to say back.
        None => {
            let mut builder = HttpResponse::Accepted();
            if let Some(id) = lease.active_session_id() {
                builder.insert_header((SESSION_ID_HEADER, id));
            }
            builder.finish()
        }
    };

    Ok(http_response)
}

#[tracing::instrument(name = "MCP status probe", skip(req, manager))]
#[get("/mcp")]
pub async fn mcp_probe(
    req: HttpRequest,
    manager: web::Data<EndpointManager>,
) -> HttpResponse {
    let is_status_check = req
        .query_string()
        .split('&')
        .any(|pair| pair == "status=check");

    if !is_status_check {
        return HttpResponse::MethodNotAllowed().json(JsonRpcResponse::error(
            None,
            JsonRpcError::custom(
                -32000,
                "GET is only supported with ?status=check".to_string(),
                None,
            ),
        ));
    }

    match timeout(STATUS_CHECK_TIMEOUT, manager.check_server_status()).await {
        Ok(status) => HttpResponse::Ok().json(serde_json::json!({
            "status": status,
            "timestamp": Utc::now().to_rfc3339(),
        })),
        Err(_) => HttpResponse::InternalServerError().json(serde_json::json!({
            "status": "Error",
            "error": "Status check timed out",
            "timestamp": Utc::now().to_rfc3339(),
        })),
    }
}

/// The stateless design has no server-side session teardown; clients treat
/// this answer as "termination unsupported" and keep their session active.
#[tracing::instrument(name = "MCP terminate session", skip(_req))]
#[delete("/mcp")]
pub async fn mcp_terminate(_req: HttpRequest) -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(JsonRpcResponse::error(
        None,
        JsonRpcError::custom(
            -32000,
            "Session termination is not supported".to_string(),
            None,
        ),
    ))
}
