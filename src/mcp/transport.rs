//! The live protocol endpoint: a JSON-RPC dispatcher ([`McpServer`]) wired
//! to a rebindable transport ([`McpTransport`]).
//!
//! The transport owns exactly one *currently bound* session identity at any
//! instant. Rebinding swaps that identity in place through an explicit
//! capability; nothing outside this module touches the binding directly.

use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use super::adapter::AdaptedRequest;
use super::protocol::{
    CallToolRequest, CallToolResponse, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, PromptListResponse, ResourceListResponse,
    ServerCapabilities, ServerInfo, SessionUpdate, ToolListResponse, ToolsCapability,
};
use super::registry::{ToolContext, ToolRegistry};
use super::store::SessionStore;

/// Protocol version advertised in the initialize handshake.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC method dispatcher over the tool registry.
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    store: Arc<dyn SessionStore>,
    server_name: String,
    transport: RwLock<Option<Arc<McpTransport>>>,
    connected: AtomicBool,
}

impl McpServer {
    pub fn new(
        registry: Arc<ToolRegistry>,
        store: Arc<dyn SessionStore>,
        server_name: String,
    ) -> Self {
        Self {
            registry,
            store,
            server_name,
            transport: RwLock::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Wire the server to its transport. Idempotent: connecting an already
    /// connected server keeps the existing wiring.
    pub fn connect_transport(&self, transport: Arc<McpTransport>) {
        let mut slot = self.transport.write().expect("transport lock poisoned");
        if slot.is_some() {
            tracing::debug!("Server already connected to transport, keeping existing wiring");
            return;
        }
        *slot = Some(transport);
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn has_transport(&self) -> bool {
        self.transport
            .read()
            .expect("transport lock poisoned")
            .is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Handle a JSON-RPC request. Returns `None` for notifications, which
    /// must not receive a response per JSON-RPC 2.0.
    pub async fn dispatch(
        &self,
        req: JsonRpcRequest,
        session_id: Option<&str>,
    ) -> Option<JsonRpcResponse> {
        if req.is_notification() {
            if req.method == "notifications/initialized" {
                tracing::info!("Ignoring notifications/initialized (notification)");
            } else {
                tracing::warn!("Ignoring notification without id: method={}", req.method);
            }
            return None;
        }

        if req.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(req.id, JsonRpcError::invalid_request()));
        }

        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(req),
            "ping" => JsonRpcResponse::success(req.id, serde_json::json!({})),
            "tools/list" => self.handle_tools_list(req),
            "tools/call" => self.handle_tools_call(req, session_id).await,
            "prompts/list" => JsonRpcResponse::success(
                req.id,
                serde_json::to_value(PromptListResponse { prompts: vec![] }).unwrap_or_default(),
            ),
            "resources/list" => JsonRpcResponse::success(
                req.id,
                serde_json::to_value(ResourceListResponse { resources: vec![] })
                    .unwrap_or_default(),
            ),
            _ => JsonRpcResponse::error(req.id, JsonRpcError::method_not_found(&req.method)),
        };

        Some(response)
    }

    /// Handle the initialize handshake. Repeated initialization of the
    /// shared endpoint is idempotent success.
    fn handle_initialize(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        let params: InitializeParams = match req.params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::error(
                        req.id,
                        JsonRpcError::invalid_params(&e.to_string()),
                    )
                }
            },
            None => {
                return JsonRpcResponse::error(req.id, JsonRpcError::invalid_params("Missing params"))
            }
        };

        tracing::info!(
            "MCP client initialized: protocol_version={}, client={}",
            params.protocol_version,
            params
                .client_info
                .as_ref()
                .map(|c| c.name.as_str())
                .unwrap_or("unknown")
        );

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
                prompts: Some(serde_json::json!({})),
                resources: Some(serde_json::json!({})),
                experimental: None,
            },
            server_info: ServerInfo {
                name: self.server_name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        JsonRpcResponse::success(req.id, serde_json::to_value(result).unwrap_or_default())
    }

    fn handle_tools_list(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        let tools = self.registry.list_tools();

        tracing::debug!("Listing {} available tools", tools.len());

        let result = ToolListResponse { tools };

        JsonRpcResponse::success(req.id, serde_json::to_value(result).unwrap_or_default())
    }

    async fn handle_tools_call(
        &self,
        req: JsonRpcRequest,
        session_id: Option<&str>,
    ) -> JsonRpcResponse {
        let call_req: CallToolRequest = match req.params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::error(
                        req.id,
                        JsonRpcError::invalid_params(&e.to_string()),
                    )
                }
            },
            None => {
                return JsonRpcResponse::error(req.id, JsonRpcError::invalid_params("Missing params"))
            }
        };

        let tool_span = tracing::info_span!(
            "mcp_tool_call",
            tool = %call_req.name,
            session_id = session_id.unwrap_or("-")
        );
        let _enter = tool_span.enter();

        match self.registry.get(&call_req.name) {
            Some(handler) => {
                let context = ToolContext {
                    session_id: session_id.map(str::to_string),
                    store: self.store.clone(),
                };

                match handler
                    .execute(call_req.arguments.unwrap_or(serde_json::json!({})), &context)
                    .await
                {
                    Ok(content) => {
                        tracing::info!("Tool executed successfully");
                        let response = CallToolResponse {
                            content: vec![content],
                            is_error: None,
                        };
                        JsonRpcResponse::success(
                            req.id,
                            serde_json::to_value(response).unwrap_or_default(),
                        )
                    }
                    Err(e) => {
                        tracing::error!("Tool execution failed: {}", e);
                        let response = CallToolResponse::error(format!("Error: {}", e));
                        JsonRpcResponse::success(
                            req.id,
                            serde_json::to_value(response).unwrap_or_default(),
                        )
                    }
                }
            }
            None => {
                tracing::warn!("Tool not found: {}", call_req.name);
                JsonRpcResponse::error(
                    req.id,
                    JsonRpcError::custom(-32001, format!("Tool not found: {}", call_req.name), None),
                )
            }
        }
    }
}

/// Rebindable transport half of the endpoint.
///
/// Consumes stream-oriented [`AdaptedRequest`]s, drives the dispatcher, and
/// augments responses with the session-update side channel when the caller's
/// identity was replaced.
pub struct McpTransport {
    bound_session: RwLock<Option<String>>,
    store: Arc<dyn SessionStore>,
}

impl McpTransport {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            bound_session: RwLock::new(None),
            store,
        }
    }

    /// Re-associate the transport with a different session identity without
    /// tearing down the underlying connection.
    pub fn rebind(&self, session_id: &str) {
        let mut bound = self.bound_session.write().expect("session lock poisoned");
        let previous = bound.replace(session_id.to_string());
        tracing::debug!(
            previous = previous.as_deref().unwrap_or("-"),
            session_id = %session_id,
            "Rebound transport session"
        );
    }

    pub fn bound_session_id(&self) -> Option<String> {
        self.bound_session
            .read()
            .expect("session lock poisoned")
            .clone()
    }

    /// Handle one inbound request against the given server.
    ///
    /// `session_update` carries the replacement identity minted for this
    /// request, if any; it is embedded into a success result so generic
    /// result handling still works. Returns `None` for notifications.
    pub async fn handle(
        &self,
        server: &McpServer,
        request: AdaptedRequest,
        session_update: Option<SessionUpdate>,
    ) -> Option<JsonRpcResponse> {
        let session_id = self.bound_session_id();

        // Drain the single-shot body stream the adapter produced.
        let mut body = Vec::new();
        let mut stream = request.into_body_stream();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk);
        }

        let rpc_request: JsonRpcRequest = match serde_json::from_slice(&body) {
            Ok(req) => req,
            Err(e) => {
                tracing::error!("Failed to parse JSON-RPC request: {}", e);
                return Some(JsonRpcResponse::error(None, JsonRpcError::parse_error()));
            }
        };

        let method = rpc_request.method.clone();
        let mut response = server.dispatch(rpc_request, session_id.as_deref()).await?;

        if let Some(update) = session_update {
            response = response.with_session_update(update);
        }

        // Best-effort bookkeeping: note the method served on the session
        // record. A degraded store simply skips this.
        if let Some(id) = session_id.as_deref() {
            if let Some(mut record) = self.store.get_session(id).await {
                record.record_method(&method);
                self.store.store_session(id, &record).await;
            }
        }

        Some(response)
    }
}
