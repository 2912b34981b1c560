//! Reconnecting MCP client.
//!
//! Wraps every protocol call with session-loss detection and bounded,
//! single-shot recovery, so transient infrastructure churn shows up to the
//! caller as added latency instead of failure. One client drives one session
//! context, sequentially.

use serde_json::{json, Value};
use std::fmt;

use super::recovery::RecoveryDirective;
use super::session::{ClientSessionContext, ConnectionState};
use crate::mcp::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::mcp::resolver::SESSION_ID_HEADER;

/// Errors surfaced to the caller once recovery is exhausted.
#[derive(Debug)]
pub enum ClientError {
    /// Server unreachable or request failed below the protocol layer.
    Transport(String),
    /// The server answered with a JSON-RPC error envelope.
    Rpc(JsonRpcError),
    /// The server answered, but not with valid JSON-RPC.
    InvalidResponse(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "Transport error: {}", msg),
            Self::Rpc(err) => write!(f, "RPC error {}: {}", err.code, err.message),
            Self::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
        }
    }
}

impl ClientError {
    fn directive(&self) -> Option<RecoveryDirective> {
        match self {
            Self::Rpc(err) => {
                // Some servers put detail in data.error rather than message.
                let detail = err
                    .data
                    .as_ref()
                    .and_then(|d| d.get("error"))
                    .and_then(Value::as_str);
                let message = match detail {
                    Some(detail) => format!("{} {}", err.message, detail),
                    None => err.message.clone(),
                };
                RecoveryDirective::from_error(&message, err.data.as_ref())
            }
            Self::Transport(msg) | Self::InvalidResponse(msg) => {
                RecoveryDirective::from_error(msg, None)
            }
        }
    }
}

pub struct McpClient {
    base_url: String,
    http: reqwest::Client,
    session: ClientSessionContext,
    next_id: u64,
}

impl McpClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Self::build_http_client(),
            session: ClientSessionContext::new(),
            next_id: 0,
        }
    }

    fn build_http_client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client")
    }

    pub fn session(&self) -> &ClientSessionContext {
        &self.session
    }

    /// Establish the session context: keep (or mint) an identity, run the
    /// initialize handshake, announce readiness.
    pub async fn connect(&mut self, force_new_session: bool) -> Result<(), ClientError> {
        if force_new_session || self.session.session_id.is_none() {
            self.session.session_id = Some(ClientSessionContext::random_token());
        }

        let params = json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "mcp-bridge-client",
                "version": env!("CARGO_PKG_VERSION"),
            }
        });

        match self.request_once("initialize", params).await {
            Ok(_) => {}
            // Consistent policy: an endpoint that says it is already
            // initialized is treated as successfully connected.
            Err(err) if matches!(err.directive(), Some(RecoveryDirective::AlreadyInitialized)) => {
                tracing::debug!("Endpoint already initialized, treating connect as success");
            }
            Err(err) => return Err(err),
        }

        self.session.connection_state = ConnectionState::Connected;
        tracing::info!(
            session_id = self.session.session_id.as_deref().unwrap_or("-"),
            "MCP session connected"
        );

        // Handshake convention; the server ignores it if unsupported.
        if let Err(e) = self.notify("notifications/initialized").await {
            tracing::debug!("initialized notification not delivered: {}", e);
        }

        Ok(())
    }

    /// Mark the link down. Keeps the session id so a later connect can
    /// resume the same session.
    pub fn disconnect(&mut self) {
        if self.session.is_connected() {
            tracing::info!(
                session_id = self.session.session_id.as_deref().unwrap_or("-"),
                "MCP session disconnected"
            );
        }
        self.session.connection_state = ConnectionState::Disconnected;
    }

    /// Best-effort explicit session teardown. A transport that does not
    /// support termination leaves the session marked active.
    pub async fn terminate_session(&mut self) {
        let Some(id) = self.session.session_id.clone() else {
            return;
        };

        let result = self
            .http
            .delete(format!("{}/mcp", self.base_url))
            .header(SESSION_ID_HEADER, &id)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED => {
                tracing::info!(
                    session_id = %id,
                    "Session termination unsupported by transport, leaving session active"
                );
            }
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(session_id = %id, "Session terminated");
                self.session.clear();
            }
            Ok(resp) => {
                tracing::warn!(
                    session_id = %id,
                    status = resp.status().as_u16(),
                    "Session termination attempt rejected"
                );
            }
            Err(e) => {
                tracing::warn!(session_id = %id, "Session termination attempt failed: {}", e);
            }
        }
    }

    /// Disconnect, then connect with a forced new session identity.
    pub async fn reconnect(&mut self) -> Result<(), ClientError> {
        self.disconnect();
        self.connect(true).await
    }

    /// Disconnect, forget the identity, connect fresh. A new local token is
    /// minted and the server replaces it if it is unknown there.
    pub async fn reset_session(&mut self) -> Result<(), ClientError> {
        self.disconnect();
        self.session.session_id = None;
        self.connect(false).await
    }

    /// Hard teardown of client and session state, then a fresh connect with
    /// a newly minted random token.
    pub async fn force_completely_new_session(&mut self) -> Result<(), ClientError> {
        tracing::warn!("Forcing completely new MCP session");
        self.http = Self::build_http_client();
        self.session.clear();
        self.session.session_id = Some(ClientSessionContext::random_token());
        self.connect(false).await
    }

    /// Mint a random token and connect with it.
    pub async fn connect_with_random_session(&mut self) -> Result<(), ClientError> {
        self.session.session_id = Some(ClientSessionContext::random_token());
        self.connect(false).await
    }

    /// Graceful teardown for signal-driven cancellation: one termination
    /// attempt, then transport close. Errors are logged, never escalated,
    /// and nothing here retries.
    pub async fn shutdown(&mut self) {
        self.terminate_session().await;
        self.disconnect();
    }

    /// Invoke a protocol method with session recovery around it.
    ///
    /// Recovery performs at most one extra attempt per directive; a retry
    /// failure propagates instead of being retried again. The
    /// already-initialized case alone escalates once more, through a
    /// completely new session.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value, ClientError> {
        if !self.session.is_connected() {
            self.connect(false).await?;
        }

        let first = self.request_once(method, params.clone()).await;

        let directive = match &first {
            Ok(result) => RecoveryDirective::from_result(result),
            Err(err) => err.directive(),
        };
        let Some(directive) = directive else {
            return first;
        };

        tracing::info!(?directive, method = %method, "Recovering MCP session");

        match directive {
            RecoveryDirective::SessionUpdateRequested { new_session_id, .. } => {
                self.disconnect();
                self.session.session_id = Some(new_session_id);
                self.connect(false).await?;
                self.request_once(method, params).await
            }
            RecoveryDirective::SessionReset => {
                self.force_completely_new_session().await?;
                self.request_once(method, params).await
            }
            RecoveryDirective::AlreadyInitialized => {
                match self.request_once(method, params.clone()).await {
                    Ok(result) => Ok(result),
                    Err(retry_err) => {
                        tracing::warn!(
                            "Retry after already-initialized failed ({}), escalating",
                            retry_err
                        );
                        self.force_completely_new_session().await?;
                        self.request_once(method, params).await
                    }
                }
            }
            RecoveryDirective::SessionLost => {
                self.session.session_id = None;
                self.reconnect().await?;
                self.request_once(method, params).await
            }
        }
    }

    /// Convenience wrapper for tools/call.
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value, ClientError> {
        self.call(
            "tools/call",
            json!({ "name": name, "arguments": arguments }),
        )
        .await
    }

    /// One request, no recovery. Adopts the session id the server echoes in
    /// the response header, which is how continuity survives server-side
    /// minting.
    async fn request_once(&mut self, method: &str, params: Value) -> Result<Value, ClientError> {
        self.next_id += 1;
        let request = JsonRpcRequest::new(json!(self.next_id), method, params);

        let mut builder = self
            .http
            .post(format!("{}/mcp", self.base_url))
            .json(&request);
        if let Some(id) = &self.session.session_id {
            builder = builder.header(SESSION_ID_HEADER, id);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| ClientError::Transport(format!("MCP server unreachable: {}", e)))?;

        if let Some(id) = resp
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if self.session.session_id.as_deref() != Some(id) {
                tracing::debug!(session_id = %id, "Adopted server-assigned session id");
                self.session.session_id = Some(id.to_string());
            }
        }

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ClientError::Transport(format!("Failed to read response body: {}", e)))?;

        let parsed: JsonRpcResponse = serde_json::from_str(&body).map_err(|e| {
            ClientError::InvalidResponse(format!("Not a JSON-RPC response ({}): {}", status, e))
        })?;

        if let Some(error) = parsed.error {
            return Err(ClientError::Rpc(error));
        }
        parsed
            .result
            .ok_or_else(|| ClientError::InvalidResponse("Response carried no result".to_string()))
    }

    /// Fire-and-forget notification (no id, no response expected).
    async fn notify(&mut self, method: &str) -> Result<(), ClientError> {
        let request = JsonRpcRequest::notification(method);

        let mut builder = self
            .http
            .post(format!("{}/mcp", self.base_url))
            .json(&request);
        if let Some(id) = &self.session.session_id {
            builder = builder.header(SESSION_ID_HEADER, id);
        }

        builder
            .send()
            .await
            .map_err(|e| ClientError::Transport(format!("MCP server unreachable: {}", e)))?;
        Ok(())
    }
}
