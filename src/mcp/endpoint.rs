//! Endpoint ownership and session continuity.
//!
//! One live endpoint (server + transport pair) serves every inbound request
//! in the process. The manager initializes it lazily behind a shared guard,
//! resolves the caller-presented session id against the session store, and
//! rebinds the endpoint's active identity per request, minting a
//! replacement id when the presented one is unknown or expired.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

use super::protocol::{JsonRpcError, JsonRpcResponse, SessionUpdate};
use super::registry::ToolRegistry;
use super::store::SessionStore;
use super::transport::{McpServer, McpTransport};
use crate::configuration::McpSettings;

/// Errors on the endpoint lifecycle path.
///
/// Store failures never appear here: an unreachable store degrades to
/// "session unknown" and the request proceeds.
#[derive(Debug)]
pub enum EndpointError {
    /// Endpoint construction failed. Fatal for the current request only;
    /// the initialization guard resets so the next request retries.
    InitializationFailed(String),
}

impl fmt::Display for EndpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed(msg) => write!(f, "Endpoint initialization failed: {}", msg),
        }
    }
}

impl ResponseError for EndpointError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(JsonRpcResponse::error(
            None,
            JsonRpcError::server_error(&self.to_string()),
        ))
    }

    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// The one live server + transport pair.
pub struct Endpoint {
    pub server: Arc<McpServer>,
    pub transport: Arc<McpTransport>,
}

/// Builds the endpoint. Injected into the manager so tests can substitute a
/// counting or failing stand-in.
#[async_trait]
pub trait EndpointFactory: Send + Sync {
    async fn build(&self) -> Result<Endpoint, EndpointError>;
}

/// Production factory: registers the supplied tool registry on a new server
/// and connects it to a fresh transport.
pub struct DefaultEndpointFactory {
    registry: Arc<ToolRegistry>,
    store: Arc<dyn SessionStore>,
    server_name: String,
}

#[async_trait]
impl EndpointFactory for DefaultEndpointFactory {
    async fn build(&self) -> Result<Endpoint, EndpointError> {
        let server = Arc::new(McpServer::new(
            self.registry.clone(),
            self.store.clone(),
            self.server_name.clone(),
        ));
        let transport = Arc::new(McpTransport::new(self.store.clone()));

        server.connect_transport(transport.clone());
        if !server.is_connected() {
            return Err(EndpointError::InitializationFailed(
                "server failed to connect to transport".to_string(),
            ));
        }

        tracing::info!(
            server_name = %self.server_name,
            tools = self.registry.count(),
            "MCP endpoint initialized"
        );

        Ok(Endpoint { server, transport })
    }
}

/// Outcome of resolving a request against the endpoint: the endpoint itself
/// plus what happened to the caller's session identity.
pub struct EndpointLease {
    pub endpoint: Arc<Endpoint>,
    pub is_new_session: bool,
    pub new_session_id: Option<String>,
    /// The id the caller presented, stale or not.
    pub presented_session_id: Option<String>,
}

impl EndpointLease {
    /// The identity this request is served under.
    pub fn active_session_id(&self) -> Option<&str> {
        self.new_session_id
            .as_deref()
            .or(self.presented_session_id.as_deref())
    }

    /// Side-channel payload for the response, present when a replacement id
    /// was minted for this request.
    pub fn session_update(&self) -> Option<SessionUpdate> {
        if !self.is_new_session {
            return None;
        }
        self.new_session_id.as_ref().map(|new_id| SessionUpdate {
            old_session_id: self.presented_session_id.clone(),
            new_session_id: new_id.clone(),
        })
    }

    /// Run one adapted request through the leased endpoint.
    pub async fn handle(
        &self,
        request: super::adapter::AdaptedRequest,
    ) -> Option<JsonRpcResponse> {
        self.endpoint
            .transport
            .handle(&self.endpoint.server, request, self.session_update())
            .await
    }
}

/// Process-wide owner of the shared endpoint.
///
/// Constructed explicitly with its dependencies; the HTTP app holds one
/// instance in shared state, tests build their own with an in-memory store.
pub struct EndpointManager {
    store: Arc<dyn SessionStore>,
    factory: Arc<dyn EndpointFactory>,
    endpoint: OnceCell<Arc<Endpoint>>,
    /// Serializes session resolution + rebind across concurrent requests,
    /// so two requests carrying different ids queue instead of racing the
    /// one shared binding.
    rebind_lock: Mutex<()>,
}

impl EndpointManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        registry: Arc<ToolRegistry>,
        settings: &McpSettings,
    ) -> Self {
        let factory = Arc::new(DefaultEndpointFactory {
            registry,
            store: store.clone(),
            server_name: settings.server_name.clone(),
        });
        Self::with_factory(store, factory)
    }

    pub fn with_factory(store: Arc<dyn SessionStore>, factory: Arc<dyn EndpointFactory>) -> Self {
        Self {
            store,
            factory,
            endpoint: OnceCell::new(),
            rebind_lock: Mutex::new(()),
        }
    }

    /// One-time lazy initialization. Concurrent first callers all await the
    /// same attempt; exactly one build runs. A failed attempt leaves the
    /// guard empty so the next call retries from scratch.
    async fn ensure_endpoint(&self) -> Result<Arc<Endpoint>, EndpointError> {
        self.endpoint
            .get_or_try_init(|| async {
                tracing::info!("Initializing shared MCP endpoint");
                self.factory.build().await.map(Arc::new)
            })
            .await
            .cloned()
    }

    /// Resolve a request's session identity and hand out the endpoint.
    ///
    /// A known id refreshes its record and rebinds the endpoint when needed.
    /// An unknown, expired, or absent id mints a replacement; the caller
    /// learns about it through the lease.
    pub async fn acquire(&self, session_id: Option<&str>) -> Result<EndpointLease, EndpointError> {
        let endpoint = self.ensure_endpoint().await?;

        let _rebind = self.rebind_lock.lock().await;

        match session_id {
            Some(id) => {
                if let Some(mut record) = self.store.get_session(id).await {
                    record.touch();
                    self.store.store_session(id, &record).await;

                    if endpoint.transport.bound_session_id().as_deref() != Some(id) {
                        endpoint.transport.rebind(id);
                    }

                    Ok(EndpointLease {
                        endpoint,
                        is_new_session: false,
                        new_session_id: None,
                        presented_session_id: Some(id.to_string()),
                    })
                } else {
                    let new_id = self.store.create_new_session().await;
                    tracing::info!(
                        presented = %id,
                        new_session_id = %new_id,
                        "Unknown or expired session id, minted replacement"
                    );
                    endpoint.transport.rebind(&new_id);

                    Ok(EndpointLease {
                        endpoint,
                        is_new_session: true,
                        new_session_id: Some(new_id),
                        presented_session_id: Some(id.to_string()),
                    })
                }
            }
            None => {
                let new_id = self.store.create_new_session().await;
                endpoint.transport.rebind(&new_id);

                Ok(EndpointLease {
                    endpoint,
                    is_new_session: true,
                    new_session_id: Some(new_id),
                    presented_session_id: None,
                })
            }
        }
    }

    /// Aggregate store reachability, initialization state, and connectedness
    /// into one diagnostic string. No side effects: a probe never triggers
    /// initialization.
    pub async fn check_server_status(&self) -> String {
        if let Err(e) = self.store.ping().await {
            tracing::warn!("Status probe: session store unreachable: {}", e);
            return "Redis disconnected".to_string();
        }

        match self.endpoint.get() {
            None => "Server not initialized".to_string(),
            Some(endpoint) => {
                if !endpoint.server.has_transport() {
                    "Transport not initialized".to_string()
                } else if !endpoint.server.is_connected() {
                    "Server not connected to transport".to_string()
                } else {
                    "OK".to_string()
                }
            }
        }
    }
}
