//! Session persistence.
//!
//! Keeps session records in Redis with TTL expiration so a short-lived,
//! request-scoped process can present one continuous protocol session per
//! client. Persistence here is an optimization, not a correctness
//! requirement for a single request: when the store is unreachable, lookups
//! degrade to "session unknown" and writes are dropped after logging.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::timeout;

use super::session::SessionRecord;

/// Key namespace for persisted session records.
const SESSION_KEY_PREFIX: &str = "mcp:session:";

/// Default record TTL (1 hour), reset on every write.
pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 3600;

/// Default per-operation store timeout. A slow store must not stall the
/// request path; timeout is treated as store-unavailable.
pub const DEFAULT_STORE_TIMEOUT_SECONDS: u64 = 2;

fn session_key(id: &str) -> String {
    format!("{}{}", SESSION_KEY_PREFIX, id)
}

/// External key-value persistence for session records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up a session record. Returns `None` both for unknown ids and
    /// when the store is unreachable; absence and expiry are
    /// indistinguishable by design.
    async fn get_session(&self, id: &str) -> Option<SessionRecord>;

    /// Upsert a record, resetting its TTL. Best-effort: failures are logged
    /// and never propagated to the request path.
    async fn store_session(&self, id: &str, record: &SessionRecord);

    /// Enumerate all live (non-expired) session ids under the namespace.
    async fn list_sessions(&self) -> Vec<String>;

    /// Mint a fresh opaque token and store its initial record. The token is
    /// generated locally, so this succeeds even when the initial write is
    /// dropped by an unreachable store.
    async fn create_new_session(&self) -> String;

    /// Reachability probe for status diagnostics.
    async fn ping(&self) -> Result<(), String>;
}

/// Redis-backed session store.
pub struct RedisSessionStore {
    client: redis::Client,
    ttl: Duration,
    op_timeout: Duration,
}

impl RedisSessionStore {
    pub fn new(redis_url: &str, ttl: Duration, op_timeout: Duration) -> Result<Self, String> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| format!("Failed to open Redis client: {}", e))?;

        Ok(Self {
            client,
            ttl,
            op_timeout,
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, String> {
        match timeout(self.op_timeout, self.client.get_multiplexed_async_connection()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(format!("Redis connection error: {}", e)),
            Err(_) => Err("Redis connection timed out".to_string()),
        }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get_session(&self, id: &str) -> Option<SessionRecord> {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(session_id = %id, "Session lookup degraded to unknown: {}", e);
                return None;
            }
        };

        let raw: Option<String> =
            match timeout(self.op_timeout, conn.get::<_, Option<String>>(session_key(id))).await {
                Ok(Ok(value)) => value,
                Ok(Err(e)) => {
                    tracing::warn!(session_id = %id, "Redis get error: {}", e);
                    return None;
                }
                Err(_) => {
                    tracing::warn!(session_id = %id, "Redis get timed out");
                    return None;
                }
            };

        raw.and_then(|json| match serde_json::from_str(&json) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::error!(session_id = %id, "Corrupt session record discarded: {}", e);
                None
            }
        })
    }

    async fn store_session(&self, id: &str, record: &SessionRecord) {
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(session_id = %id, "Session record serialization failed: {}", e);
                return;
            }
        };

        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(session_id = %id, "Session write dropped: {}", e);
                return;
            }
        };

        match timeout(
            self.op_timeout,
            conn.set_ex::<_, _, ()>(session_key(id), json, self.ttl.as_secs()),
        )
        .await
        {
            Ok(Ok(())) => {
                tracing::debug!(session_id = %id, ttl_seconds = self.ttl.as_secs(), "Stored session record");
            }
            Ok(Err(e)) => tracing::warn!(session_id = %id, "Redis set error: {}", e),
            Err(_) => tracing::warn!(session_id = %id, "Redis set timed out"),
        }
    }

    async fn list_sessions(&self) -> Vec<String> {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Session listing unavailable: {}", e);
                return vec![];
            }
        };

        let keys: Vec<String> = match timeout(
            self.op_timeout,
            conn.keys::<_, Vec<String>>(format!("{}*", SESSION_KEY_PREFIX)),
        )
        .await
        {
            Ok(Ok(keys)) => keys,
            Ok(Err(e)) => {
                tracing::warn!("Redis keys error: {}", e);
                return vec![];
            }
            Err(_) => {
                tracing::warn!("Redis keys timed out");
                return vec![];
            }
        };

        keys.into_iter()
            .filter_map(|key| key.strip_prefix(SESSION_KEY_PREFIX).map(str::to_string))
            .collect()
    }

    async fn create_new_session(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.store_session(&id, &SessionRecord::new()).await;
        tracing::info!(session_id = %id, "Created new session");
        id
    }

    async fn ping(&self) -> Result<(), String> {
        let mut conn = self.connection().await?;
        match timeout(
            self.op_timeout,
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(format!("Redis ping error: {}", e)),
            Err(_) => Err("Redis ping timed out".to_string()),
        }
    }
}

struct StoredSession {
    record: SessionRecord,
    expires_at: Instant,
}

/// In-memory session store with the same TTL semantics as the Redis one.
/// Used as the store stand-in in tests; also usable as a single-process
/// fallback when no external store is configured.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_session(&self, id: &str) -> Option<SessionRecord> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(id) {
            Some(stored) if Instant::now() < stored.expires_at => Some(stored.record.clone()),
            Some(_) => {
                // Expired: drop the entry so it reads exactly like "never existed".
                sessions.remove(id);
                None
            }
            None => None,
        }
    }

    async fn store_session(&self, id: &str, record: &SessionRecord) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            id.to_string(),
            StoredSession {
                record: record.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    async fn list_sessions(&self) -> Vec<String> {
        let now = Instant::now();
        self.sessions
            .read()
            .await
            .iter()
            .filter(|(_, stored)| now < stored.expires_at)
            .map(|(id, _)| id.clone())
            .collect()
    }

    async fn create_new_session(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.store_session(&id, &SessionRecord::new()).await;
        id
    }

    async fn ping(&self) -> Result<(), String> {
        Ok(())
    }
}
