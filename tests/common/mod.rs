use mcp_bridge::configuration::{McpSettings, RedisSettings, Settings};
use mcp_bridge::mcp::{InMemorySessionStore, SessionStore};
use std::sync::Arc;

pub struct TestApp {
    pub address: String,
    pub store: Arc<InMemorySessionStore>,
}

pub async fn spawn_app() -> TestApp {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let store = Arc::new(InMemorySessionStore::new());
    let settings = Settings {
        app_host: "127.0.0.1".to_string(),
        app_port: port,
        redis: RedisSettings {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
        },
        mcp: McpSettings {
            server_name: "mcp-bridge-test".to_string(),
            session_ttl_seconds: 3600,
            store_timeout_seconds: 2,
        },
    };

    let server = mcp_bridge::startup::run(
        listener,
        store.clone() as Arc<dyn SessionStore>,
        settings,
    )
    .await
    .expect("Failed to bind address.");

    let _ = tokio::spawn(server);

    TestApp { address, store }
}
