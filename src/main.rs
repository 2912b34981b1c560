use mcp_bridge::configuration::get_configuration;
use mcp_bridge::mcp::RedisSessionStore;
use mcp_bridge::startup::run;
use mcp_bridge::telemetry::{get_subscriber, init_subscriber};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let subscriber = get_subscriber("mcp-bridge".into(), "info".into());
    init_subscriber(subscriber);

    let settings = get_configuration().expect("Failed to read configuration.");

    tracing::info!(
        redis_host = %settings.redis.host,
        redis_port = settings.redis.port,
        "Connecting to Redis"
    );

    let store = RedisSessionStore::new(
        &settings.redis.connection_string(),
        Duration::from_secs(settings.mcp.session_ttl_seconds),
        Duration::from_secs(settings.mcp.store_timeout_seconds),
    )
    .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;

    let address = format!("{}:{}", settings.app_host, settings.app_port);
    tracing::info!("Start server at {:?}", &address);
    let listener =
        TcpListener::bind(address).expect(&format!("failed to bind to {}", settings.app_port));

    run(listener, Arc::new(store), settings).await?.await
}
