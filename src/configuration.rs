use serde;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Settings {
    pub app_port: u16,
    pub app_host: String,
    pub redis: RedisSettings,
    pub mcp: McpSettings,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub db: i64,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct McpSettings {
    /// Name advertised in the initialize handshake.
    pub server_name: String,
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,
    #[serde(default = "default_store_timeout_seconds")]
    pub store_timeout_seconds: u64,
}

fn default_session_ttl_seconds() -> u64 {
    crate::mcp::store::DEFAULT_SESSION_TTL_SECONDS
}

fn default_store_timeout_seconds() -> u64 {
    crate::mcp::store::DEFAULT_STORE_TIMEOUT_SECONDS
}

impl RedisSettings {
    // Connection string: redis://<host>:<port>/<db>
    // REDIS_URL overrides the file-based settings wholesale.
    pub fn connection_string(&self) -> String {
        std::env::var("REDIS_URL")
            .unwrap_or_else(|_| format!("redis://{}:{}/{}", self.host, self.port, self.db))
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize our configuration reader
    let mut settings = config::Config::default();

    // Add configuration values from a file named `configuration`
    // with the .yaml extension
    settings.merge(config::File::with_name("configuration"))?; // .json, .toml, .yaml, .yml

    // Try to convert the configuration values it read into
    // our Settings type
    settings.try_deserialize()
}
