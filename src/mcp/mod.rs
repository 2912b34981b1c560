pub mod adapter;
pub mod endpoint;
pub mod protocol;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod store;
pub mod tools;
pub mod transport;

pub use adapter::AdaptedRequest;
pub use endpoint::{Endpoint, EndpointError, EndpointFactory, EndpointLease, EndpointManager};
pub use protocol::*;
pub use registry::{ToolContext, ToolHandler, ToolRegistry};
pub use resolver::{resolve_session_id, SESSION_ID_HEADER, SESSION_ID_QUERY_PARAM};
pub use session::SessionRecord;
pub use store::{InMemorySessionStore, RedisSessionStore, SessionStore};
pub use transport::{McpServer, McpTransport};
