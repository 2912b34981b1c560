pub mod http;
pub mod recovery;
pub mod session;

pub use http::{ClientError, McpClient};
pub use recovery::RecoveryDirective;
pub use session::{ClientSessionContext, ConnectionState};
