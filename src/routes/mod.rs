pub mod health_checks;
pub(crate) mod mcp;

pub use health_checks::*;
pub use mcp::{mcp_handler, mcp_probe, mcp_terminate};
