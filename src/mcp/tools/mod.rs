pub mod diagnostics;

pub use diagnostics::{EchoTool, SessionInfoTool};

use super::registry::ToolRegistry;

/// Register the built-in diagnostic tools. Business tools are registered by
/// the embedding application alongside these.
pub fn register_defaults(registry: &mut ToolRegistry) {
    registry.register("echo", Box::new(EchoTool));
    registry.register("session_info", Box::new(SessionInfoTool));
}
