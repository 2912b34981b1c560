use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::protocol::{Tool, ToolContent};
use super::store::SessionStore;

/// Context passed to tool handlers
pub struct ToolContext {
    /// Session identity the endpoint is currently bound to, if any.
    pub session_id: Option<String>,
    pub store: Arc<dyn SessionStore>,
}

/// Trait for tool handlers
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool with given arguments
    async fn execute(&self, args: Value, context: &ToolContext) -> Result<ToolContent, String>;

    /// Return the tool schema definition
    fn schema(&self) -> Tool;
}

/// Tool registry managing all available MCP tools.
///
/// Business tools are registered once, before the registry is handed to the
/// endpoint; the continuity layer itself never adds tools at runtime.
pub struct ToolRegistry {
    handlers: HashMap<String, Box<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a tool handler
    pub fn register(&mut self, name: &str, handler: Box<dyn ToolHandler>) {
        self.handlers.insert(name.to_string(), handler);
    }

    /// Get a tool handler by name
    pub fn get(&self, name: &str) -> Option<&dyn ToolHandler> {
        self.handlers.get(name).map(Box::as_ref)
    }

    /// List all available tools, in stable name order
    pub fn list_tools(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.handlers.values().map(|h| h.schema()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Check if a tool exists
    pub fn has_tool(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Get count of registered tools
    pub fn count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
