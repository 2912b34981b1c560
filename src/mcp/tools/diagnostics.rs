//! Built-in diagnostic tools.
//!
//! These exist so the tool surface is exercisable end to end without any
//! external service: `echo` round-trips an argument, `session_info` reports
//! the session the endpoint is currently bound to.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::mcp::protocol::{Tool, ToolContent};
use crate::mcp::registry::{ToolContext, ToolHandler};
use crate::mcp::store::SessionStore;

/// Return the supplied message unchanged.
pub struct EchoTool;

#[async_trait]
impl ToolHandler for EchoTool {
    async fn execute(&self, args: Value, _context: &ToolContext) -> Result<ToolContent, String> {
        #[derive(Deserialize)]
        struct Args {
            message: String,
        }

        let params: Args =
            serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {}", e))?;

        Ok(ToolContent::Text {
            text: params.message,
        })
    }

    fn schema(&self) -> Tool {
        Tool {
            name: "echo".to_string(),
            description: "Echo the supplied message back to the caller".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string" }
                },
                "required": ["message"]
            }),
        }
    }
}

/// Report the currently bound session and its persisted record.
pub struct SessionInfoTool;

#[async_trait]
impl ToolHandler for SessionInfoTool {
    async fn execute(&self, _args: Value, context: &ToolContext) -> Result<ToolContent, String> {
        let Some(session_id) = context.session_id.as_deref() else {
            return Ok(ToolContent::Text {
                text: json!({ "session": null }).to_string(),
            });
        };

        let info = match context.store.get_session(session_id).await {
            Some(record) => json!({
                "session": {
                    "id": session_id,
                    "status": record.status,
                    "created": record.created,
                    "lastAccessed": record.last_accessed,
                    "method": record.method,
                }
            }),
            // The record may have expired between rebind and execution.
            None => json!({ "session": { "id": session_id, "status": "unknown" } }),
        };

        Ok(ToolContent::Text {
            text: info.to_string(),
        })
    }

    fn schema(&self) -> Tool {
        Tool {
            name: "session_info".to_string(),
            description: "Describe the session this request is bound to".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        }
    }
}
