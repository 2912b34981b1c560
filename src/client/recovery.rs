//! Session-loss classification.
//!
//! Under an execution model where the process backing a "connection" may be
//! recycled at any time, "session lost" is a normal, recoverable condition.
//! Every protocol outcome is mapped here to a single machine-readable
//! [`RecoveryDirective`]; the retry driver in the client matches on the enum
//! only. Structured signals are authoritative; free-text phrase matching is
//! the fallback when no structured signal is present, and it lives nowhere
//! but this module.

use serde_json::Value;

use crate::mcp::protocol::{SessionUpdate, SESSION_UPDATE_FIELD};

/// Error-payload field some servers set when they want the client to start
/// over with a completely new session.
pub const RESET_FLAG_FIELD: &str = "resetRequested";

const ALREADY_INITIALIZED_PHRASE: &str = "already initialized";
const SESSION_LOST_PHRASES: &[&str] = &["not initialized", "session not found"];

/// What a protocol outcome asks the client to do about its session.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryDirective {
    /// A success result carried the session-update side channel: the server
    /// replaced our identity and told us the new one.
    SessionUpdateRequested {
        old_session_id: Option<String>,
        new_session_id: String,
    },
    /// The server explicitly requested a reset: discard everything and start
    /// a completely new session.
    SessionReset,
    /// The session evaporated (recycled backend, expired record); reconnect
    /// with a fresh identity.
    SessionLost,
    /// The endpoint claims a session already exists. Usually benign; worth
    /// one as-is retry before escalating.
    AlreadyInitialized,
}

impl RecoveryDirective {
    /// Inspect a success result for the session-update side channel.
    pub fn from_result(result: &Value) -> Option<Self> {
        let update = result.get(SESSION_UPDATE_FIELD)?;
        let update: SessionUpdate = serde_json::from_value(update.clone()).ok()?;
        Some(Self::SessionUpdateRequested {
            old_session_id: update.old_session_id,
            new_session_id: update.new_session_id,
        })
    }

    /// Classify an error by its structured data first, then its text.
    pub fn from_error(message: &str, data: Option<&Value>) -> Option<Self> {
        if let Some(data) = data {
            if data.get(RESET_FLAG_FIELD).and_then(Value::as_bool) == Some(true) {
                return Some(Self::SessionReset);
            }
        }

        // Some servers encode a machine-readable object inside an otherwise
        // free-text error message.
        if let Some(embedded) = embedded_json_object(message) {
            if embedded.get(RESET_FLAG_FIELD).and_then(Value::as_bool) == Some(true) {
                return Some(Self::SessionReset);
            }
        }

        let lowered = message.to_lowercase();
        if lowered.contains(ALREADY_INITIALIZED_PHRASE) {
            return Some(Self::AlreadyInitialized);
        }
        if SESSION_LOST_PHRASES
            .iter()
            .any(|phrase| lowered.contains(phrase))
        {
            return Some(Self::SessionLost);
        }

        None
    }
}

/// Best-effort extraction of a JSON object embedded in free text.
fn embedded_json_object(message: &str) -> Option<Value> {
    let start = message.find('{')?;
    let end = message.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&message[start..=end]).ok()
}
