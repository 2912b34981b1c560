use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Persisted session record.
///
/// One record per session token, stored as JSON in the session store with a
/// bounded TTL. A record is addressable by its token alone; a missing record
/// and an expired one are indistinguishable and both mean "unknown".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub status: String,
    pub created: DateTime<Utc>,
    #[serde(rename = "lastAccessed", skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
    /// Last protocol method invoked within this session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Open string-keyed metadata, kept flat alongside the fixed fields.
    #[serde(flatten)]
    pub metadata: HashMap<String, Value>,
}

impl SessionRecord {
    pub fn new() -> Self {
        Self {
            status: "active".to_string(),
            created: Utc::now(),
            last_accessed: None,
            method: None,
            metadata: HashMap::new(),
        }
    }

    /// Refresh the last-accessed timestamp.
    pub fn touch(&mut self) {
        self.last_accessed = Some(Utc::now());
    }

    /// Note the protocol method just served and refresh last-accessed.
    pub fn record_method(&mut self, method: &str) {
        self.method = Some(method.to_string());
        self.touch();
    }
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_with_wire_field_names() {
        let mut record = SessionRecord::new();
        record.record_method("tools/list");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "active");
        assert!(json.get("created").is_some());
        assert!(json.get("lastAccessed").is_some());
        assert_eq!(json["method"], "tools/list");
    }

    #[test]
    fn metadata_stays_flat_in_the_serialized_record() {
        let mut record = SessionRecord::new();
        record
            .metadata
            .insert("client".to_string(), serde_json::json!("inspector"));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["client"], "inspector");

        let back: SessionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.metadata.get("client"), Some(&serde_json::json!("inspector")));
    }
}
