use rand::distributions::Alphanumeric;
use rand::Rng;

/// Client-side view of the transport link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// The client's single mutable session context.
///
/// Created on connect, cleared on disconnect/reset, replaced wholesale on
/// reconnect-with-new-session. Used sequentially: one context never carries
/// concurrent in-flight requests.
#[derive(Debug, Clone)]
pub struct ClientSessionContext {
    pub session_id: Option<String>,
    pub connection_state: ConnectionState,
}

impl ClientSessionContext {
    pub fn new() -> Self {
        Self {
            session_id: None,
            connection_state: ConnectionState::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }

    /// Drop identity and connection state together.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Opaque client-minted session token, used when forcing a completely
    /// new session before the server has assigned one.
    pub fn random_token() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect()
    }
}

impl Default for ClientSessionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected_without_identity() {
        let context = ClientSessionContext::new();
        assert!(!context.is_connected());
        assert!(context.session_id.is_none());
    }

    #[test]
    fn clear_resets_the_whole_context() {
        let mut context = ClientSessionContext::new();
        context.session_id = Some("token".to_string());
        context.connection_state = ConnectionState::Connected;

        context.clear();

        assert!(context.session_id.is_none());
        assert!(!context.is_connected());
    }

    #[test]
    fn random_tokens_are_distinct_and_opaque() {
        let first = ClientSessionContext::random_token();
        let second = ClientSessionContext::random_token();

        assert_eq!(first.len(), 32);
        assert_ne!(first, second);
    }
}
