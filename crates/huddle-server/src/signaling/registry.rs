use huddle_protocol::ServerMessage;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct ConnectionMeta {
    pub user_id: Option<String>,
    pub meeting_id: Option<String>,
}

struct ConnectionEntry {
    /// Outbound queue; dropping it closes the socket pump for this connection
    sender: mpsc::UnboundedSender<String>,
    user_id: Option<String>,
    meeting_id: Option<String>,
    last_activity: Instant,
    probe_pending: bool,
}

/// Source of truth for live connections and their bound identities.
///
/// Exclusively owns the outbound senders. Lookups for absent connections or
/// users are empty results, never errors; callers treat "target offline" as a
/// normal outcome.
pub struct ConnectionRegistry {
    connections: HashMap<Uuid, ConnectionEntry>,
    /// Reverse index, at most one live connection per user (latest-wins)
    user_connections: HashMap<String, Uuid>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            user_connections: HashMap::new(),
        }
    }

    pub fn register(&mut self, connection_id: Uuid, sender: mpsc::UnboundedSender<String>) {
        self.connections.insert(
            connection_id,
            ConnectionEntry {
                sender,
                user_id: None,
                meeting_id: None,
                last_activity: Instant::now(),
                probe_pending: false,
            },
        );

        tracing::debug!("Connection {} registered", connection_id);
    }

    /// Idempotent. Also removes the reverse user mapping, but only if this
    /// connection still owns it (a later register may have superseded it).
    pub fn unregister(&mut self, connection_id: Uuid) {
        let Some(entry) = self.connections.remove(&connection_id) else {
            return;
        };

        if let Some(user_id) = &entry.user_id {
            if self.user_connections.get(user_id) == Some(&connection_id) {
                self.user_connections.remove(user_id);
            }
        }

        tracing::debug!("Connection {} unregistered", connection_id);
    }

    /// Binds a user identity, superseding any prior binding for that user id.
    /// The superseded connection stays open but is no longer addressable by
    /// the user id.
    pub fn bind_user(&mut self, connection_id: Uuid, user_id: &str) {
        let Some(entry) = self.connections.get_mut(&connection_id) else {
            return;
        };

        // Re-registering under a new identity releases the old one
        if let Some(previous) = entry.user_id.take() {
            if previous != user_id && self.user_connections.get(&previous) == Some(&connection_id)
            {
                self.user_connections.remove(&previous);
            }
        }

        entry.user_id = Some(user_id.to_string());
        self.user_connections
            .insert(user_id.to_string(), connection_id);
    }

    pub fn bind_meeting(&mut self, connection_id: Uuid, meeting_id: Option<String>) {
        if let Some(entry) = self.connections.get_mut(&connection_id) {
            entry.meeting_id = meeting_id;
        }
    }

    pub fn connection_of(&self, user_id: &str) -> Option<Uuid> {
        self.user_connections.get(user_id).copied()
    }

    pub fn meta_of(&self, connection_id: Uuid) -> Option<ConnectionMeta> {
        self.connections.get(&connection_id).map(|e| ConnectionMeta {
            user_id: e.user_id.clone(),
            meeting_id: e.meeting_id.clone(),
        })
    }

    /// Snapshot of all live connection ids; order is not meaningful.
    pub fn all_connections(&self) -> Vec<Uuid> {
        self.connections.keys().copied().collect()
    }

    /// Records inbound activity, clearing any outstanding liveness probe.
    pub fn touch(&mut self, connection_id: Uuid) {
        if let Some(entry) = self.connections.get_mut(&connection_id) {
            entry.last_activity = Instant::now();
            entry.probe_pending = false;
        }
    }

    pub fn probe_outstanding(&self, connection_id: Uuid) -> bool {
        self.connections
            .get(&connection_id)
            .map(|e| e.probe_pending)
            .unwrap_or(false)
    }

    pub fn mark_probed(&mut self, connection_id: Uuid) {
        if let Some(entry) = self.connections.get_mut(&connection_id) {
            entry.probe_pending = true;
        }
    }

    pub fn idle_for(&self, connection_id: Uuid) -> Option<std::time::Duration> {
        self.connections
            .get(&connection_id)
            .map(|e| e.last_activity.elapsed())
    }

    /// Queues a message for one connection. Returns false if the connection
    /// is gone or its pump has shut down.
    pub fn send_to(&self, connection_id: Uuid, message: &ServerMessage) -> bool {
        let Some(entry) = self.connections.get(&connection_id) else {
            return false;
        };

        let json = match serde_json::to_string(message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!("Failed to serialize message: {}", e);
                return false;
            }
        };

        entry.sender.send(json).is_ok()
    }

    pub fn send_to_user(&self, user_id: &str, message: &ServerMessage) -> bool {
        match self.connection_of(user_id) {
            Some(connection_id) => self.send_to(connection_id, message),
            None => false,
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attach(registry: &mut ConnectionRegistry) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = Uuid::new_v4();
        registry.register(connection_id, tx);
        (connection_id, rx)
    }

    #[test]
    fn latest_register_wins_for_a_user() {
        let mut registry = ConnectionRegistry::new();
        let (first, _rx1) = attach(&mut registry);
        let (second, _rx2) = attach(&mut registry);

        registry.bind_user(first, "u1");
        registry.bind_user(second, "u1");

        assert_eq!(registry.connection_of("u1"), Some(second));
        // The superseded connection is still alive, just not addressable
        assert!(registry.meta_of(first).is_some());
    }

    #[test]
    fn unregister_of_superseded_connection_keeps_new_binding() {
        let mut registry = ConnectionRegistry::new();
        let (first, _rx1) = attach(&mut registry);
        let (second, _rx2) = attach(&mut registry);

        registry.bind_user(first, "u1");
        registry.bind_user(second, "u1");
        registry.unregister(first);

        assert_eq!(registry.connection_of("u1"), Some(second));
    }

    #[test]
    fn unregister_removes_owned_binding_and_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let (connection_id, _rx) = attach(&mut registry);
        registry.bind_user(connection_id, "u1");

        registry.unregister(connection_id);
        assert_eq!(registry.connection_of("u1"), None);
        assert!(registry.meta_of(connection_id).is_none());

        // No-op on an absent connection
        registry.unregister(connection_id);
    }

    #[test]
    fn rebinding_a_connection_to_a_new_user_releases_the_old_id() {
        let mut registry = ConnectionRegistry::new();
        let (connection_id, _rx) = attach(&mut registry);

        registry.bind_user(connection_id, "u1");
        registry.bind_user(connection_id, "u2");

        assert_eq!(registry.connection_of("u1"), None);
        assert_eq!(registry.connection_of("u2"), Some(connection_id));
    }

    #[test]
    fn send_to_absent_connection_reports_unreachable() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.send_to(Uuid::new_v4(), &ServerMessage::Pong));
        assert!(!registry.send_to_user("nobody", &ServerMessage::Pong));
    }

    #[test]
    fn touch_clears_an_outstanding_probe() {
        let mut registry = ConnectionRegistry::new();
        let (connection_id, _rx) = attach(&mut registry);

        registry.mark_probed(connection_id);
        assert!(registry.probe_outstanding(connection_id));

        registry.touch(connection_id);
        assert!(!registry.probe_outstanding(connection_id));
    }
}
