use crate::signaling::registry::ConnectionRegistry;
use huddle_protocol::ServerMessage;
use std::time::Duration;
use uuid::Uuid;

/// Two-strike liveness monitor.
///
/// Each sweep probes every connection that showed activity since the last
/// sweep and evicts every connection whose previous probe went unanswered.
/// A stale connection therefore lives for at most two intervals.
pub struct HeartbeatMonitor {
    interval: Duration,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the connections to evict; the caller runs the normal teardown
    /// path for each.
    pub fn sweep(&self, registry: &mut ConnectionRegistry) -> Vec<Uuid> {
        let mut evicted = Vec::new();

        for connection_id in registry.all_connections() {
            if registry.probe_outstanding(connection_id) {
                tracing::info!(
                    "Connection {} silent for {:?}, evicting",
                    connection_id,
                    registry.idle_for(connection_id).unwrap_or_default()
                );
                evicted.push(connection_id);
            } else {
                registry.mark_probed(connection_id);
                registry.send_to(connection_id, &ServerMessage::Ping);
            }
        }

        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn attach(registry: &mut ConnectionRegistry) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = Uuid::new_v4();
        registry.register(connection_id, tx);
        (connection_id, rx)
    }

    #[test]
    fn silent_connection_is_evicted_on_the_second_sweep() {
        let mut registry = ConnectionRegistry::new();
        let monitor = HeartbeatMonitor::new(Duration::from_secs(30));
        let (connection_id, mut rx) = attach(&mut registry);

        // First sweep: probe goes out, nothing evicted
        assert!(monitor.sweep(&mut registry).is_empty());
        let probe: huddle_protocol::ServerMessage =
            serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert!(matches!(probe, ServerMessage::Ping));

        // Second sweep with no inbound traffic in between: evicted
        assert_eq!(monitor.sweep(&mut registry), vec![connection_id]);
    }

    #[test]
    fn any_inbound_activity_resets_the_strike() {
        let mut registry = ConnectionRegistry::new();
        let monitor = HeartbeatMonitor::new(Duration::from_secs(30));
        let (connection_id, _rx) = attach(&mut registry);

        assert!(monitor.sweep(&mut registry).is_empty());
        registry.touch(connection_id);
        assert!(monitor.sweep(&mut registry).is_empty());
        assert!(monitor.sweep(&mut registry).contains(&connection_id));
    }

    #[test]
    fn responsive_connections_are_probed_every_sweep() {
        let mut registry = ConnectionRegistry::new();
        let monitor = HeartbeatMonitor::new(Duration::from_secs(30));
        let (connection_id, mut rx) = attach(&mut registry);

        for _ in 0..3 {
            assert!(monitor.sweep(&mut registry).is_empty());
            assert!(rx.try_recv().is_ok());
            registry.touch(connection_id);
        }
    }
}
