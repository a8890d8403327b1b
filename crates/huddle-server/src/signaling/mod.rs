//! The signaling plane: one coordinator task owns all mutable state
//! (connection registry, meeting store, aggregation sessions). Socket pumps
//! funnel every observable event through the command channel, so no two
//! mutations ever interleave; heartbeat sweeps and aggregation deadlines run
//! on the same task.

mod aggregator;
mod heartbeat;
mod meetings;
mod registry;
mod router;

pub use aggregator::{AnswerAggregator, Flush, RecordOutcome};
pub use heartbeat::HeartbeatMonitor;
pub use meetings::MeetingStore;
pub use registry::{ConnectionMeta, ConnectionRegistry};
pub use router::{MessageRouter, SignalError};

use crate::state::Config;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use uuid::Uuid;

#[derive(Debug)]
enum Command {
    Attach {
        connection_id: Uuid,
        sender: mpsc::UnboundedSender<String>,
    },
    Frame {
        connection_id: Uuid,
        text: String,
    },
    Touch {
        connection_id: Uuid,
    },
    Closed {
        connection_id: Uuid,
    },
}

/// Cheap cloneable handle the transport layer uses to feed the coordinator.
#[derive(Clone)]
pub struct SignalingHub {
    tx: mpsc::UnboundedSender<Command>,
}

impl SignalingHub {
    /// Spawns the coordinator task. Must be called within a Tokio runtime.
    pub fn spawn(config: &Config) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let router = MessageRouter::new(config.answer_window);
        let monitor = HeartbeatMonitor::new(config.heartbeat_interval);

        tokio::spawn(run(rx, router, monitor));

        Self { tx }
    }

    pub fn attach(&self, connection_id: Uuid, sender: mpsc::UnboundedSender<String>) {
        let _ = self.tx.send(Command::Attach {
            connection_id,
            sender,
        });
    }

    pub fn frame(&self, connection_id: Uuid, text: String) {
        let _ = self.tx.send(Command::Frame {
            connection_id,
            text,
        });
    }

    /// Records transport-level activity (ws ping/pong frames).
    pub fn touch(&self, connection_id: Uuid) {
        let _ = self.tx.send(Command::Touch { connection_id });
    }

    pub fn closed(&self, connection_id: Uuid) {
        let _ = self.tx.send(Command::Closed { connection_id });
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<Command>,
    mut router: MessageRouter,
    monitor: HeartbeatMonitor,
) {
    let mut probe = time::interval_at(Instant::now() + monitor.interval(), monitor.interval());
    probe.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let next_flush = router.next_flush_deadline();

        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Attach { connection_id, sender }) => {
                    router.attach(connection_id, sender);
                }
                Some(Command::Frame { connection_id, text }) => {
                    router.handle_frame(connection_id, &text);
                }
                Some(Command::Touch { connection_id }) => {
                    router.touch(connection_id);
                }
                Some(Command::Closed { connection_id }) => {
                    router.teardown(connection_id);
                }
                None => break,
            },
            _ = probe.tick() => {
                for connection_id in monitor.sweep(&mut router.registry) {
                    router.teardown(connection_id);
                }
            }
            _ = time::sleep_until(next_flush.unwrap_or_else(Instant::now)), if next_flush.is_some() => {
                router.flush_due(Instant::now());
            }
        }
    }

    tracing::debug!("Signaling coordinator stopped");
}
