use crate::services::{meeting::MeetingDirectory, user::UserDirectory};
use crate::signaling::SignalingHub;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub bind_address: String,
    /// Interval between liveness probes; a connection silent across two
    /// consecutive probes is evicted.
    pub heartbeat_interval: Duration,
    /// How long a joiner's offer fan-out waits for answers before flushing
    /// a partial result.
    pub answer_window: Duration,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        // Load from environment variables with sensible defaults
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let heartbeat_interval = std::env::var("HEARTBEAT_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(30));

        let answer_window = std::env::var("ANSWER_WINDOW_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(3000));

        Ok(Config {
            bind_address,
            heartbeat_interval,
            answer_window,
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub hub: SignalingHub,
    pub user_directory: UserDirectory,
    pub meeting_directory: MeetingDirectory,
}

impl AppState {
    /// Must be called within a Tokio runtime; spawns the signaling
    /// coordinator task.
    pub fn new(config: Config) -> Self {
        let hub = SignalingHub::spawn(&config);

        Self {
            config,
            hub,
            user_directory: UserDirectory::new(),
            meeting_directory: MeetingDirectory::new(),
        }
    }
}
