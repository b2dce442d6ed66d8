pub mod api;
pub mod doctor;
pub mod link;
pub mod media;
pub mod session;
pub mod transport;

pub use link::{Link, LinkEvent, LinkHealth};
pub use session::{SessionState, Transition};

use serde::Deserialize;
use std::time::Duration;

use crate::session::Backoff;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Event channel endpoint, host:port
    pub address: String,

    /// Base URL of the vehicle's HTTP API, e.g. "http://rover.local:5000"
    pub http_base: String,

    /// Heartbeat check/ping period while connected
    pub heartbeat_interval_ms: u64,

    /// A link with no pong for longer than this is considered dead
    pub heartbeat_timeout_ms: u64,

    /// First reconnect delay; doubles per attempt up to reconnect_max_ms
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,

    /// Consecutive failed attempts before giving up (state -> Disconnected)
    pub reconnect_max_attempts: u32,

    /// 0..1 spread applied to each reconnect delay. 0 = deterministic.
    pub reconnect_jitter: f64,

    pub connect_timeout_ms: u64,

    /// Per-request timeout for the polled HTTP endpoints
    pub request_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:5001".into(),
            http_base: "http://127.0.0.1:5000".into(),
            heartbeat_interval_ms: 3_000,
            heartbeat_timeout_ms: 10_000,
            reconnect_initial_ms: 1_000,
            reconnect_max_ms: 5_000,
            reconnect_max_attempts: 10,
            reconnect_jitter: 0.0,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 2_000,
        }
    }
}

impl LinkConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            initial: Duration::from_millis(self.reconnect_initial_ms),
            max: Duration::from_millis(self.reconnect_max_ms),
            jitter: self.reconnect_jitter,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("link is {0:?}, not connected")]
    NotConnected(SessionState),

    #[error("outbound queue full")]
    QueueFull,

    #[error("transport closed")]
    Closed,
}
