//! Connection session state machine.
//!
//! Pure: it never touches sockets or timers. Every input comes with the
//! current instant and the machine answers with the [`Action`]s the driver
//! must carry out.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::LinkConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInput {
    /// Operator asked to connect
    Connect,
    /// Operator asked to disconnect
    Disconnect,
    /// Transport-level connect acknowledgment
    TransportUp,
    /// Transport reported the channel closed
    TransportDown,
    /// A connect attempt failed or timed out
    DialFailed,
    Pong,
    HeartbeatTick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Open a transport once `after` has elapsed
    Dial { after: Duration, attempt: u32 },
    CancelDial,
    CloseTransport,
    StartHeartbeat,
    StopHeartbeat,
    SendPing,
    Notify(Transition),
}

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub jitter: f64,
}

impl Backoff {
    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let base = self.initial.saturating_mul(1u32 << shift).min(self.max);
        if self.jitter <= 0.0 {
            return base;
        }
        let spread = base.as_secs_f64() * self.jitter.min(1.0);
        let secs = base.as_secs_f64() + rng.gen_range(-spread..=spread);
        Duration::from_secs_f64(secs.max(0.0)).min(self.max)
    }
}

pub struct Session {
    state: SessionState,
    last_pong_at: Option<Instant>,
    retry_count: u32,
    heartbeat_timeout: Duration,
    max_attempts: u32,
    backoff: Backoff,
    rng: StdRng,
}

impl Session {
    pub fn new(cfg: &LinkConfig) -> Self {
        Self {
            state: SessionState::Disconnected,
            last_pong_at: None,
            retry_count: 0,
            heartbeat_timeout: cfg.heartbeat_timeout(),
            max_attempts: cfg.reconnect_max_attempts.max(1),
            backoff: cfg.backoff(),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_pong_at(&self) -> Option<Instant> {
        self.last_pong_at
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        match self.last_pong_at {
            Some(t) => now.saturating_duration_since(t) > self.heartbeat_timeout,
            None => true,
        }
    }

    pub fn handle(&mut self, input: SessionInput, now: Instant) -> Vec<Action> {
        use SessionInput::*;
        use SessionState::*;

        let mut out = Vec::new();
        match (self.state, input) {
            // Pong refreshes liveness whatever the state
            (_, Pong) => {
                self.last_pong_at = Some(now);
            }

            (Disconnected, Connect) => {
                self.retry_count = 0;
                self.transition(Connecting, &mut out);
                out.push(Action::Dial { after: Duration::ZERO, attempt: 0 });
            }
            (Connecting | Reconnecting, Connect) => {
                debug!("link: connect requested while {:?}; attempt already in progress", self.state);
            }
            (Connected, Connect) => {
                debug!("link: connect requested while already connected");
            }

            (Connecting | Reconnecting, TransportUp) => {
                self.retry_count = 0;
                self.last_pong_at = Some(now);
                self.transition(Connected, &mut out);
                out.push(Action::StartHeartbeat);
            }
            (Connected, TransportUp) => {
                debug!("link: duplicate transport ack ignored");
            }
            (Disconnected, TransportUp) => {
                // a dial that resolved after the operator disconnected
                debug!("link: closing late transport while disconnected");
                out.push(Action::CloseTransport);
            }

            (Connecting, DialFailed) => {
                self.begin_reconnect(&mut out);
            }
            (Reconnecting, DialFailed) => {
                if self.retry_count >= self.max_attempts {
                    warn!("link: giving up after {} reconnect attempts", self.retry_count);
                    self.transition(Disconnected, &mut out);
                } else {
                    self.retry_count += 1;
                    self.schedule_dial(&mut out);
                }
            }
            (Disconnected | Connected, DialFailed) => {
                debug!("link: stray dial failure while {:?}", self.state);
            }

            (Connected, HeartbeatTick) => {
                if self.is_stale(now) {
                    let silent = self.last_pong_at.map(|t| now.saturating_duration_since(t));
                    warn!("link: heartbeat timeout (no pong for {:?}); reconnecting", silent);
                    out.push(Action::StopHeartbeat);
                    out.push(Action::CloseTransport);
                    self.begin_reconnect(&mut out);
                } else {
                    out.push(Action::SendPing);
                }
            }
            (Disconnected | Connecting | Reconnecting, HeartbeatTick) => {
                debug!("link: heartbeat tick while {:?} ignored", self.state);
            }

            (Connected, TransportDown) => {
                warn!("link: transport closed; reconnecting");
                out.push(Action::StopHeartbeat);
                out.push(Action::CloseTransport);
                self.begin_reconnect(&mut out);
            }
            (Disconnected | Connecting | Reconnecting, TransportDown) => {
                debug!("link: transport down while {:?}", self.state);
            }

            (Connected, Disconnect) => {
                out.push(Action::StopHeartbeat);
                out.push(Action::CloseTransport);
                self.transition(Disconnected, &mut out);
            }
            (Connecting | Reconnecting, Disconnect) => {
                out.push(Action::CancelDial);
                out.push(Action::CloseTransport);
                self.transition(Disconnected, &mut out);
            }
            (Disconnected, Disconnect) => {
                debug!("link: already disconnected");
            }
        }
        out
    }

    fn begin_reconnect(&mut self, out: &mut Vec<Action>) {
        self.retry_count = 1;
        self.transition(SessionState::Reconnecting, out);
        self.schedule_dial(out);
    }

    fn schedule_dial(&mut self, out: &mut Vec<Action>) {
        let after = self.backoff.delay(self.retry_count, &mut self.rng);
        info!("link: reconnect attempt {}/{} in {:?}", self.retry_count, self.max_attempts, after);
        out.push(Action::Dial { after, attempt: self.retry_count });
    }

    fn transition(&mut self, to: SessionState, out: &mut Vec<Action>) {
        if self.state == to {
            return;
        }
        let t = Transition { from: self.state, to };
        info!("link: {:?} -> {:?}", t.from, t.to);
        self.state = to;
        out.push(Action::Notify(t));
    }
}
