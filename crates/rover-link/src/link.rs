//! Async driver around [`Session`]: owns the transport, the heartbeat
//! interval and the pending dial/backoff sleep.

use rover_proto::command::OutboundEvent;
use rover_proto::telemetry::PONG;
use rover_proto::Frame;
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, info, warn};

use crate::session::{Action, Session, SessionInput, SessionState, Transition};
use crate::transport::{Channel, ConnectFuture, Connector};
use crate::{LinkConfig, LinkError};

/// Outbound slots only releases and pings may take.
pub const PRIORITY_SLOTS: usize = 8;

#[derive(Debug)]
pub enum LinkEvent {
    State(Transition),
    Inbound(Frame),
}

#[derive(Debug, Clone, Default)]
pub struct LinkHealth {
    pub rtt_ms: Option<u32>,
    pub consecutive_failures: u32,
    pub reconnects: u32,
}

enum Pending {
    Backoff(Pin<Box<Sleep>>),
    Dialing(ConnectFuture),
}

enum Wake {
    Input(SessionInput),
    Dialed(Channel),
    Frame(Frame),
}

pub struct Link<C: Connector> {
    connector: C,
    session: Session,
    heartbeat_every: Duration,
    channel: Option<Channel>,
    pending: Option<Pending>,
    heartbeat: Option<Interval>,
    queue: VecDeque<LinkEvent>,
    health: LinkHealth,
    ping_sent_at: Option<Instant>,
}

impl<C: Connector> Link<C> {
    pub fn new(connector: C, cfg: &LinkConfig) -> Self {
        Self {
            connector,
            session: Session::new(cfg),
            heartbeat_every: cfg.heartbeat_interval(),
            channel: None,
            pending: None,
            heartbeat: None,
            queue: VecDeque::new(),
            health: LinkHealth::default(),
            ping_sent_at: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn link_health(&self) -> &LinkHealth {
        &self.health
    }

    pub fn connect(&mut self) {
        self.apply(SessionInput::Connect);
    }

    pub fn disconnect(&mut self) {
        self.apply(SessionInput::Disconnect);
    }

    /// Fire-and-forget send. Refused unless connected.
    ///
    /// Non-zero control moves may only use the outbound queue down to
    /// [`PRIORITY_SLOTS`] free slots; the rest is kept for releases and pings.
    /// A refused move is superseded by the next one anyway.
    pub fn send(&mut self, ev: OutboundEvent) -> Result<(), LinkError> {
        let state = self.session.state();
        if state != SessionState::Connected {
            return Err(LinkError::NotConnected(state));
        }
        if is_move(&ev) {
            if let Some(ch) = &self.channel {
                if ch.outbound.capacity() <= PRIORITY_SLOTS {
                    debug!("link: outbound queue backed up, dropping {} move", ev.name());
                    return Err(LinkError::QueueFull);
                }
            }
        }
        self.push_frame(ev.to_frame())
    }

    /// Next state change or inbound (non-pong) frame. Cancel-safe.
    pub async fn next_event(&mut self) -> LinkEvent {
        loop {
            if let Some(ev) = self.queue.pop_front() {
                return ev;
            }
            match self.wait().await {
                Wake::Input(input) => self.apply(input),
                Wake::Dialed(channel) => {
                    self.channel = Some(channel);
                    self.apply(SessionInput::TransportUp);
                }
                Wake::Frame(frame) if frame.event == PONG => {
                    if let Some(t) = self.ping_sent_at.take() {
                        self.health.rtt_ms = Some(t.elapsed().as_millis() as u32);
                    }
                    self.apply(SessionInput::Pong);
                }
                Wake::Frame(frame) => self.queue.push_back(LinkEvent::Inbound(frame)),
            }
        }
    }

    async fn wait(&mut self) -> Wake {
        let Self { connector, pending, heartbeat, channel, health, .. } = self;
        tokio::select! {
            wake = drive_pending(pending, connector, health) => wake,
            _ = tick(heartbeat) => Wake::Input(SessionInput::HeartbeatTick),
            frame = recv(channel) => match frame {
                Some(f) => Wake::Frame(f),
                None => Wake::Input(SessionInput::TransportDown),
            },
        }
    }

    fn apply(&mut self, input: SessionInput) {
        let now = Instant::now().into_std();
        for action in self.session.handle(input, now) {
            self.run(action);
        }
    }

    fn run(&mut self, action: Action) {
        match action {
            Action::Dial { after, attempt } => {
                if attempt > 0 {
                    self.health.reconnects += 1;
                }
                self.pending = Some(if after.is_zero() {
                    Pending::Dialing(self.connector.connect())
                } else {
                    Pending::Backoff(Box::pin(sleep(after)))
                });
            }
            Action::CancelDial => self.pending = None,
            Action::CloseTransport => {
                if self.channel.take().is_some() {
                    debug!("link: transport dropped");
                }
            }
            Action::StartHeartbeat => {
                let mut hb = interval_at(Instant::now() + self.heartbeat_every, self.heartbeat_every);
                hb.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.heartbeat = Some(hb);
                self.health.consecutive_failures = 0;
            }
            Action::StopHeartbeat => {
                self.heartbeat = None;
                self.ping_sent_at = None;
            }
            Action::SendPing => {
                match self.push_frame(OutboundEvent::Ping.to_frame()) {
                    Ok(()) => self.ping_sent_at = Some(Instant::now()),
                    Err(e) => warn!("link: ping not sent: {}", e),
                }
            }
            Action::Notify(t) => {
                if t.to == SessionState::Connected {
                    info!("link: connected (after {} reconnect attempts in total)", self.health.reconnects);
                }
                self.queue.push_back(LinkEvent::State(t));
            }
        }
    }

    fn push_frame(&mut self, frame: Frame) -> Result<(), LinkError> {
        let Some(ch) = &self.channel else {
            return Err(LinkError::Closed);
        };
        ch.outbound.try_send(frame).map_err(|e| match e {
            tokio::sync::mpsc::error::TrySendError::Full(_) => LinkError::QueueFull,
            tokio::sync::mpsc::error::TrySendError::Closed(_) => LinkError::Closed,
        })
    }
}

fn is_move(ev: &OutboundEvent) -> bool {
    match ev {
        OutboundEvent::CarControl(v) | OutboundEvent::GimbalControl(v) => !v.is_zero(),
        OutboundEvent::Ping => false,
    }
}

async fn drive_pending<C: Connector>(pending: &mut Option<Pending>, connector: &C, health: &mut LinkHealth) -> Wake {
    loop {
        match pending {
            None => return std::future::pending().await,
            Some(Pending::Backoff(delay)) => {
                delay.as_mut().await;
                *pending = Some(Pending::Dialing(connector.connect()));
            }
            Some(Pending::Dialing(dial)) => {
                let res = dial.as_mut().await;
                *pending = None;
                return match res {
                    Ok(channel) => Wake::Dialed(channel),
                    Err(e) => {
                        health.consecutive_failures += 1;
                        warn!("link: dial failed (failures: {}): {:#}", health.consecutive_failures, e);
                        Wake::Input(SessionInput::DialFailed)
                    }
                };
            }
        }
    }
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(hb) => {
            hb.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn recv(channel: &mut Option<Channel>) -> Option<Frame> {
    match channel {
        Some(ch) => ch.inbound.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Peer;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::time::timeout;

    /// Hands out queued in-memory channels; an empty queue fails the dial.
    #[derive(Clone, Default)]
    struct ScriptedConnector {
        ready: Arc<Mutex<VecDeque<Channel>>>,
        dials: Arc<Mutex<u32>>,
    }

    impl ScriptedConnector {
        fn offer(&self) -> Peer {
            let (ch, peer) = Channel::pair();
            self.ready.lock().unwrap().push_back(ch);
            peer
        }

        fn dials(&self) -> u32 {
            *self.dials.lock().unwrap()
        }
    }

    impl Connector for ScriptedConnector {
        fn connect(&self) -> ConnectFuture {
            *self.dials.lock().unwrap() += 1;
            let next = self.ready.lock().unwrap().pop_front();
            Box::pin(async move { next.ok_or_else(|| anyhow::anyhow!("refused")) })
        }
    }

    async fn expect_state<C: Connector>(link: &mut Link<C>, to: SessionState) {
        match timeout(Duration::from_secs(60), link.next_event()).await {
            Ok(LinkEvent::State(t)) => assert_eq!(t.to, to),
            Ok(other) => panic!("expected transition to {:?}, got {:?}", to, other),
            Err(_) => panic!("no transition to {:?}", to),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connects_and_pings_on_heartbeat() {
        let conn = ScriptedConnector::default();
        let mut peer = conn.offer();
        let mut link = Link::new(conn.clone(), &LinkConfig::default());

        link.connect();
        expect_state(&mut link, SessionState::Connecting).await;
        expect_state(&mut link, SessionState::Connected).await;

        // first heartbeat after 3s sends a ping; answer it
        let _ = timeout(Duration::from_millis(3_100), link.next_event()).await;
        let ping = peer.rx.try_recv().unwrap();
        assert_eq!(ping.event, "ping");
        assert_eq!(link.state(), SessionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_frames_are_surfaced_and_pongs_are_not() {
        let conn = ScriptedConnector::default();
        let peer = conn.offer();
        let mut link = Link::new(conn.clone(), &LinkConfig::default());
        link.connect();
        expect_state(&mut link, SessionState::Connecting).await;
        expect_state(&mut link, SessionState::Connected).await;

        peer.tx.send(Frame::new("pong", json!({}))).await.unwrap();
        peer.tx.send(Frame::new("status_update", json!({"speed": 3}))).await.unwrap();
        match link.next_event().await {
            LinkEvent::Inbound(f) => assert_eq!(f.event, "status_update"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_triggers_reconnect() {
        let conn = ScriptedConnector::default();
        let _peer = conn.offer();
        let mut link = Link::new(conn.clone(), &LinkConfig::default());
        link.connect();
        expect_state(&mut link, SessionState::Connecting).await;
        expect_state(&mut link, SessionState::Connected).await;

        // pings go unanswered; tick at 12s sees 12s of silence
        expect_state(&mut link, SessionState::Reconnecting).await;
        let _second = conn.offer();
        expect_state(&mut link, SessionState::Connected).await;
        assert_eq!(conn.dials(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn peer_hangup_reconnects_then_gives_up() {
        let conn = ScriptedConnector::default();
        let peer = conn.offer();
        let cfg = LinkConfig { reconnect_max_attempts: 3, ..LinkConfig::default() };
        let mut link = Link::new(conn.clone(), &cfg);
        link.connect();
        expect_state(&mut link, SessionState::Connecting).await;
        expect_state(&mut link, SessionState::Connected).await;

        drop(peer);
        expect_state(&mut link, SessionState::Reconnecting).await;
        expect_state(&mut link, SessionState::Disconnected).await;
        assert_eq!(conn.dials(), 1 + 3);
        assert!(matches!(link.send(OutboundEvent::Ping), Err(LinkError::NotConnected(SessionState::Disconnected))));
    }

    #[tokio::test(start_paused = true)]
    async fn release_gets_through_a_backed_up_queue() {
        use crate::transport::QUEUE_DEPTH;
        use rover_proto::command::ControlVector;

        let conn = ScriptedConnector::default();
        // server never reads
        let mut peer = conn.offer();
        let mut link = Link::new(conn.clone(), &LinkConfig::default());
        link.connect();
        expect_state(&mut link, SessionState::Connecting).await;
        expect_state(&mut link, SessionState::Connected).await;

        let push = OutboundEvent::CarControl(ControlVector { x: 0.2, y: 0.9 });
        let accepted = (0..QUEUE_DEPTH).filter(|_| link.send(push).is_ok()).count();
        assert_eq!(accepted, QUEUE_DEPTH - PRIORITY_SLOTS);
        assert!(matches!(link.send(push), Err(LinkError::QueueFull)));

        link.send(OutboundEvent::CarControl(ControlVector::ZERO)).unwrap();
        link.send(OutboundEvent::GimbalControl(ControlVector::ZERO)).unwrap();

        let mut frames = Vec::new();
        while let Ok(f) = peer.rx.try_recv() {
            frames.push(f);
        }
        assert_eq!(frames.len(), accepted + 2);
        assert_eq!(frames[accepted], OutboundEvent::CarControl(ControlVector::ZERO).to_frame());
        assert_eq!(frames[accepted + 1].event, "gimbal_control");
    }

    #[tokio::test(start_paused = true)]
    async fn send_is_refused_until_connected() {
        let conn = ScriptedConnector::default();
        let mut peer = conn.offer();
        let mut link = Link::new(conn.clone(), &LinkConfig::default());
        assert!(link.send(OutboundEvent::Ping).is_err());

        link.connect();
        expect_state(&mut link, SessionState::Connecting).await;
        expect_state(&mut link, SessionState::Connected).await;
        link.send(OutboundEvent::Ping).unwrap();
        assert_eq!(peer.rx.recv().await.unwrap().event, "ping");
    }
}
