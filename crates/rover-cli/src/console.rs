//! The `run` loop: one task, one `select!`, no locks.

use anyhow::Result;
use rover_link::api::VehicleApi;
use rover_link::media::{self, MediaEvent};
use rover_link::transport::{AbortOnDrop, Connector, TcpConnector};
use rover_link::{Link, LinkEvent, SessionState};
use rover_map::{HeadlessScene, PollResult, Pollers, SpatialSync};
use rover_proto::telemetry::{ImuUpdate, InboundEvent};
use rover_vehicle::{Routed, TelemetryRouter};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{check_config, Config};
use crate::input::{self, ConsoleCommand, ResetTarget};

/// An `/imu_data` reply, tagged with the session it was requested in.
struct ImuSeed {
    session: u64,
    res: Result<ImuUpdate>,
}

/// Receiving ends of the background tasks' channels.
struct Inbox {
    media: mpsc::Receiver<MediaEvent>,
    notices: mpsc::Receiver<String>,
    imu: mpsc::Receiver<ImuSeed>,
}

struct Console<'a, C: Connector> {
    cfg: &'a Config,
    api: VehicleApi,
    link: Link<C>,
    router: TelemetryRouter,
    sync: SpatialSync<HeadlessScene>,
    pollers: Pollers<VehicleApi>,
    media: Option<AbortOnDrop>,
    media_tx: mpsc::Sender<MediaEvent>,
    notices: mpsc::Sender<String>,
    actions: Vec<AbortOnDrop>,
    // bumped on every link transition
    session: u64,
    imu_seed: Option<AbortOnDrop>,
    imu_tx: mpsc::Sender<ImuSeed>,
    imu_pushed: bool,
}

pub async fn run(cfg: &Config) -> Result<()> {
    check_config(cfg)?;
    info!("run: starting (link {}, http {})", cfg.link.address, cfg.link.http_base);

    let connector = TcpConnector::new(cfg.link.address.clone(), cfg.link.connect_timeout());
    let (mut console, mut inbox) = Console::new(cfg, connector)?;
    console.start_media()?;
    console.link.connect();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            ev = console.link.next_event() => console.on_link_event(ev),
            res = console.pollers.next() => console.on_poll(res),
            Some(ev) = inbox.media.recv() => console.on_media(ev),
            Some(seed) = inbox.imu.recv() => console.on_imu_seed(seed),
            Some(notice) = inbox.notices.recv() => info!("{}", notice),
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match input::parse(&line) {
                    Ok(Some(ConsoleCommand::Quit)) => break,
                    Ok(Some(cmd)) => console.on_command(cmd)?,
                    Ok(None) => {}
                    Err(e) => warn!("input: {:#}", e),
                },
                Ok(None) => {
                    debug!("input: stdin closed");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("input: read failed: {}", e);
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("run: interrupted");
                break;
            }
        }
    }

    console.link.disconnect();
    console.pollers.stop();
    info!("run: stopped");
    Ok(())
}

impl<'a, C: Connector> Console<'a, C> {
    fn new(cfg: &'a Config, connector: C) -> Result<(Self, Inbox)> {
        let api = VehicleApi::new(&cfg.link.http_base, cfg.link.request_timeout())?;
        let (media_tx, media) = mpsc::channel(8);
        let (notices_tx, notices) = mpsc::channel(8);
        let (imu_tx, imu) = mpsc::channel(2);
        let console = Console {
            cfg,
            link: Link::new(connector, &cfg.link),
            router: TelemetryRouter::new(),
            sync: SpatialSync::new(HeadlessScene::new(), &cfg.map),
            pollers: Pollers::new(api.clone(), &cfg.map),
            api,
            media: None,
            media_tx,
            notices: notices_tx,
            actions: Vec::new(),
            session: 0,
            imu_seed: None,
            imu_tx,
            imu_pushed: false,
        };
        Ok((console, Inbox { media, notices, imu }))
    }

    fn on_link_event(&mut self, ev: LinkEvent) {
        match ev {
            LinkEvent::State(t) => {
                debug!("run: link now {:?}", t.to);
                self.session += 1;
                self.imu_seed = None;
                self.imu_pushed = false;
                self.router.on_session_transition();
                match t.to {
                    SessionState::Connected => {
                        self.pollers.start();
                        self.spawn_imu_seed();
                    }
                    SessionState::Disconnected => {
                        self.pollers.stop();
                        if t.from == SessionState::Reconnecting {
                            warn!("link: gave up reconnecting; type `connect` to retry");
                        }
                    }
                    SessionState::Connecting | SessionState::Reconnecting => {}
                }
            }
            LinkEvent::Inbound(frame) => match self.router.handle(&frame.event, &frame.data) {
                Routed::Imu => self.imu_pushed = true,
                Routed::Battery => debug!("battery: {}", self.router.battery().indicator()),
                Routed::BatteryAlert(true) => {
                    if let Some(alert) = self.router.battery().alert() {
                        println!("!! {} (type `dismiss` to hide)", alert.message);
                    }
                }
                _ => {}
            },
        }
    }

    /// Fetches one IMU reading so the display has values before the first push.
    fn spawn_imu_seed(&mut self) {
        let api = self.api.clone();
        let tx = self.imu_tx.clone();
        let session = self.session;
        self.imu_seed = Some(AbortOnDrop::new(tokio::spawn(async move {
            let res = api.imu_data().await;
            let _ = tx.send(ImuSeed { session, res }).await;
        })));
    }

    fn on_imu_seed(&mut self, seed: ImuSeed) {
        if seed.session != self.session {
            debug!("imu: dropping /imu_data reply from an earlier session");
            return;
        }
        self.imu_seed = None;
        match seed.res {
            // a pushed update is newer than the request
            Ok(_) if self.imu_pushed => debug!("imu: push arrived first, seed not needed"),
            Ok(update) => {
                self.router.apply(InboundEvent::Imu(update));
            }
            Err(e) => debug!("imu: /imu_data failed: {:#}", e),
        }
    }

    fn on_poll(&mut self, res: PollResult) {
        match res {
            PollResult::Map(Ok(map)) => {
                let applied = self.sync.apply_map(&map);
                debug!("map: {} points, {} trajectory ({:?})", map.points.len(), map.trajectory.len(), applied);
            }
            PollResult::Pose(Ok(pose)) => {
                self.sync.apply_pose(&pose);
            }
            PollResult::Map(Err(e)) => warn!("map: /map_data failed: {:#}", e),
            PollResult::Pose(Err(e)) => warn!("map: /position failed: {:#}", e),
        }
    }

    fn on_media(&mut self, ev: MediaEvent) {
        match ev {
            MediaEvent::Loaded => info!("media: video feed live"),
            MediaEvent::Failed { attempt, retry_in, .. } => debug!("media: attempt {} failed, retry in {:?}", attempt, retry_in),
            MediaEvent::GaveUp { attempts } => {
                warn!("media: video feed unavailable after {} attempts; type `reload video` to retry", attempts)
            }
        }
    }

    fn on_command(&mut self, cmd: ConsoleCommand) -> Result<()> {
        self.actions.retain(|a| !a.is_finished());
        match cmd {
            ConsoleCommand::Pad(pad, input) => {
                if let Err(e) = self.link.send(pad.handle(input)) {
                    warn!("control: {} input not sent: {}", pad.name(), e);
                }
            }
            ConsoleCommand::Dismiss => {
                if !self.router.battery_mut().dismiss() {
                    info!("battery: no alert to dismiss");
                }
            }
            ConsoleCommand::Reset(target) => self.spawn_reset(target),
            ConsoleCommand::Status => self.print_status(),
            ConsoleCommand::Connect => self.link.connect(),
            ConsoleCommand::Disconnect => self.link.disconnect(),
            ConsoleCommand::ReloadVideo => self.start_media()?,
            ConsoleCommand::Quit => {}
        }
        Ok(())
    }

    fn start_media(&mut self) -> Result<()> {
        if !self.cfg.media.enable {
            return Ok(());
        }
        // dropping the old watcher cancels it
        self.media = None;
        let url = self.api.url(&self.cfg.media.path);
        self.media = Some(media::spawn_watch(url, &self.cfg.media, self.cfg.link.connect_timeout(), self.media_tx.clone())?);
        Ok(())
    }

    fn spawn_reset(&mut self, target: ResetTarget) {
        let api = self.api.clone();
        let notices = self.notices.clone();
        let task = tokio::spawn(async move {
            let res = match target {
                ResetTarget::Gimbal => api.reset_gimbal().await,
                ResetTarget::Map => api.reset_slam().await,
            };
            let notice = match res {
                Ok(_) => format!("reset: {:?} done", target),
                Err(e) => format!("reset: {:?} failed: {:#}", target, e),
            };
            let _ = notices.send(notice).await;
        });
        self.actions.push(AbortOnDrop::new(task));
    }

    fn print_status(&self) {
        let health = self.link.link_health();
        println!(
            "link: {:?} rtt={:?}ms failures={} reconnects={}",
            self.link.state(),
            health.rtt_ms,
            health.consecutive_failures,
            health.reconnects
        );
        println!("vehicle: {}", self.router.snapshot().render());
        let battery = self.router.battery();
        match battery.alert() {
            Some(a) => println!("battery: {} ALERT {:?} since {}", battery.indicator(), a.message, a.raised_at),
            None => println!("battery: {}", battery.indicator()),
        }
        let stats = self.pollers.stats();
        println!(
            "map: {} (requests {}/{}, coalesced {}/{})",
            self.sync.summary(),
            stats.map_requests,
            stats.pose_requests,
            stats.map_skipped,
            stats.pose_skipped
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rover_link::transport::{Channel, ConnectFuture, Peer};
    use rover_proto::telemetry::Orientation;
    use rover_proto::Frame;
    use rover_vehicle::{ImuAvailability, Reading};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::timeout;

    /// Hands out pre-made in-memory channels; refuses once they run out.
    #[derive(Clone, Default)]
    struct Offered(Arc<Mutex<VecDeque<Channel>>>);

    impl Offered {
        fn offer(&self) -> Peer {
            let (ch, peer) = Channel::pair();
            self.0.lock().unwrap().push_back(ch);
            peer
        }
    }

    impl Connector for Offered {
        fn connect(&self) -> ConnectFuture {
            let next = self.0.lock().unwrap().pop_front();
            Box::pin(async move { next.ok_or_else(|| anyhow::anyhow!("refused")) })
        }
    }

    fn test_config() -> Config {
        let mut cfg = Config::default();
        // nothing listens on the discard port
        cfg.link.http_base = "http://127.0.0.1:9".into();
        cfg.link.reconnect_max_attempts = 1;
        cfg.media.enable = false;
        cfg
    }

    /// Feeds the next link event through the console; returns the new state
    /// for transitions.
    async fn step<C: Connector>(console: &mut Console<'_, C>) -> Option<SessionState> {
        let ev = timeout(Duration::from_secs(60), console.link.next_event()).await.expect("link went quiet");
        let to = match &ev {
            LinkEvent::State(t) => Some(t.to),
            LinkEvent::Inbound(_) => None,
        };
        console.on_link_event(ev);
        to
    }

    fn imu_reading(roll: f64) -> ImuUpdate {
        ImuUpdate {
            available: Some(true),
            orientation: Some(Orientation { roll: Some(roll), pitch: None, yaw: None }),
            acceleration: None,
            error: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn link_transitions_drive_imu_and_pollers() {
        let cfg = test_config();
        let conn = Offered::default();
        let peer = conn.offer();
        let (mut console, _inbox) = Console::new(&cfg, conn).unwrap();

        console.link.connect();
        assert_eq!(step(&mut console).await, Some(SessionState::Connecting));
        assert!(!console.pollers.is_running());
        assert_eq!(step(&mut console).await, Some(SessionState::Connected));
        assert!(console.pollers.is_running());

        let update = json!({"available": true, "orientation": {"roll": 4.0, "pitch": 1.0, "yaw": 0.0}});
        peer.tx.send(Frame::new("imu_update", update)).await.unwrap();
        assert_eq!(step(&mut console).await, None);
        assert_eq!(console.router.snapshot().imu.roll(), Reading::Live(4.0));

        drop(peer);
        assert_eq!(step(&mut console).await, Some(SessionState::Reconnecting));
        assert_eq!(console.router.snapshot().imu.availability, ImuAvailability::Unknown);
        assert_eq!(console.router.snapshot().imu.roll(), Reading::Stale(4.0));
        // polling continues through a reconnect
        assert!(console.pollers.is_running());

        // the only retry is refused
        assert_eq!(step(&mut console).await, Some(SessionState::Disconnected));
        assert!(!console.pollers.is_running());
        assert_eq!(console.router.snapshot().imu.roll(), Reading::Stale(4.0));
    }

    #[tokio::test(start_paused = true)]
    async fn imu_seed_only_applies_to_its_own_session() {
        let cfg = test_config();
        let conn = Offered::default();
        let peer = conn.offer();
        let (mut console, _inbox) = Console::new(&cfg, conn).unwrap();

        console.link.connect();
        step(&mut console).await;
        assert_eq!(step(&mut console).await, Some(SessionState::Connected));
        assert!(console.imu_seed.is_some());

        // reply to the Connecting-era request
        console.on_imu_seed(ImuSeed { session: console.session - 1, res: Ok(imu_reading(9.0)) });
        assert_eq!(console.router.snapshot().imu.roll(), Reading::NotAvailable);

        console.on_imu_seed(ImuSeed { session: console.session, res: Ok(imu_reading(2.5)) });
        assert_eq!(console.router.snapshot().imu.availability, ImuAvailability::Available);
        assert_eq!(console.router.snapshot().imu.roll(), Reading::Live(2.5));
        assert!(console.imu_seed.is_none());
        drop(peer);
    }

    #[tokio::test(start_paused = true)]
    async fn pushed_imu_update_wins_over_a_late_seed() {
        let cfg = test_config();
        let conn = Offered::default();
        let peer = conn.offer();
        let (mut console, _inbox) = Console::new(&cfg, conn).unwrap();

        console.link.connect();
        step(&mut console).await;
        step(&mut console).await;

        peer.tx.send(Frame::new("imu_update", json!({"available": true, "orientation": {"roll": 7.0}}))).await.unwrap();
        assert_eq!(step(&mut console).await, None);

        console.on_imu_seed(ImuSeed { session: console.session, res: Ok(imu_reading(1.0)) });
        assert_eq!(console.router.snapshot().imu.roll(), Reading::Live(7.0));
    }

    #[test]
    fn run_rejects_zero_periods_before_connecting() {
        let mut cfg = test_config();
        cfg.map.pose_poll_ms = 0;
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        assert!(rt.block_on(run(&cfg)).is_err());
    }
}
