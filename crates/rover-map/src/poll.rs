//! Map and pose pollers with per-endpoint coalescing.
//!
//! A tick is skipped while the previous request for the same endpoint has
//! not resolved, so a slow server never accumulates a backlog.

use anyhow::Result;
use rover_link::api::VehicleApi;
use rover_link::transport::AbortOnDrop;
use rover_proto::http::{MapData, PositionData};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::debug;

use crate::MapConfig;

pub type FetchFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// Where spatial data comes from. Each call is one request.
pub trait SpatialSource {
    fn map_data(&self) -> FetchFuture<MapData>;
    fn position(&self) -> FetchFuture<PositionData>;
}

impl SpatialSource for VehicleApi {
    fn map_data(&self) -> FetchFuture<MapData> {
        let api = self.clone();
        Box::pin(async move { api.map_data().await })
    }

    fn position(&self) -> FetchFuture<PositionData> {
        let api = self.clone();
        Box::pin(async move { api.position().await })
    }
}

#[derive(Debug)]
pub enum PollResult {
    Map(Result<MapData>),
    Pose(Result<PositionData>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub map_requests: u64,
    pub pose_requests: u64,
    pub map_skipped: u64,
    pub pose_skipped: u64,
}

enum Wake {
    MapTick,
    PoseTick,
    Done(PollResult),
}

pub struct Pollers<S: SpatialSource> {
    source: S,
    map_every: Duration,
    pose_every: Duration,
    map_tick: Option<Interval>,
    pose_tick: Option<Interval>,
    map_inflight: Option<AbortOnDrop>,
    pose_inflight: Option<AbortOnDrop>,
    tx: mpsc::Sender<PollResult>,
    rx: mpsc::Receiver<PollResult>,
    stats: PollStats,
}

impl<S: SpatialSource> Pollers<S> {
    pub fn new(source: S, cfg: &MapConfig) -> Self {
        let (tx, rx) = mpsc::channel(8);
        Self {
            source,
            map_every: cfg.map_every(),
            pose_every: cfg.pose_every(),
            map_tick: None,
            pose_tick: None,
            map_inflight: None,
            pose_inflight: None,
            tx,
            rx,
            stats: PollStats::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.map_tick.is_some()
    }

    pub fn stats(&self) -> PollStats {
        self.stats
    }

    /// Starts both cadences; the first request of each goes out immediately.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        debug!("map: pollers started ({:?} map, {:?} pose)", self.map_every, self.pose_every);
        self.map_tick = Some(ticker(self.map_every));
        self.pose_tick = Some(ticker(self.pose_every));
    }

    /// Stops the cadences and cancels in-flight requests.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        debug!("map: pollers stopped");
        self.map_tick = None;
        self.pose_tick = None;
        self.map_inflight = None;
        self.pose_inflight = None;
        while self.rx.try_recv().is_ok() {}
    }

    /// Next completed request. Cancel-safe; pends forever while stopped.
    pub async fn next(&mut self) -> PollResult {
        loop {
            match self.wait().await {
                Wake::MapTick => {
                    if self.map_inflight.is_some() {
                        self.stats.map_skipped += 1;
                        debug!("map: /map_data still in flight, skipping tick");
                        continue;
                    }
                    self.stats.map_requests += 1;
                    let fut = self.source.map_data();
                    let tx = self.tx.clone();
                    self.map_inflight = Some(AbortOnDrop::new(tokio::spawn(async move {
                        let _ = tx.send(PollResult::Map(fut.await)).await;
                    })));
                }
                Wake::PoseTick => {
                    if self.pose_inflight.is_some() {
                        self.stats.pose_skipped += 1;
                        continue;
                    }
                    self.stats.pose_requests += 1;
                    let fut = self.source.position();
                    let tx = self.tx.clone();
                    self.pose_inflight = Some(AbortOnDrop::new(tokio::spawn(async move {
                        let _ = tx.send(PollResult::Pose(fut.await)).await;
                    })));
                }
                Wake::Done(res) => {
                    match res {
                        PollResult::Map(_) => self.map_inflight = None,
                        PollResult::Pose(_) => self.pose_inflight = None,
                    }
                    return res;
                }
            }
        }
    }

    async fn wait(&mut self) -> Wake {
        let Self { map_tick, pose_tick, rx, .. } = self;
        tokio::select! {
            _ = tick(map_tick) => Wake::MapTick,
            _ = tick(pose_tick) => Wake::PoseTick,
            // tx is held by self, so recv never yields None
            Some(res) = rx.recv() => Wake::Done(res),
        }
    }
}

fn ticker(every: Duration) -> Interval {
    let mut t = interval(every);
    t.set_missed_tick_behavior(MissedTickBehavior::Skip);
    t
}

async fn tick(t: &mut Option<Interval>) {
    match t {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::{sleep, timeout};

    #[derive(Clone, Default)]
    struct SlowSource {
        map_delay: Duration,
        map_calls: Arc<AtomicU32>,
        pose_calls: Arc<AtomicU32>,
    }

    impl SpatialSource for SlowSource {
        fn map_data(&self) -> FetchFuture<MapData> {
            self.map_calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.map_delay;
            Box::pin(async move {
                sleep(delay).await;
                Ok::<_, anyhow::Error>(MapData { points: vec![[1.0, 2.0, 3.0]], trajectory: vec![] })
            })
        }

        fn position(&self) -> FetchFuture<PositionData> {
            self.pose_calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err::<PositionData, _>(anyhow::anyhow!("pose unavailable")) })
        }
    }

    async fn drain<S: SpatialSource>(p: &mut Pollers<S>, for_: Duration) -> (u32, u32) {
        let (mut maps, mut poses) = (0, 0);
        let _ = timeout(for_, async {
            loop {
                match p.next().await {
                    PollResult::Map(_) => maps += 1,
                    PollResult::Pose(_) => poses += 1,
                }
            }
        })
        .await;
        (maps, poses)
    }

    #[tokio::test(start_paused = true)]
    async fn slow_map_requests_are_coalesced() {
        let src = SlowSource { map_delay: Duration::from_millis(2_500), ..Default::default() };
        let mut p = Pollers::new(src.clone(), &MapConfig::default());
        p.start();

        // map requests at 0 and 3000 ms; ticks at 1000, 2000, 4000, 5000 skipped
        let (maps, _) = drain(&mut p, Duration::from_millis(5_100)).await;
        assert_eq!(maps, 1);
        assert_eq!(src.map_calls.load(Ordering::SeqCst), 2);
        assert_eq!(p.stats().map_skipped, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_pose_requests_follow_the_cadence() {
        let src = SlowSource::default();
        let mut p = Pollers::new(src.clone(), &MapConfig::default());
        p.start();

        let (_, poses) = drain(&mut p, Duration::from_millis(1_050)).await;
        // 0, 200, 400, 600, 800, 1000
        assert_eq!(poses, 6);
        assert_eq!(p.stats().pose_skipped, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_pollers_issue_nothing() {
        let src = SlowSource::default();
        let mut p = Pollers::new(src.clone(), &MapConfig::default());
        p.start();
        let _ = drain(&mut p, Duration::from_millis(50)).await;
        p.stop();
        assert!(!p.is_running());

        let before = src.pose_calls.load(Ordering::SeqCst);
        assert!(timeout(Duration::from_secs(5), p.next()).await.is_err());
        assert_eq!(src.pose_calls.load(Ordering::SeqCst), before);

        p.start();
        assert!(matches!(timeout(Duration::from_millis(10), p.next()).await, Ok(_)));
    }
}
