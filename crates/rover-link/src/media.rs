//! Video feed attachment with bounded reloads.
//!
//! The feed itself is opaque; the console only needs to know whether bytes
//! are flowing and when to try again.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::transport::AbortOnDrop;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub enable: bool,

    /// Path of the MJPEG feed on the HTTP base
    pub path: String,

    pub reload_initial_ms: u64,
    pub reload_max_ms: u64,

    /// Consecutive failed loads before the feed is given up
    pub reload_max_attempts: u32,

    /// No bytes for this long counts as a failed load
    pub stall_timeout_ms: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            enable: true,
            path: rover_proto::http::VIDEO_FEED.into(),
            reload_initial_ms: 1_000,
            reload_max_ms: 30_000,
            reload_max_attempts: 8,
            stall_timeout_ms: 5_000,
        }
    }
}

impl MediaConfig {
    pub fn policy(&self) -> ReloadPolicy {
        ReloadPolicy::new(
            Duration::from_millis(self.reload_initial_ms),
            Duration::from_millis(self.reload_max_ms),
            self.reload_max_attempts,
        )
    }
}

/// Capped exponential backoff with a hard attempt limit.
#[derive(Debug, Clone)]
pub struct ReloadPolicy {
    initial: Duration,
    max: Duration,
    max_attempts: u32,
    failures: u32,
}

impl ReloadPolicy {
    pub fn new(initial: Duration, max: Duration, max_attempts: u32) -> Self {
        Self { initial, max, max_attempts, failures: 0 }
    }

    /// Records a failed load. Returns the delay before the next reload, or
    /// `None` once the attempt limit is spent.
    pub fn on_failure(&mut self) -> Option<Duration> {
        if self.failures >= self.max_attempts {
            return None;
        }
        let shift = self.failures.min(16);
        self.failures += 1;
        Some(self.initial.saturating_mul(1u32 << shift).min(self.max))
    }

    pub fn on_loaded(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn exhausted(&self) -> bool {
        self.failures >= self.max_attempts
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    Loaded,
    Failed { attempt: u32, retry_in: Duration, error: String },
    GaveUp { attempts: u32 },
}

/// Spawns the feed watcher. Dropping the guard stops it.
pub fn spawn_watch(url: String, cfg: &MediaConfig, connect_timeout: Duration, tx: mpsc::Sender<MediaEvent>) -> Result<AbortOnDrop> {
    let client = reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .context("build media client")?;
    let policy = cfg.policy();
    let stall = Duration::from_millis(cfg.stall_timeout_ms);
    Ok(AbortOnDrop::new(tokio::spawn(watch(client, url, policy, stall, tx))))
}

async fn watch(client: reqwest::Client, url: String, mut policy: ReloadPolicy, stall: Duration, tx: mpsc::Sender<MediaEvent>) {
    loop {
        let err = match attach(&client, &url, stall, &mut policy, &tx).await {
            Ok(()) => anyhow::anyhow!("stream ended"),
            Err(e) => e,
        };
        match policy.on_failure() {
            Some(retry_in) => {
                warn!("media: feed failed (attempt {}): {:#}; reloading in {:?}", policy.failures(), err, retry_in);
                let ev = MediaEvent::Failed { attempt: policy.failures(), retry_in, error: format!("{:#}", err) };
                if tx.send(ev).await.is_err() {
                    return;
                }
                tokio::time::sleep(retry_in).await;
            }
            None => {
                warn!("media: giving up on {} after {} failed loads", url, policy.failures());
                let _ = tx.send(MediaEvent::GaveUp { attempts: policy.failures() }).await;
                return;
            }
        }
    }
}

async fn attach(
    client: &reqwest::Client,
    url: &str,
    stall: Duration,
    policy: &mut ReloadPolicy,
    tx: &mpsc::Sender<MediaEvent>,
) -> Result<()> {
    let mut resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {}", url))?
        .error_for_status()?;

    let mut received = 0u64;
    let mut loaded = false;
    loop {
        let chunk = tokio::time::timeout(stall, resp.chunk())
            .await
            .with_context(|| format!("no data for {:?}", stall))??;
        let Some(chunk) = chunk else {
            return Ok(());
        };
        received += chunk.len() as u64;
        if !loaded {
            loaded = true;
            policy.on_loaded();
            info!("media: feed attached ({})", url);
            if tx.send(MediaEvent::Loaded).await.is_err() {
                return Ok(());
            }
        }
        if received % (1 << 20) < chunk.len() as u64 {
            debug!("media: {} MiB received", received >> 20);
        }
    }
}
