use anyhow::Result;

use crate::media::MediaConfig;
use crate::LinkConfig;

pub fn check_link(cfg: &LinkConfig) -> Result<()> {
    anyhow::ensure!(cfg.address.contains(':'), "link.address must be host:port, got {:?}", cfg.address);
    anyhow::ensure!(
        cfg.http_base.starts_with("http://") || cfg.http_base.starts_with("https://"),
        "link.http_base must start with http:// or https://"
    );
    anyhow::ensure!(cfg.heartbeat_interval_ms >= 100, "link.heartbeat_interval_ms too small");
    anyhow::ensure!(
        cfg.heartbeat_timeout_ms > cfg.heartbeat_interval_ms,
        "link.heartbeat_timeout_ms must exceed heartbeat_interval_ms"
    );
    anyhow::ensure!(cfg.reconnect_initial_ms > 0, "link.reconnect_initial_ms must be > 0");
    anyhow::ensure!(
        cfg.reconnect_initial_ms <= cfg.reconnect_max_ms,
        "link.reconnect_initial_ms must not exceed reconnect_max_ms"
    );
    anyhow::ensure!(cfg.reconnect_max_attempts >= 1, "link.reconnect_max_attempts must be >= 1");
    anyhow::ensure!((0.0..=1.0).contains(&cfg.reconnect_jitter), "link.reconnect_jitter should be 0..1");
    anyhow::ensure!(cfg.request_timeout_ms > 0, "link.request_timeout_ms must be > 0");
    anyhow::ensure!(cfg.connect_timeout_ms > 0, "link.connect_timeout_ms must be > 0");
    Ok(())
}

pub fn check_media(cfg: &MediaConfig) -> Result<()> {
    if !cfg.enable {
        return Ok(());
    }
    anyhow::ensure!(cfg.path.starts_with('/'), "media.path must start with '/'");
    anyhow::ensure!(cfg.reload_initial_ms > 0, "media.reload_initial_ms must be > 0");
    anyhow::ensure!(cfg.reload_initial_ms <= cfg.reload_max_ms, "media.reload_initial_ms exceeds reload_max_ms");
    anyhow::ensure!(cfg.reload_max_attempts >= 1, "media.reload_max_attempts must be >= 1 (reloads are always bounded)");
    anyhow::ensure!(cfg.stall_timeout_ms > 0, "media.stall_timeout_ms must be > 0");
    Ok(())
}
