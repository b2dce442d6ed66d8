use anyhow::Result;

use crate::MapConfig;

pub fn check_map(cfg: &MapConfig) -> Result<()> {
    anyhow::ensure!(cfg.map_poll_ms > 0, "map.map_poll_ms must be > 0");
    anyhow::ensure!(cfg.pose_poll_ms > 0, "map.pose_poll_ms must be > 0");
    anyhow::ensure!(cfg.pose_poll_ms <= cfg.map_poll_ms, "map.pose_poll_ms should not be slower than map_poll_ms");
    if cfg.chase_camera {
        anyhow::ensure!(cfg.chase_radius.is_finite() && cfg.chase_radius > 0.0, "map.chase_radius must be > 0");
        anyhow::ensure!(cfg.chase_height.is_finite(), "map.chase_height must be finite");
    }
    Ok(())
}
