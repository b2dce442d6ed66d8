//! 3D situational scene kept in step with the vehicle's map and pose.

pub mod doctor;
pub mod poll;
pub mod scene;
pub mod sync;
pub mod transform;

pub use poll::{PollResult, Pollers, SpatialSource};
pub use scene::{HeadlessScene, SceneBackend, SceneHandles};
pub use sync::SpatialSync;

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// GET /map_data cadence
    pub map_poll_ms: u64,

    /// GET /position cadence
    pub pose_poll_ms: u64,

    /// Keep the viewer camera behind the vehicle along its heading
    pub chase_camera: bool,

    /// Horizontal distance behind the vehicle, render units
    pub chase_radius: f32,
    pub chase_height: f32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self { map_poll_ms: 1_000, pose_poll_ms: 200, chase_camera: true, chase_radius: 3.0, chase_height: 2.0 }
    }
}

impl MapConfig {
    pub fn map_every(&self) -> Duration {
        Duration::from_millis(self.map_poll_ms)
    }

    pub fn pose_every(&self) -> Duration {
        Duration::from_millis(self.pose_poll_ms)
    }
}
