//! Bodies of the vehicle's HTTP endpoints.

use serde::{Deserialize, Serialize};

use crate::telemetry::BatteryClass;

pub const MAP_DATA: &str = "/map_data";
pub const POSITION: &str = "/position";
pub const BATTERY_STATUS: &str = "/battery_status";
pub const IMU_STATUS: &str = "/imu_status";
/// Same body as the `imu_update` event, decoded as
/// [`ImuUpdate`](crate::telemetry::ImuUpdate). Angular velocity is ignored.
pub const IMU_DATA: &str = "/imu_data";
pub const RESET_GIMBAL: &str = "/reset_gimbal";
pub const RESET_SLAM: &str = "/reset_slam";
pub const VIDEO_FEED: &str = "/video_feed";

/// Server frame: x forward, y left, z up.
pub type ServerPoint = [f64; 3];

/// `GET /map_data`. Either list may be missing or empty on a server hiccup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapData {
    #[serde(default)]
    pub points: Vec<ServerPoint>,
    #[serde(default)]
    pub trajectory: Vec<ServerPoint>,
}

/// `GET /position`. Orientation is `[roll, pitch, yaw]` in degrees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionData {
    #[serde(default)]
    pub position: Option<ServerPoint>,
    #[serde(default)]
    pub orientation: Option<[f64; 3]>,
}

impl PositionData {
    pub fn yaw_deg(&self) -> Option<f64> {
        self.orientation.map(|o| o[2])
    }
}

/// `GET /battery_status`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryReport {
    #[serde(default)]
    pub level: Option<f64>,
    #[serde(default)]
    pub voltage: Option<f64>,
    #[serde(default)]
    pub status: Option<BatteryClass>,
}

/// `GET /imu_status`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImuAvailability {
    #[serde(default)]
    pub available: bool,
}

/// Reply to the `POST` actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionAck {
    #[serde(default)]
    pub status: String,
}

impl ActionAck {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_data_tolerates_missing_lists() {
        let m: MapData = serde_json::from_str(r#"{"trajectory": [[1.0, 2.0, 3.0]]}"#).unwrap();
        assert!(m.points.is_empty());
        assert_eq!(m.trajectory, vec![[1.0, 2.0, 3.0]]);
    }

    #[test]
    fn position_yaw_is_third_component() {
        let p: PositionData = serde_json::from_str(r#"{"position":[0,0,0],"orientation":[1,2,90]}"#).unwrap();
        assert_eq!(p.yaw_deg(), Some(90.0));
    }
}
