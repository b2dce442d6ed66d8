//! Applies polled map and pose payloads to the scene in place.

use glam::Vec3;
use rover_proto::http::{MapData, PositionData};
use tracing::debug;

use crate::scene::{SceneBackend, SceneHandles};
use crate::transform::{chase_eye, heading, server_points_to_render, server_to_render, yaw_to_render};
use crate::MapConfig;

#[derive(Debug, Clone, Copy)]
struct Chase {
    radius: f32,
    height: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapApplied {
    pub points: bool,
    pub trajectory: bool,
}

pub struct SpatialSync<S: SceneBackend> {
    scene: S,
    handles: SceneHandles,
    chase: Option<Chase>,
    vehicle_at: Vec3,
    vehicle_yaw: f32,
    map_updates: u64,
    pose_updates: u64,
}

impl<S: SceneBackend> SpatialSync<S> {
    pub fn new(mut scene: S, cfg: &MapConfig) -> Self {
        let handles = SceneHandles::create(&mut scene);
        // default overview until the first pose arrives
        scene.look_at(handles.camera, Vec3::new(0.0, 5.0, 10.0), Vec3::ZERO);
        let chase = cfg.chase_camera.then_some(Chase { radius: cfg.chase_radius, height: cfg.chase_height });
        Self { scene, handles, chase, vehicle_at: Vec3::ZERO, vehicle_yaw: 0.0, map_updates: 0, pose_updates: 0 }
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn handles(&self) -> &SceneHandles {
        &self.handles
    }

    /// Vehicle position and render yaw (radians).
    pub fn vehicle_pose(&self) -> (Vec3, f32) {
        (self.vehicle_at, self.vehicle_yaw)
    }

    /// Empty lists leave previously rendered geometry untouched.
    pub fn apply_map(&mut self, map: &MapData) -> MapApplied {
        let mut applied = MapApplied::default();

        let points = server_points_to_render(&map.points);
        if !points.is_empty() {
            self.scene.set_positions(self.handles.cloud, points);
            applied.points = true;
        }

        let trajectory = server_points_to_render(&map.trajectory);
        if let Some(last) = trajectory.last().copied() {
            self.scene.set_positions(self.handles.trajectory, trajectory);
            self.place_vehicle(last);
            applied.trajectory = true;
        }

        if applied == MapApplied::default() {
            debug!("map: empty payload, keeping previous geometry");
        } else {
            self.map_updates += 1;
        }
        applied
    }

    /// Returns false when the payload carried nothing usable.
    pub fn apply_pose(&mut self, pose: &PositionData) -> bool {
        let mut touched = false;
        if let Some(p) = pose.position {
            let at = server_to_render(p);
            if at.is_finite() {
                self.vehicle_at = at;
                touched = true;
            }
        }
        if let Some(yaw) = pose.yaw_deg().filter(|y| y.is_finite()) {
            self.vehicle_yaw = yaw_to_render(yaw);
            touched = true;
        }
        if touched {
            self.place_vehicle(self.vehicle_at);
            self.pose_updates += 1;
        }
        touched
    }

    pub fn summary(&self) -> String {
        let (at, yaw) = self.vehicle_pose();
        format!(
            "vehicle at ({:.2}, {:.2}, {:.2}) yaw {:.3} rad; {} map / {} pose updates",
            at.x, at.y, at.z, yaw, self.map_updates, self.pose_updates
        )
    }

    fn place_vehicle(&mut self, at: Vec3) {
        self.vehicle_at = at;
        self.scene.set_transform(self.handles.vehicle, at, heading(self.vehicle_yaw));
        if let Some(c) = self.chase {
            let eye = chase_eye(at, self.vehicle_yaw, c.radius, c.height);
            self.scene.look_at(self.handles.camera, eye, at);
        }
    }
}
