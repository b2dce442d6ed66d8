//! The one place where server coordinates become render coordinates.
//!
//! Server frame: x forward, y left, z up, yaw in degrees.
//! Render frame: y up, rotations in radians about render-up.

use glam::{Quat, Vec3};
use rover_proto::http::ServerPoint;

/// (x, y, z) -> (x, z, y)
pub fn server_to_render(p: ServerPoint) -> Vec3 {
    Vec3::new(p[0] as f32, p[2] as f32, p[1] as f32)
}

/// Non-finite points are dropped.
pub fn server_points_to_render(points: &[ServerPoint]) -> Vec<Vec3> {
    points.iter().map(|p| server_to_render(*p)).filter(|v| v.is_finite()).collect()
}

/// Server yaw (degrees) to render rotation angle about up (radians).
pub fn yaw_to_render(yaw_deg: f64) -> f32 {
    (-yaw_deg.to_radians()) as f32
}

pub fn heading(yaw_rad: f32) -> Quat {
    Quat::from_rotation_y(yaw_rad)
}

/// Direction the vehicle faces in the render frame. Zero yaw faces +x.
pub fn forward(yaw_rad: f32) -> Vec3 {
    heading(yaw_rad) * Vec3::X
}

/// Eye position for a camera trailing the vehicle along its heading.
pub fn chase_eye(vehicle: Vec3, yaw_rad: f32, radius: f32, height: f32) -> Vec3 {
    vehicle - forward(yaw_rad) * radius + Vec3::Y * height
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn swaps_y_and_z() {
        assert_eq!(server_to_render([1.0, 2.0, 3.0]), Vec3::new(1.0, 3.0, 2.0));
    }

    #[test]
    fn yaw_is_negated_radians() {
        assert!((yaw_to_render(90.0) + FRAC_PI_2).abs() < 1e-6);
        assert_eq!(yaw_to_render(0.0), 0.0);
    }

    #[test]
    fn nan_points_are_dropped() {
        let pts = server_points_to_render(&[[0.0, 0.0, 0.0], [f64::NAN, 1.0, 1.0]]);
        assert_eq!(pts, vec![Vec3::ZERO]);
    }

    #[test]
    fn chase_eye_sits_behind_and_above() {
        let eye = chase_eye(Vec3::new(5.0, 0.0, 0.0), 0.0, 3.0, 2.0);
        assert!(close(eye, Vec3::new(2.0, 2.0, 0.0)));

        // server yaw 90 deg (turned left, towards server +y = render +z)
        let yaw = yaw_to_render(90.0);
        assert!(close(forward(yaw), Vec3::Z));
        assert!(close(chase_eye(Vec3::ZERO, yaw, 3.0, 2.0), Vec3::new(0.0, 2.0, -3.0)));
    }
}
