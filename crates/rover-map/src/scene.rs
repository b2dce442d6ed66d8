//! Scene primitives behind a small backend trait.
//!
//! A renderer only has to create primitives and accept buffer/transform
//! updates. [`HeadlessScene`] keeps everything in memory.

use glam::{Quat, Vec3};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrimitiveId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    PointCloud,
    Polyline,
    Marker,
    Camera,
}

pub trait SceneBackend {
    fn create(&mut self, kind: PrimitiveKind, name: &str) -> PrimitiveId;

    /// Replaces the vertex buffer of a cloud or polyline.
    fn set_positions(&mut self, id: PrimitiveId, positions: Vec<Vec3>);

    fn set_transform(&mut self, id: PrimitiveId, translation: Vec3, rotation: Quat);

    fn look_at(&mut self, id: PrimitiveId, eye: Vec3, target: Vec3);
}

/// Handles captured once at construction; the synchronizer never looks
/// objects up by name.
#[derive(Debug, Clone, Copy)]
pub struct SceneHandles {
    pub cloud: PrimitiveId,
    pub trajectory: PrimitiveId,
    pub vehicle: PrimitiveId,
    pub camera: PrimitiveId,
}

impl SceneHandles {
    pub fn create<S: SceneBackend>(scene: &mut S) -> Self {
        Self {
            cloud: scene.create(PrimitiveKind::PointCloud, "map points"),
            trajectory: scene.create(PrimitiveKind::Polyline, "trajectory"),
            vehicle: scene.create(PrimitiveKind::Marker, "vehicle"),
            camera: scene.create(PrimitiveKind::Camera, "viewer"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    pub kind: PrimitiveKind,
    pub name: String,
    pub positions: Vec<Vec3>,
    pub translation: Vec3,
    pub rotation: Quat,
    pub target: Option<Vec3>,
    /// Number of buffer/transform updates applied
    pub revision: u64,
}

#[derive(Debug, Default)]
pub struct HeadlessScene {
    next_id: u32,
    objects: BTreeMap<PrimitiveId, Primitive>,
}

impl HeadlessScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: PrimitiveId) -> Option<&Primitive> {
        self.objects.get(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        for (id, p) in &self.objects {
            let t = p.translation;
            let _ = write!(
                out,
                "#{} {} ({:?}): {} vertices, at ({:.2}, {:.2}, {:.2}), rev {}",
                id.0,
                p.name,
                p.kind,
                p.positions.len(),
                t.x,
                t.y,
                t.z,
                p.revision
            );
            out.push('\n');
        }
        out
    }

    fn slot(&mut self, id: PrimitiveId) -> Option<&mut Primitive> {
        let slot = self.objects.get_mut(&id);
        if slot.is_none() {
            warn!("scene: no primitive #{}", id.0);
        }
        slot
    }
}

impl SceneBackend for HeadlessScene {
    fn create(&mut self, kind: PrimitiveKind, name: &str) -> PrimitiveId {
        let id = PrimitiveId(self.next_id);
        self.next_id += 1;
        self.objects.insert(
            id,
            Primitive {
                kind,
                name: name.to_string(),
                positions: Vec::new(),
                translation: Vec3::ZERO,
                rotation: Quat::IDENTITY,
                target: None,
                revision: 0,
            },
        );
        id
    }

    fn set_positions(&mut self, id: PrimitiveId, positions: Vec<Vec3>) {
        if let Some(p) = self.slot(id) {
            p.positions = positions;
            p.revision += 1;
        }
    }

    fn set_transform(&mut self, id: PrimitiveId, translation: Vec3, rotation: Quat) {
        if let Some(p) = self.slot(id) {
            p.translation = translation;
            p.rotation = rotation;
            p.revision += 1;
        }
    }

    fn look_at(&mut self, id: PrimitiveId, eye: Vec3, target: Vec3) {
        if let Some(p) = self.slot(id) {
            p.translation = eye;
            p.target = Some(target);
            p.revision += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_address_distinct_primitives() {
        let mut scene = HeadlessScene::new();
        let h = SceneHandles::create(&mut scene);
        assert_eq!(scene.len(), 4);
        assert_eq!(scene.get(h.cloud).map(|p| p.kind), Some(PrimitiveKind::PointCloud));
        assert_eq!(scene.get(h.camera).map(|p| p.kind), Some(PrimitiveKind::Camera));
        assert_ne!(h.vehicle, h.trajectory);
    }

    #[test]
    fn updates_bump_revision() {
        let mut scene = HeadlessScene::new();
        let id = scene.create(PrimitiveKind::Polyline, "line");
        scene.set_positions(id, vec![Vec3::ZERO, Vec3::ONE]);
        scene.set_transform(id, Vec3::X, Quat::IDENTITY);
        let p = scene.get(id).unwrap();
        assert_eq!(p.positions.len(), 2);
        assert_eq!(p.revision, 2);
        assert!(scene.summary().contains("line (Polyline): 2 vertices"));
    }

    #[test]
    fn unknown_handle_is_ignored() {
        let mut scene = HeadlessScene::new();
        scene.set_positions(PrimitiveId(7), vec![Vec3::ZERO]);
        assert!(scene.is_empty());
    }
}
