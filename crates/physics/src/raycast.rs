//! Segment ray queries against the world.

use crate::convert::{point_to_na, vec_from_na, vec_to_na};
use crate::PhysicsWorld;
use glam::Vec3;
use rapier3d::prelude::*;

/// Closest hit along a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    /// The body owning the hit collider, if it has one.
    pub body: Option<RigidBodyHandle>,
    /// Distance from the segment start to the hit point.
    pub distance: f32,
    /// World position of the hit.
    pub point: Vec3,
    /// Surface normal at the hit point.
    pub normal: Vec3,
}

/// A named ray hit, as reported to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct RayHit {
    pub name: Option<String>,
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

impl PhysicsWorld {
    /// Cast from `from` towards `to` and return the first hit before `to`.
    /// Expects an up-to-date query pipeline.
    pub fn ray_test(&self, from: Vec3, to: Vec3) -> Option<RaycastHit> {
        let delta = to - from;
        let length = delta.length();
        if length < 1.0e-6 {
            return None;
        }
        let ray = Ray::new(point_to_na(from), vec_to_na(delta / length));

        self.query_pipeline
            .cast_ray_and_get_normal(
                &self.rigid_body_set,
                &self.collider_set,
                &ray,
                length,
                true,
                QueryFilter::default(),
            )
            .map(|(collider, intersection)| {
                let point = ray.point_at(intersection.time_of_impact);
                RaycastHit {
                    body: self.collider_set.get(collider).and_then(|c| c.parent()),
                    distance: intersection.time_of_impact,
                    point: vec_from_na(&point.coords),
                    normal: vec_from_na(&intersection.normal),
                }
            })
    }
}
