//! glam <-> nalgebra conversions at the rapier boundary.

use engine_core::Transform;
use glam::{Quat, Vec3};
use rapier3d::na::{Quaternion, UnitQuaternion};
use rapier3d::prelude::*;

pub fn vec_to_na(v: Vec3) -> Vector<Real> {
    vector![v.x, v.y, v.z]
}

pub fn point_to_na(v: Vec3) -> Point<Real> {
    point![v.x, v.y, v.z]
}

pub fn vec_from_na(v: &Vector<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

pub fn quat_to_na(q: Quat) -> UnitQuaternion<Real> {
    UnitQuaternion::from_quaternion(Quaternion::new(q.w, q.x, q.y, q.z))
}

pub fn quat_from_na(q: &UnitQuaternion<Real>) -> Quat {
    Quat::from_xyzw(q.i, q.j, q.k, q.w)
}

pub fn isometry(position: Vec3, rotation: Quat) -> Isometry<Real> {
    Isometry::from_parts(vec_to_na(position).into(), quat_to_na(rotation))
}

pub fn transform_from_isometry(iso: &Isometry<Real>) -> Transform {
    Transform::from_position_rotation(vec_from_na(&iso.translation.vector), quat_from_na(&iso.rotation))
}

/// Unit axis, falling back to +X for degenerate input.
pub fn unit_axis(v: Vec3) -> UnitVector<Real> {
    UnitVector::try_new(vec_to_na(v), 1.0e-6).unwrap_or_else(Vector::x_axis)
}
