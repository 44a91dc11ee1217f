//! Transform type and rotation helpers shared by the host and physics sides.

use glam::{EulerRot, Quat, Vec3};

/// Multiply degrees by this to get radians.
pub const TO_RAD: f32 = std::f32::consts::PI / 180.0;

/// A rigid transform: position and orientation. Scale never crosses the bridge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Transform {
    /// Create a new transform at the given position.
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a new transform with position and rotation.
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Position followed by quaternion `[x, y, z, qx, qy, qz, qw]`.
    pub fn to_array(&self) -> [f32; 7] {
        let p = self.position;
        let q = self.rotation;
        [p.x, p.y, p.z, q.x, q.y, q.z, q.w]
    }

    /// Inverse of [`Transform::to_array`].
    pub fn from_array(a: &[f32; 7]) -> Self {
        Self {
            position: Vec3::new(a[0], a[1], a[2]),
            rotation: Quat::from_xyzw(a[3], a[4], a[5], a[6]),
        }
    }
}

/// Convert a per-axis degree vector to radians.
pub fn degrees_to_radians(degrees: Vec3) -> Vec3 {
    degrees * TO_RAD
}

/// Quaternion from intrinsic XYZ Euler angles given in degrees.
pub fn quat_from_euler_degrees(degrees: Vec3) -> Quat {
    let r = degrees_to_radians(degrees);
    Quat::from_euler(EulerRot::XYZ, r.x, r.y, r.z)
}
