//! The host's side of the contract: where decoded results go, and the
//! degree-based conveniences host code describes entities with.

use engine_core::{quat_from_euler_degrees, TO_RAD};
use glam::{Quat, Vec3};
use physics::{JointDescriptor, JointKind, RigidBodyDescriptor};

/// Receives per-frame results from the bridge.
pub trait SceneSink {
    /// Whatever the host renders a body with.
    type Handle;

    fn apply_transform(&mut self, handle: &Self::Handle, position: Vec3, rotation: Quat);

    /// One call per contact-group slot per completed step.
    fn on_contact_result(&mut self, slot: usize, value: u8);

    /// New terrain heights reached the collision shape; rebuild the mesh.
    fn on_terrain_ready(&mut self, _name: &str) {}
}

/// Host-facing body options expressed the way scene code writes them.
pub trait BodyDescriptorExt {
    /// Orientation from XYZ Euler angles in degrees.
    fn rotated_degrees(self, degrees: Vec3) -> Self;
    /// Alias for mass.
    fn density(self, density: f32) -> Self;
    /// Alias for restitution.
    fn bounce(self, bounce: f32) -> Self;
}

impl BodyDescriptorExt for RigidBodyDescriptor {
    fn rotated_degrees(mut self, degrees: Vec3) -> Self {
        self.rotation = quat_from_euler_degrees(degrees);
        self
    }

    fn density(mut self, density: f32) -> Self {
        self.mass = density;
        self
    }

    fn bounce(mut self, bounce: f32) -> Self {
        self.restitution = Some(bounce);
        self
    }
}

/// Host-facing joint options in degrees.
pub trait JointDescriptorExt {
    /// Hinge rotation limits, in degrees.
    fn hinge_limit_degrees(self, lower: f32, upper: f32) -> Self;
    /// Cone-twist spans, in degrees.
    fn cone_degrees(self, swing1: f32, swing2: f32, twist: f32) -> Self;
    /// Local frame orientations from XYZ Euler angles in degrees.
    fn frames_degrees(self, a: Vec3, b: Vec3) -> Self;
    /// Express limits in body B's frame instead of body A's.
    fn measured_from_b(self) -> Self;
}

impl JointDescriptorExt for JointDescriptor {
    fn hinge_limit_degrees(mut self, lower: f32, upper: f32) -> Self {
        if let JointKind::Hinge { limit, .. } = &mut self.kind {
            *limit = Some([lower * TO_RAD, upper * TO_RAD]);
        } else {
            log::warn!("hinge limit ignored on {:?}", self.kind);
        }
        self
    }

    fn cone_degrees(mut self, swing1: f32, swing2: f32, twist: f32) -> Self {
        self.kind = JointKind::ConeTwist {
            swing_span1: swing1 * TO_RAD,
            swing_span2: swing2 * TO_RAD,
            twist_span: twist * TO_RAD,
        };
        self
    }

    fn frames_degrees(mut self, a: Vec3, b: Vec3) -> Self {
        self.frame_rotation_a = quat_from_euler_degrees(a);
        self.frame_rotation_b = quat_from_euler_degrees(b);
        self
    }

    fn measured_from_b(mut self) -> Self {
        std::mem::swap(&mut self.body_a, &mut self.body_b);
        std::mem::swap(&mut self.anchor_a, &mut self.anchor_b);
        std::mem::swap(&mut self.frame_rotation_a, &mut self.frame_rotation_b);
        if let JointKind::Hinge { axis_a, axis_b, .. } = &mut self.kind {
            std::mem::swap(axis_a, axis_b);
        }
        self
    }
}
