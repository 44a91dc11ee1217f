//! Constraint construction.
//!
//! Every joint kind is expressed as a rapier [`GenericJoint`] with the
//! appropriate locked, limited and motorised axes. Frames are given in
//! each body's local space.

use crate::convert::{isometry, point_to_na, unit_axis};
use crate::descriptor::{DofLimits, JointDescriptor, JointKind, SpringParams};
use rapier3d::prelude::*;

/// Axes in spring/limit order: linear xyz, then angular xyz.
const AXES: [(JointAxis, JointAxesMask); 6] = [
    (JointAxis::LinX, JointAxesMask::LIN_X),
    (JointAxis::LinY, JointAxesMask::LIN_Y),
    (JointAxis::LinZ, JointAxesMask::LIN_Z),
    (JointAxis::AngX, JointAxesMask::ANG_X),
    (JointAxis::AngY, JointAxesMask::ANG_Y),
    (JointAxis::AngZ, JointAxesMask::ANG_Z),
];

/// Velocity-motor damping. High enough that the target speed is reached
/// within a frame unless the max force caps it.
pub(crate) const MOTOR_DAMPING: Real = 1.0e3;

/// Drive the hinge axis towards `target_velocity`, pushing with at most
/// `max_impulse` per second.
pub(crate) fn set_angular_motor(data: &mut GenericJoint, target_velocity: f32, max_impulse: f32) {
    data.set_motor_velocity(JointAxis::AngX, target_velocity, MOTOR_DAMPING)
        .set_motor_max_force(JointAxis::AngX, max_impulse);
}

/// Build the joint data for `desc`. Body resolution happens in the caller.
pub fn build_joint(desc: &JointDescriptor) -> GenericJoint {
    let frame_a = isometry(desc.anchor_a, desc.frame_rotation_a);
    let frame_b = isometry(desc.anchor_b, desc.frame_rotation_b);

    let mut data = match &desc.kind {
        JointKind::PointToPoint => GenericJointBuilder::new(JointAxesMask::LOCKED_SPHERICAL_AXES)
            .local_anchor1(point_to_na(desc.anchor_a))
            .local_anchor2(point_to_na(desc.anchor_b))
            .build(),
        JointKind::Hinge {
            axis_a,
            axis_b,
            limit,
            motor,
        } => {
            let mut hinge = RevoluteJointBuilder::new(unit_axis(*axis_a))
                .local_anchor1(point_to_na(desc.anchor_a))
                .local_anchor2(point_to_na(desc.anchor_b));
            if let Some(limit) = limit {
                hinge = hinge.limits(*limit);
            }
            let mut data: GenericJoint = hinge.build().into();
            data.set_local_axis2(unit_axis(*axis_b));
            if let Some(motor) = motor {
                set_angular_motor(&mut data, motor.target_velocity, motor.max_impulse);
            }
            data
        }
        JointKind::Slider { limit } => {
            let mut slider = GenericJointBuilder::new(JointAxesMask::LOCKED_PRISMATIC_AXES)
                .local_frame1(frame_a)
                .local_frame2(frame_b);
            if let Some(limit) = limit {
                slider = slider.limits(JointAxis::LinX, *limit);
            }
            slider.build()
        }
        JointKind::ConeTwist {
            swing_span1,
            swing_span2,
            twist_span,
        } => GenericJointBuilder::new(JointAxesMask::LOCKED_SPHERICAL_AXES)
            .local_frame1(frame_a)
            .local_frame2(frame_b)
            .limits(JointAxis::AngX, [-twist_span, *twist_span])
            .limits(JointAxis::AngZ, [-swing_span1, *swing_span1])
            .limits(JointAxis::AngY, [-swing_span2, *swing_span2])
            .build(),
        JointKind::SixDof(limits) => six_dof(limits, frame_a, frame_b).build(),
        JointKind::SixDofSpring(limits, springs) => {
            with_springs(six_dof(limits, frame_a, frame_b), springs).build()
        }
    };
    data.set_contacts_enabled(desc.allow_collision);
    data
}

fn six_dof(limits: &DofLimits, frame_a: Isometry<Real>, frame_b: Isometry<Real>) -> GenericJointBuilder {
    let lower = limits.linear_lower.to_array().into_iter().chain(limits.angular_lower.to_array());
    let upper = limits.linear_upper.to_array().into_iter().chain(limits.angular_upper.to_array());

    let mut locked = JointAxesMask::empty();
    let mut ranges = Vec::new();
    for ((axis, bit), (lo, hi)) in AXES.iter().zip(lower.zip(upper)) {
        if lo == hi {
            locked |= *bit;
        } else if lo < hi {
            ranges.push((*axis, [lo, hi]));
        }
    }

    ranges.into_iter().fold(
        GenericJointBuilder::new(locked).local_frame1(frame_a).local_frame2(frame_b),
        |builder, (axis, range)| builder.limits(axis, range),
    )
}

/// Springs pull each enabled axis back to its rest position.
fn with_springs(builder: GenericJointBuilder, springs: &SpringParams) -> GenericJointBuilder {
    AXES.iter()
        .enumerate()
        .filter(|(i, _)| springs.enabled[*i])
        .fold(builder, |builder, (i, (axis, _))| {
            builder.motor_position(*axis, 0.0, springs.stiffness[i], springs.damping[i])
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::JointMotor;
    use glam::Vec3;

    fn joint(kind: JointKind) -> GenericJoint {
        build_joint(&JointDescriptor::new(kind, "a", "b"))
    }

    #[test]
    fn point_to_point_locks_translation_only() {
        let data = joint(JointKind::PointToPoint);
        assert_eq!(data.locked_axes, JointAxesMask::LOCKED_SPHERICAL_AXES);
        assert!(!data.contacts_enabled);
    }

    #[test]
    fn hinge_carries_limit_and_motor() {
        let data = joint(JointKind::Hinge {
            axis_a: Vec3::Y,
            axis_b: Vec3::Y,
            limit: Some([-0.5, 0.5]),
            motor: Some(JointMotor {
                target_velocity: 2.0,
                max_impulse: 10.0,
            }),
        });
        assert!(data.limit_axes.contains(JointAxesMask::ANG_X));
        assert!(data.motor_axes.contains(JointAxesMask::ANG_X));
        assert!(!data.locked_axes.contains(JointAxesMask::ANG_X));
        let motor = data.motors[JointAxis::AngX as usize];
        assert_eq!((motor.target_vel, motor.damping, motor.max_force), (2.0, MOTOR_DAMPING, 10.0));
    }

    #[test]
    fn slider_is_free_along_x() {
        let data = joint(JointKind::Slider { limit: Some([0.0, 2.0]) });
        assert!(!data.locked_axes.contains(JointAxesMask::LIN_X));
        assert!(data.limit_axes.contains(JointAxesMask::LIN_X));
    }

    #[test]
    fn six_dof_axes_follow_lower_upper_ordering() {
        let limits = DofLimits {
            linear_lower: Vec3::new(0.0, -1.0, 1.0),
            linear_upper: Vec3::new(0.0, 1.0, -1.0),
            angular_lower: Vec3::ZERO,
            angular_upper: Vec3::ZERO,
        };
        let data = joint(JointKind::SixDof(limits));
        assert!(data.locked_axes.contains(JointAxesMask::LIN_X));
        assert!(data.limit_axes.contains(JointAxesMask::LIN_Y));
        assert!(!data.locked_axes.contains(JointAxesMask::LIN_Z));
        assert!(!data.limit_axes.contains(JointAxesMask::LIN_Z));
        assert!(data.locked_axes.contains(JointAxesMask::ANG_X | JointAxesMask::ANG_Y | JointAxesMask::ANG_Z));
    }

    #[test]
    fn springs_motorise_enabled_axes() {
        let limits = DofLimits {
            linear_lower: Vec3::ONE,
            linear_upper: -Vec3::ONE,
            ..Default::default()
        };
        let mut springs = SpringParams::default();
        springs.enabled[1] = true;
        springs.stiffness[1] = 50.0;
        let data = joint(JointKind::SixDofSpring(limits, springs));
        assert!(data.motor_axes.contains(JointAxesMask::LIN_Y));
        assert!(!data.motor_axes.contains(JointAxesMask::LIN_X));
    }

    #[test]
    fn collision_between_bodies_is_opt_in() {
        let mut desc = JointDescriptor::new(JointKind::PointToPoint, "a", "b");
        desc.allow_collision = true;
        assert!(build_joint(&desc).contacts_enabled);
    }
}
