//! Deferred mutations applied at the start of every step, before the
//! integrator runs, so nothing touches live simulation state mid-step.

use crate::convert::{isometry, quat_from_na, vec_from_na, vec_to_na};
use crate::joints::set_angular_motor;
use crate::physics_world::PhysicsWorld;
use crate::registry::NameIndex;
use glam::{Quat, Vec3};
use rapier3d::prelude::*;

/// Single-consumer command buffer, drained to empty once per step.
#[derive(Debug)]
pub struct CommandQueue<T> {
    pending: Vec<T>,
}

impl<T> Default for CommandQueue<T> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
        }
    }
}

impl<T> CommandQueue<T> {
    pub fn push(&mut self, command: T) {
        self.pending.push(command);
    }

    pub fn extend(&mut self, commands: impl IntoIterator<Item = T>) {
        self.pending.extend(commands);
    }

    /// Take everything pending in issuance order.
    pub fn drain_fifo(&mut self) -> Vec<T> {
        std::mem::take(&mut self.pending)
    }

    /// Take everything pending, most recent first.
    pub fn drain_lifo(&mut self) -> Vec<T> {
        let mut all = self.drain_fifo();
        all.reverse();
        all
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// What to do to the target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ForceOp {
    /// World-space force at `offset` from the centre of mass.
    Force { force: Vec3, offset: Vec3 },
    Torque(Vec3),
    /// Torque expressed in the body's local frame.
    LocalTorque(Vec3),
    CentralForce(Vec3),
    /// Central force expressed in the body's local frame.
    LocalForce(Vec3),
    /// World-space impulse at `offset` from the centre of mass.
    Impulse { impulse: Vec3, offset: Vec3 },
    CentralImpulse(Vec3),
    /// Drive a hinge joint's angular motor. Targets a joint, not a body.
    Motor {
        target_velocity: f32,
        max_impulse: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForceCommand {
    pub target: String,
    pub op: ForceOp,
}

impl ForceCommand {
    pub fn new(target: impl Into<String>, op: ForceOp) -> Self {
        Self {
            target: target.into(),
            op,
        }
    }
}

/// Which components of the current transform an override keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HoldMask {
    pub x: bool,
    pub y: bool,
    pub z: bool,
    pub rotation: bool,
}

impl HoldMask {
    pub fn is_empty(&self) -> bool {
        !(self.x || self.y || self.z || self.rotation)
    }
}

/// Teleport (or, for kinematic bodies, drive) an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOverride {
    pub target: String,
    pub position: Option<Vec3>,
    pub rotation: Option<Quat>,
    /// Held position axes become `current - requested`; a held rotation
    /// keeps the current one.
    pub hold: HoldMask,
}

impl TransformOverride {
    pub fn to_position(target: impl Into<String>, position: Vec3) -> Self {
        Self {
            target: target.into(),
            position: Some(position),
            rotation: None,
            hold: HoldMask::default(),
        }
    }
}

/// Apply forces most-recent-first. Unknown targets are dropped.
pub(crate) fn apply_forces(
    world: &mut PhysicsWorld,
    names: &NameIndex,
    queue: &mut CommandQueue<ForceCommand>,
    debug: bool,
) {
    for command in queue.drain_lifo() {
        if let ForceOp::Motor {
            target_velocity,
            max_impulse,
        } = command.op
        {
            drive_motor(world, names, &command.target, target_velocity, max_impulse, debug);
            continue;
        }

        let Some(body) = names
            .body(&command.target)
            .and_then(|h| world.rigid_body_set.get_mut(h))
        else {
            if debug {
                log::debug!("dropping force for unknown body `{}`", command.target);
            }
            continue;
        };

        let rotation = *body.rotation();
        let com = *body.center_of_mass();
        match command.op {
            ForceOp::Force { force, offset } => {
                body.add_force_at_point(vec_to_na(force), com + vec_to_na(offset), true)
            }
            ForceOp::Torque(t) => body.add_torque(vec_to_na(t), true),
            ForceOp::LocalTorque(t) => body.add_torque(rotation * vec_to_na(t), true),
            ForceOp::CentralForce(f) => body.add_force(vec_to_na(f), true),
            ForceOp::LocalForce(f) => body.add_force(rotation * vec_to_na(f), true),
            ForceOp::Impulse { impulse, offset } => {
                body.apply_impulse_at_point(vec_to_na(impulse), com + vec_to_na(offset), true)
            }
            ForceOp::CentralImpulse(i) => body.apply_impulse(vec_to_na(i), true),
            ForceOp::Motor { .. } => {}
        }
    }
}

fn drive_motor(
    world: &mut PhysicsWorld,
    names: &NameIndex,
    target: &str,
    target_velocity: f32,
    max_impulse: f32,
    debug: bool,
) {
    let Some(handle) = names.joint(target) else {
        if debug {
            log::debug!("dropping motor update for unknown joint `{target}`");
        }
        return;
    };
    let Some((_, joint)) = world
        .impulse_joint_set
        .iter_mut()
        .find(|(h, _)| *h == handle)
    else {
        return;
    };
    set_angular_motor(&mut joint.data, target_velocity, max_impulse);
    let (body1, body2) = (joint.body1, joint.body2);
    for h in [body1, body2] {
        if let Some(body) = world.rigid_body_set.get_mut(h) {
            body.wake_up(true);
        }
    }
}

/// Apply overrides in issuance order, so the latest override of a body wins.
pub(crate) fn apply_transform_overrides(
    world: &mut PhysicsWorld,
    names: &NameIndex,
    queue: &mut CommandQueue<TransformOverride>,
    debug: bool,
) {
    for entry in queue.drain_fifo() {
        let Some((handle, body)) = names
            .body(&entry.target)
            .and_then(|h| world.rigid_body_set.get_mut(h).map(|b| (h, b)))
        else {
            if debug {
                log::debug!("dropping transform for unknown body `{}`", entry.target);
            }
            continue;
        };

        let current = body.position();
        let current_pos = vec_from_na(&current.translation.vector);
        let current_rot = quat_from_na(&current.rotation);

        let mut position = entry.position.unwrap_or(current_pos);
        let mut rotation = entry.rotation.unwrap_or(current_rot);
        let hold = entry.hold;
        if !hold.is_empty() {
            let requested = entry.position.unwrap_or(Vec3::ZERO);
            if hold.x {
                position.x = current_pos.x - requested.x;
            }
            if hold.y {
                position.y = current_pos.y - requested.y;
            }
            if hold.z {
                position.z = current_pos.z - requested.z;
            }
            if hold.rotation {
                rotation = current_rot;
            }
        }
        let target = isometry(position, rotation);

        if body.is_kinematic() {
            world.drive_kinematic(handle, target);
            continue;
        }
        if hold.is_empty() {
            body.set_linvel(Vector::zeros(), false);
            body.set_angvel(Vector::zeros(), false);
        }
        body.set_position(target, true);
        body.wake_up(true);
    }
}
