//! Physics world management with Rapier3D.

use crate::config::{BroadphaseKind, WorldConfig};
use crate::convert::{transform_from_isometry, vec_to_na};
use crate::error::{PhysicsError, PhysicsResult};
use engine_core::Transform;
use glam::Vec3;
use rapier3d::prelude::*;

/// Engine object counts, for leak checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeCounts {
    pub bodies: usize,
    pub colliders: usize,
    pub joints: usize,
}

/// The simulation world and everything rooted in it.
///
/// Field order is drop order: world contents go first, then the solver,
/// then the narrow phase (collision dispatch), then the broad phase.
pub struct PhysicsWorld {
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,
    pub island_manager: IslandManager,
    pub query_pipeline: QueryPipeline,
    pub ccd_solver: CCDSolver,
    pub physics_pipeline: PhysicsPipeline,
    pub narrow_phase: NarrowPhase,
    pub broad_phase: DefaultBroadPhase,
    pub gravity: Vector<Real>,
    pub integration_parameters: IntegrationParameters,
    broadphase_kind: BroadphaseKind,
    kinematic_targets: Vec<(RigidBodyHandle, Isometry<Real>)>,
}

impl PhysicsWorld {
    /// Create a world from the session config.
    pub fn new(config: &WorldConfig) -> Self {
        let mut world = Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            island_manager: IslandManager::new(),
            query_pipeline: QueryPipeline::new(),
            ccd_solver: CCDSolver::new(),
            physics_pipeline: PhysicsPipeline::new(),
            narrow_phase: NarrowPhase::new(),
            broad_phase: DefaultBroadPhase::new(),
            gravity: vec_to_na(config.gravity()),
            integration_parameters: IntegrationParameters::default(),
            broadphase_kind: config.broadphase,
            kinematic_targets: Vec::new(),
        };
        if let Some(penetration) = config.allowed_penetration {
            world.set_allowed_penetration(penetration);
        }
        log::debug!("physics world created ({:?})", config.broadphase);
        world
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = vec_to_na(gravity);
    }

    /// Penetration depth the solver tolerates before correcting.
    pub fn set_allowed_penetration(&mut self, depth: f32) {
        let params = &mut self.integration_parameters;
        params.normalized_allowed_linear_error = depth / params.length_unit;
    }

    pub fn allowed_penetration(&self) -> f32 {
        self.integration_parameters.allowed_linear_error()
    }

    /// Move a kinematic body to `target` over the next [`Self::advance`].
    /// The latest target for a body wins.
    pub fn drive_kinematic(&mut self, handle: RigidBodyHandle, target: Isometry<Real>) {
        self.kinematic_targets.retain(|(h, _)| *h != handle);
        self.kinematic_targets.push((handle, target));
    }

    /// Advance by `dt` seconds split into `substeps` equal pipeline steps.
    /// Forces and torques applied before the call act on every substep and
    /// are cleared afterwards. Kinematic targets are reached on the last
    /// substep, so the solver sees steady motion rather than a jump.
    pub fn advance(&mut self, dt: f32, substeps: u32) {
        let substeps = substeps.max(1);
        self.integration_parameters.dt = dt / substeps as f32;
        let paths: Vec<_> = std::mem::take(&mut self.kinematic_targets)
            .into_iter()
            .filter_map(|(h, target)| {
                let body = self.rigid_body_set.get(h)?;
                Some((h, *body.position(), target))
            })
            .collect();
        for i in 1..=substeps {
            let t = i as f32 / substeps as f32;
            for (h, start, target) in &paths {
                if let Some(body) = self.rigid_body_set.get_mut(*h) {
                    body.set_next_kinematic_position(start.lerp_slerp(target, t));
                }
            }
            self.step();
        }
        self.clear_forces();
        if let BroadphaseKind::AxisSweep { half_extent, .. } = self.broadphase_kind {
            self.disable_out_of_bounds(half_extent);
        }
    }

    /// Step the physics simulation once with the current parameters.
    fn step(&mut self) {
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
    }

    fn clear_forces(&mut self) {
        let pushed: Vec<RigidBodyHandle> = self
            .rigid_body_set
            .iter()
            .filter(|(_, b)| b.user_force() != Vector::zeros() || b.user_torque() != Vector::zeros())
            .map(|(h, _)| h)
            .collect();
        for handle in pushed {
            if let Some(body) = self.rigid_body_set.get_mut(handle) {
                body.reset_forces(false);
                body.reset_torques(false);
            }
        }
    }

    /// The bounded broadphase cannot track objects outside its region.
    fn disable_out_of_bounds(&mut self, half_extent: f32) {
        let escaped: Vec<RigidBodyHandle> = self
            .rigid_body_set
            .iter()
            .filter(|(_, b)| b.is_dynamic() && b.is_enabled())
            .filter(|(_, b)| b.translation().amax() > half_extent)
            .map(|(h, _)| h)
            .collect();
        for handle in escaped {
            if let Some(body) = self.rigid_body_set.get_mut(handle) {
                log::warn!("body {:?} left the broadphase bounds; disabling", handle);
                body.set_enabled(false);
            }
        }
    }

    /// Update query pipeline for contact and ray queries.
    pub fn update_query_pipeline(&mut self) {
        self.query_pipeline.update(&self.collider_set);
    }

    /// Insert a body with its single collider.
    pub fn insert_body(&mut self, body: RigidBody, collider: Collider) -> PhysicsResult<RigidBodyHandle> {
        if let BroadphaseKind::AxisSweep { max_handles, .. } = self.broadphase_kind {
            if self.collider_set.len() >= max_handles {
                return Err(PhysicsError::BroadphaseFull {
                    capacity: max_handles,
                });
            }
        }
        let handle = self.rigid_body_set.insert(body);
        self.collider_set
            .insert_with_parent(collider, handle, &mut self.rigid_body_set);
        Ok(handle)
    }

    /// Remove a rigid body, its colliders, and any joints attached to it.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) -> bool {
        self.kinematic_targets.retain(|(h, _)| *h != handle);
        self.rigid_body_set
            .remove(
                handle,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true,
            )
            .is_some()
    }

    pub fn remove_joint(&mut self, handle: ImpulseJointHandle) -> bool {
        self.impulse_joint_set.remove(handle, true).is_some()
    }

    /// Get the transform of a rigid body.
    pub fn body_transform(&self, handle: RigidBodyHandle) -> Option<Transform> {
        self.rigid_body_set
            .get(handle)
            .map(|body| transform_from_isometry(body.position()))
    }

    pub fn native_counts(&self) -> NativeCounts {
        NativeCounts {
            bodies: self.rigid_body_set.len(),
            colliders: self.collider_set.len(),
            joints: self.impulse_joint_set.len(),
        }
    }

    /// Tear the world down in a fixed order.
    pub fn destroy(self) {
        let Self {
            rigid_body_set,
            collider_set,
            impulse_joint_set,
            multibody_joint_set,
            island_manager,
            query_pipeline,
            ccd_solver,
            physics_pipeline,
            narrow_phase,
            broad_phase,
            kinematic_targets,
            ..
        } = self;
        drop(kinematic_targets);
        drop((impulse_joint_set, multibody_joint_set));
        drop((collider_set, rigid_body_set, island_manager, query_pipeline, ccd_solver));
        drop(physics_pipeline);
        drop(narrow_phase);
        drop(broad_phase);
        log::debug!("physics world destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ball_at(world: &mut PhysicsWorld, y: f32) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic().translation(vector![0.0, y, 0.0]).build();
        world.insert_body(body, ColliderBuilder::ball(0.5).build()).unwrap()
    }

    #[test]
    fn substeps_cover_the_whole_interval() {
        let mut world = PhysicsWorld::new(&WorldConfig::default());
        let h = ball_at(&mut world, 10.0);
        world.advance(0.5, 4);
        assert!((world.integration_parameters.dt - 0.125).abs() < 1e-6);
        let vy = world.rigid_body_set[h].linvel().y;
        assert!((vy + 5.0).abs() < 1e-3, "vy = {vy}");
    }

    #[test]
    fn forces_last_one_advance() {
        let mut world = PhysicsWorld::new(&WorldConfig {
            gravity: [0.0; 3],
            ..Default::default()
        });
        let h = ball_at(&mut world, 0.0);
        world.rigid_body_set[h].add_force(vector![1.0, 0.0, 0.0], true);
        world.advance(1.0 / 60.0, 2);
        let v1 = world.rigid_body_set[h].linvel().x;
        world.advance(1.0 / 60.0, 2);
        let v2 = world.rigid_body_set[h].linvel().x;
        assert!(v1 > 0.0);
        assert!((v2 - v1).abs() < 1e-6);
    }

    #[test]
    fn axis_sweep_caps_handles_and_bounds() {
        let mut world = PhysicsWorld::new(&WorldConfig {
            broadphase: BroadphaseKind::AxisSweep {
                half_extent: 5.0,
                max_handles: 1,
            },
            ..Default::default()
        });
        let h = ball_at(&mut world, 4.9);
        let second = world.insert_body(
            RigidBodyBuilder::dynamic().build(),
            ColliderBuilder::ball(0.5).build(),
        );
        assert_eq!(second, Err(PhysicsError::BroadphaseFull { capacity: 1 }));
        assert_eq!(world.native_counts().bodies, 1);

        world.rigid_body_set[h].set_linvel(vector![0.0, 60.0, 0.0], true);
        world.advance(1.0 / 60.0, 1);
        assert!(!world.rigid_body_set[h].is_enabled());
    }

    #[test]
    fn kinematic_targets_spread_over_substeps() {
        let mut world = PhysicsWorld::new(&WorldConfig::default());
        let h = world
            .insert_body(
                RigidBodyBuilder::kinematic_position_based().build(),
                ColliderBuilder::ball(0.5).build(),
            )
            .unwrap();
        world.drive_kinematic(h, Isometry::translation(1.0, 0.0, 0.0));
        world.advance(0.5, 4);
        let body = &world.rigid_body_set[h];
        assert!((body.translation().x - 1.0).abs() < 1e-5);
        assert!((body.linvel().x - 2.0).abs() < 1e-3);

        world.advance(0.5, 4);
        assert!(world.rigid_body_set[h].linvel().norm() < 1e-6);
    }

    #[test]
    fn configured_penetration_reaches_the_solver() {
        let mut world = PhysicsWorld::new(&WorldConfig {
            allowed_penetration: Some(0.01),
            ..Default::default()
        });
        assert!((world.allowed_penetration() - 0.01).abs() < 1e-6);
        world.set_allowed_penetration(0.05);
        assert!((world.allowed_penetration() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn removing_a_body_frees_its_collider() {
        let mut world = PhysicsWorld::new(&WorldConfig::default());
        let h = ball_at(&mut world, 0.0);
        assert!(world.remove_body(h));
        assert!(!world.remove_body(h));
        assert_eq!(world.native_counts(), NativeCounts::default());
    }
}
