//! The physics side of the bridge: one simulation world, the registries
//! indexing it, the deferred command queues and the per-frame step.
//!
//! Every operation runs to completion on the caller's thread. Nothing here
//! blocks on the host.

use crate::collision::{interaction_groups, CollisionFlags};
use crate::config::{FrameInput, ResetOptions, WorldConfig, WorldParameters};
use crate::contact::{ContactGroupDescriptor, ContactGroups};
use crate::convert::{isometry, transform_from_isometry, vec_from_na, vec_to_na};
use crate::descriptor::{EntityDescriptor, JointDescriptor, MotionKind, RigidBodyDescriptor, TerrainDescriptor};
use crate::error::{PhysicsError, PhysicsResult};
use crate::joints::build_joint;
use crate::physics_world::{NativeCounts, PhysicsWorld};
use crate::queues::{apply_forces, apply_transform_overrides, CommandQueue, ForceCommand, TransformOverride};
use crate::raycast::RayHit;
use crate::registry::{EntityRef, Insertion, NameIndex, Registry};
use crate::shapes::build_shape;
use crate::terrain::{HeightHeap, TerrainManager};
use engine_core::{ResultBuffer, Transform};
use glam::Vec3;
use rapier3d::prelude::*;

/// Scale applied to a body's linear speed to produce its magnitude slot.
pub const MAGNITUDE_SCALE: f32 = 9.8;

/// Everything one step hands back to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// False when there was no world to step.
    pub status: bool,
    /// The session's result buffer, on loan until [`SimulationSession::recycle`].
    pub buffer: Option<ResultBuffer>,
    /// One 0/1 value per contact-group slot.
    pub contacts: Vec<u8>,
    /// Terrains whose heights were uploaded during this step.
    pub terrain_ready: Vec<String>,
}

impl StepOutcome {
    fn idle() -> Self {
        Self {
            status: false,
            buffer: None,
            contacts: Vec::new(),
            terrain_ready: Vec::new(),
        }
    }
}

/// Snapshot of one body, for inspection outside the result buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub transform: Transform,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub sleeping: bool,
}

pub struct SimulationSession {
    config: WorldConfig,
    world: Option<PhysicsWorld>,
    names: NameIndex,
    /// Dynamic and kinematic bodies; position is the result-buffer id.
    bodies: Registry<RigidBodyHandle>,
    solids: Registry<RigidBodyHandle>,
    /// Joint handle and its wire tag; position is the result-buffer id.
    joints: Registry<(ImpulseJointHandle, u8)>,
    terrains: TerrainManager,
    contacts: ContactGroups,
    forces: CommandQueue<ForceCommand>,
    transforms: CommandQueue<TransformOverride>,
    buffer: Option<ResultBuffer>,
    time_step: f32,
    substeps: u32,
}

impl SimulationSession {
    /// Start a session with a fresh world and its result buffer.
    pub fn new(config: WorldConfig) -> Self {
        let world = PhysicsWorld::new(&config);
        let buffer = ResultBuffer::new(config.layout());
        log::info!(
            "simulation session started ({} bodies / {} joints, dt {:.4}, {} substeps)",
            config.max_bodies,
            config.max_joints,
            config.time_step,
            config.substeps
        );
        Self {
            time_step: config.time_step,
            substeps: config.substeps,
            world: Some(world),
            buffer: Some(buffer),
            config,
            names: NameIndex::default(),
            bodies: Registry::default(),
            solids: Registry::default(),
            joints: Registry::default(),
            terrains: TerrainManager::default(),
            contacts: ContactGroups::default(),
            forces: CommandQueue::default(),
            transforms: CommandQueue::default(),
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    fn world_mut(&mut self) -> PhysicsResult<&mut PhysicsWorld> {
        self.world.as_mut().ok_or(PhysicsError::NoWorld)
    }

    // ---- world lifecycle -------------------------------------------------

    pub fn has_world(&self) -> bool {
        self.world.is_some()
    }

    /// Build a world from the session config. Does nothing if one exists.
    pub fn create_world(&mut self) -> bool {
        if self.world.is_some() {
            log::debug!("create_world ignored: world already exists");
            return false;
        }
        self.world = Some(PhysicsWorld::new(&self.config));
        true
    }

    /// Tear the world down and empty every registry.
    pub fn destroy_world(&mut self) {
        let Some(mut world) = self.world.take() else {
            return;
        };
        self.forces.clear();
        self.transforms.clear();
        self.contacts.clear();
        self.terrains.clear(&mut world);
        self.joints.take_all();
        self.bodies.take_all();
        self.solids.take_all();
        self.names.clear();
        world.destroy();
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        if let Some(world) = self.world.as_mut() {
            world.set_gravity(gravity);
        }
    }

    pub fn set_parameters(&mut self, params: WorldParameters) {
        if let Some(step) = params.time_step.filter(|dt| *dt > 0.0) {
            self.time_step = step;
        }
        if let Some(substeps) = params.substeps {
            self.substeps = substeps.max(1);
        }
        let Some(world) = self.world.as_mut() else {
            return;
        };
        if let Some(gravity) = params.gravity {
            world.set_gravity(gravity);
        }
        if let Some(depth) = params.allowed_penetration {
            world.set_allowed_penetration(depth);
        }
    }

    pub fn time_step(&self) -> f32 {
        self.time_step
    }

    pub fn substeps(&self) -> u32 {
        self.substeps
    }

    /// Remove every entity, queue entry and contact group. A full reset
    /// also rebuilds the world from the session config.
    pub fn reset(&mut self, options: ResetOptions) {
        self.forces.clear();
        self.transforms.clear();
        self.contacts.clear();
        self.names.clear();
        if let Some(world) = self.world.as_mut() {
            for (joint, _) in self.joints.take_all() {
                world.remove_joint(joint);
            }
            for body in self.bodies.take_all().into_iter().chain(self.solids.take_all()) {
                world.remove_body(body);
            }
            self.terrains.clear(world);
        }
        if options.full {
            self.destroy_world();
            self.create_world();
        }
        let gravity = self.config.gravity();
        self.set_gravity(gravity);
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.clear();
        }
        log::info!("simulation reset (full: {})", options.full);
    }

    // ---- entities --------------------------------------------------------

    pub fn add_entity(&mut self, desc: EntityDescriptor) -> PhysicsResult<Insertion> {
        match desc {
            EntityDescriptor::Body(body) => self.add_body(&body),
            EntityDescriptor::Joint(joint) => self.add_joint(&joint),
            EntityDescriptor::Terrain(terrain) => self.add_terrain(&terrain),
        }
    }

    pub fn add_body(&mut self, desc: &RigidBodyDescriptor) -> PhysicsResult<Insertion> {
        let motion = if desc.flags.contains(CollisionFlags::KINEMATIC_OBJECT) {
            MotionKind::Kinematic
        } else if desc.flags.contains(CollisionFlags::STATIC_OBJECT) {
            MotionKind::Static
        } else {
            desc.motion()
        };
        let capacity = self.config.max_bodies;
        if motion.is_read_back() && self.bodies.len() >= capacity {
            return Err(PhysicsError::ResultBufferFull {
                kind: "bodies",
                capacity,
            });
        }
        let mass = if motion == MotionKind::Dynamic { desc.mass } else { 0.0 };
        let shape = build_shape(&desc.shape, desc.size, mass, desc.margin)?;

        let builder = match motion {
            MotionKind::Dynamic => RigidBodyBuilder::dynamic(),
            MotionKind::Static => RigidBodyBuilder::fixed(),
            MotionKind::Kinematic => RigidBodyBuilder::kinematic_position_based(),
        };
        let angular_damping = desc.angular_damping.unwrap_or(0.0) + desc.rolling_friction.unwrap_or(0.0);
        let mut builder = builder
            .position(isometry(desc.position, desc.rotation))
            .linear_damping(desc.linear_damping.unwrap_or(0.0))
            .angular_damping(angular_damping)
            .can_sleep(!desc.flags.contains(CollisionFlags::DISABLE_DEACTIVATION));
        if let Some(velocity) = desc.linear_velocity {
            builder = builder.linvel(vec_to_na(velocity));
        }

        let mut collider = ColliderBuilder::new(shape)
            .collision_groups(interaction_groups(desc.group, desc.mask))
            .sensor(desc.flags.contains(CollisionFlags::NO_CONTACT_RESPONSE));
        if let Some(friction) = desc.friction {
            collider = collider.friction(friction);
        }
        if let Some(restitution) = desc.restitution {
            collider = collider.restitution(restitution);
        }
        if motion == MotionKind::Dynamic {
            collider = collider.mass(desc.mass.abs());
        }

        let handle = self.world_mut()?.insert_body(builder.build(), collider.build())?;
        let entity = if motion.is_read_back() {
            self.bodies.push(handle);
            EntityRef::Body(handle)
        } else {
            self.solids.push(handle);
            EntityRef::Solid(handle)
        };
        Ok(self.register(desc.name.as_deref(), entity))
    }

    /// Both bodies must already exist; otherwise nothing is built.
    pub fn add_joint(&mut self, desc: &JointDescriptor) -> PhysicsResult<Insertion> {
        let resolve = |names: &NameIndex, name: &str| {
            names.body(name).ok_or_else(|| PhysicsError::UnresolvedBody {
                context: "joint",
                name: name.to_string(),
            })
        };
        let body_a = resolve(&self.names, &desc.body_a)?;
        let body_b = resolve(&self.names, &desc.body_b)?;
        let capacity = self.config.max_joints;
        if self.joints.len() >= capacity {
            return Err(PhysicsError::ResultBufferFull {
                kind: "joints",
                capacity,
            });
        }

        let data = build_joint(desc);
        let handle = self
            .world_mut()?
            .impulse_joint_set
            .insert(body_a, body_b, data, true);
        self.joints.push((handle, desc.kind.type_tag()));
        Ok(self.register(desc.name.as_deref(), EntityRef::Joint(handle)))
    }

    pub fn add_terrain(&mut self, desc: &TerrainDescriptor) -> PhysicsResult<Insertion> {
        let world = self.world.as_mut().ok_or(PhysicsError::NoWorld)?;
        let handle = self.terrains.add(world, desc)?;
        Ok(self.register(Some(&desc.name), EntityRef::Terrain(handle)))
    }

    fn register(&mut self, name: Option<&str>, entity: EntityRef) -> Insertion {
        let insertion = self.names.insert(name, entity);
        if let (Some(name), Insertion::Overwrote(previous)) = (name, insertion) {
            log::warn!("name `{name}` now refers to a new entity; {previous:?} is no longer reachable by name");
        }
        insertion
    }

    /// Remove the entity called `name` from the world and every registry.
    /// Unknown names are ignored.
    pub fn remove_by_name(&mut self, name: &str) -> bool {
        let Some(world) = self.world.as_mut() else {
            return false;
        };
        let Some(entity) = self.names.remove(name) else {
            if self.config.debug {
                log::debug!("remove ignored: no entity named `{name}`");
            }
            return false;
        };

        match entity {
            EntityRef::Body(h) => {
                self.bodies.remove_first(|b| *b == h);
                world.remove_body(h);
            }
            EntityRef::Solid(h) => {
                self.solids.remove_first(|b| *b == h);
                world.remove_body(h);
            }
            EntityRef::Terrain(h) => {
                self.terrains.remove(world, h);
            }
            EntityRef::Joint(h) => {
                self.joints.remove_first(|(j, _)| *j == h);
                world.remove_joint(h);
            }
        }
        self.names.evict(entity);

        // Removing a body takes its joints with it.
        let detached = self
            .joints
            .drain_unless(|(j, _)| world.impulse_joint_set.get(*j).is_some());
        for (joint, _) in detached {
            self.names.evict(EntityRef::Joint(joint));
        }
        true
    }

    /// Remove each name in order, returning how many existed.
    pub fn remove_many<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) -> usize {
        names
            .into_iter()
            .filter(|name| self.remove_by_name(name))
            .count()
    }

    // ---- queues ----------------------------------------------------------

    pub fn queue_force(&mut self, command: ForceCommand) {
        self.forces.push(command);
    }

    pub fn queue_forces(&mut self, commands: impl IntoIterator<Item = ForceCommand>) {
        self.forces.extend(commands);
    }

    pub fn queue_transform(&mut self, entry: TransformOverride) {
        self.transforms.push(entry);
    }

    pub fn queue_transforms(&mut self, entries: impl IntoIterator<Item = TransformOverride>) {
        self.transforms.extend(entries);
    }

    pub fn pending_commands(&self) -> (usize, usize) {
        (self.forces.len(), self.transforms.len())
    }

    // ---- contacts --------------------------------------------------------

    pub fn add_contact_group(&mut self, desc: &ContactGroupDescriptor) -> PhysicsResult<usize> {
        self.contacts.add(desc, &self.names).map_err(|err| {
            log::warn!("contact group `{}` rejected: {err}", desc.name);
            err
        })
    }

    pub fn remove_contact_group(&mut self, name: &str) -> bool {
        self.contacts.remove(name)
    }

    pub fn remove_all_contact_groups(&mut self) {
        self.contacts.clear();
    }

    pub fn enable_contact_group(&mut self, name: &str) -> bool {
        self.contacts.enable(name)
    }

    pub fn disable_contact_group(&mut self, name: &str) -> bool {
        self.contacts.disable(name)
    }

    pub fn enable_all_contact_groups(&mut self) {
        self.contacts.enable_all();
    }

    pub fn disable_all_contact_groups(&mut self) {
        self.contacts.disable_all();
    }

    pub fn contact_groups(&self) -> &ContactGroups {
        &self.contacts
    }

    // ---- terrain and queries ---------------------------------------------

    /// Stage new heights for the terrain `name` currently refers to; they
    /// are uploaded at the start of the next step.
    pub fn upload_terrain_data(&mut self, name: &str, heights: Vec<f32>) -> PhysicsResult<()> {
        match self.names.get(name) {
            Some(EntityRef::Terrain(body)) => self.terrains.set_height_data(body, heights),
            _ => Err(PhysicsError::UnknownTerrain(name.to_string())),
        }
    }

    pub fn ray_test(&mut self, from: Vec3, to: Vec3) -> Option<RayHit> {
        let world = self.world.as_mut()?;
        world.update_query_pipeline();
        let hit = world.ray_test(from, to)?;
        let name = hit.body.and_then(|h| {
            [EntityRef::Body(h), EntityRef::Solid(h), EntityRef::Terrain(h)]
                .into_iter()
                .find_map(|entity| self.names.name_of(entity))
                .map(str::to_string)
        });
        Some(RayHit {
            name,
            point: hit.point,
            normal: hit.normal,
            distance: hit.distance,
        })
    }

    // ---- stepping --------------------------------------------------------

    /// Run one frame: overrides, forces, terrain uploads, integration,
    /// encoding and contact tests, in that order.
    pub fn step(&mut self, input: FrameInput) -> StepOutcome {
        let Some(world) = self.world.as_mut() else {
            log::warn!("step requested without a world");
            return StepOutcome::idle();
        };
        let debug = self.config.debug;

        apply_transform_overrides(world, &self.names, &mut self.transforms, debug);
        apply_forces(world, &self.names, &mut self.forces, debug);
        let terrain_ready = self.terrains.advance(world);

        // Long stalls are not caught up; at most `substeps` frames advance.
        let max_span = self.time_step * self.substeps as f32;
        let dt = if input.time_step > 0.0 {
            input.time_step.min(max_span)
        } else {
            self.time_step
        };
        world.advance(dt, self.substeps);

        let mut buffer = self.buffer.take().unwrap_or_else(|| {
            log::warn!("result buffer was not recycled; allocating a new one");
            ResultBuffer::new(self.config.layout())
        });
        for (id, handle) in self.bodies.iter().enumerate() {
            let Some(body) = world.rigid_body_set.get(*handle) else {
                continue;
            };
            let magnitude = body.linvel().norm() * MAGNITUDE_SCALE;
            let transform = transform_from_isometry(body.position());
            if let Err(err) = buffer.encode_body(id, magnitude, &transform) {
                log::warn!("{err}");
                break;
            }
        }
        for (id, (_, tag)) in self.joints.iter().enumerate() {
            if let Err(err) = buffer.encode_joint(id, *tag) {
                log::warn!("{err}");
                break;
            }
        }

        world.update_query_pipeline();
        self.contacts.run(world);

        StepOutcome {
            status: true,
            buffer: Some(buffer),
            contacts: self.contacts.results().to_vec(),
            terrain_ready,
        }
    }

    /// Hand the result buffer back after the host has read it.
    pub fn recycle(&mut self, mut buffer: ResultBuffer) {
        if buffer.layout() != self.config.layout() {
            log::warn!("discarding result buffer with a foreign layout");
            buffer = ResultBuffer::new(self.config.layout());
        }
        self.buffer = Some(buffer);
    }

    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    // ---- introspection ---------------------------------------------------

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn solid_count(&self) -> usize {
        self.solids.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn terrain_count(&self) -> usize {
        self.terrains.len()
    }

    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    pub fn lookup(&self, name: &str) -> Option<EntityRef> {
        self.names.get(name)
    }

    /// Result-buffer id of a dynamic or kinematic body.
    pub fn body_id(&self, name: &str) -> Option<usize> {
        let EntityRef::Body(handle) = self.names.get(name)? else {
            return None;
        };
        self.bodies.iter().position(|h| *h == handle)
    }

    pub fn native_counts(&self) -> NativeCounts {
        self.world
            .as_ref()
            .map(PhysicsWorld::native_counts)
            .unwrap_or_default()
    }

    pub fn height_heap(&self) -> &HeightHeap {
        self.terrains.heap()
    }

    pub fn body_state(&self, name: &str) -> Option<BodyState> {
        let handle = self.names.body(name)?;
        let body = self.world.as_ref()?.rigid_body_set.get(handle)?;
        Some(BodyState {
            transform: transform_from_isometry(body.position()),
            linear_velocity: vec_from_na(body.linvel()),
            angular_velocity: vec_from_na(body.angvel()),
            sleeping: body.is_sleeping(),
        })
    }
}

impl Drop for SimulationSession {
    fn drop(&mut self) {
        self.destroy_world();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ChildShape, JointKind, ShapeSpec};
    use crate::queues::{ForceOp, HoldMask};
    use glam::Quat;

    fn session() -> SimulationSession {
        SimulationSession::new(WorldConfig::default())
    }

    fn ball(name: &str, position: Vec3) -> RigidBodyDescriptor {
        RigidBodyDescriptor::new(ShapeSpec::Sphere)
            .named(name)
            .with_size(Vec3::splat(0.5))
            .with_mass(1.0)
            .at(position)
    }

    fn cube_vertices() -> Vec<f32> {
        let mut v = Vec::new();
        for x in [-0.5, 0.5] {
            for y in [-0.5, 0.5] {
                for z in [-0.5, 0.5] {
                    v.extend_from_slice(&[x, y, z]);
                }
            }
        }
        v
    }

    fn step(session: &mut SimulationSession) -> StepOutcome {
        let outcome = session.step(FrameInput::default());
        assert!(outcome.status);
        outcome
    }

    fn step_and_recycle(session: &mut SimulationSession) -> (ResultBuffer, Vec<u8>) {
        let mut outcome = step(session);
        let buffer = outcome.buffer.take().unwrap();
        session.recycle(buffer.clone());
        (buffer, outcome.contacts)
    }

    #[test]
    fn every_shape_kind_adds_and_removes_cleanly() {
        let mut s = session();
        let baseline = s.native_counts();
        let tri = vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        let shapes = [
            (ShapeSpec::plane(), 0.0),
            (ShapeSpec::Box, 1.0),
            (ShapeSpec::Sphere, 1.0),
            (ShapeSpec::Cylinder, 1.0),
            (ShapeSpec::Cone, 1.0),
            (ShapeSpec::Capsule, 1.0),
            (
                ShapeSpec::Compound(vec![
                    ChildShape::new(ShapeSpec::Box, Vec3::ONE, Vec3::X),
                    ChildShape::new(ShapeSpec::Sphere, Vec3::splat(0.5), -Vec3::X),
                ]),
                2.0,
            ),
            (ShapeSpec::TriangleMesh { vertices: tri }, 0.0),
            (ShapeSpec::ConvexHull { vertices: cube_vertices() }, 1.0),
        ];
        for (shape, mass) in shapes {
            let kind = shape.kind();
            let desc = RigidBodyDescriptor::new(shape).named("x").with_mass(mass);
            assert_eq!(s.add_body(&desc).unwrap(), Insertion::Fresh, "{kind:?}");
            assert!(s.remove_by_name("x"), "{kind:?}");
            assert_eq!(s.native_counts(), baseline, "{kind:?}");
        }
        assert_eq!(s.name_count(), 0);
        assert_eq!(s.body_count() + s.solid_count(), 0);
    }

    #[test]
    fn classification_splits_bodies_and_solids() {
        let mut s = session();
        s.add_body(&ball("dyn", Vec3::ZERO)).unwrap();
        s.add_body(&RigidBodyDescriptor::new(ShapeSpec::Box).named("kin").kinematic())
            .unwrap();
        s.add_body(&RigidBodyDescriptor::new(ShapeSpec::plane()).named("ground"))
            .unwrap();
        assert_eq!(s.body_count(), 2);
        assert_eq!(s.solid_count(), 1);
        assert!(matches!(s.lookup("ground"), Some(EntityRef::Solid(_))));
        assert_eq!(s.body_id("kin"), Some(1));
        assert_eq!(s.body_id("ground"), None);
    }

    #[test]
    fn duplicate_names_overwrite_but_keep_both_bodies() {
        let mut s = session();
        s.add_body(&ball("a", Vec3::ZERO)).unwrap();
        let second = s.add_body(&ball("a", Vec3::X * 3.0)).unwrap();
        assert!(second.is_overwrite());
        assert_eq!(s.body_count(), 2);
        assert_eq!(s.name_count(), 1);
        assert_eq!(s.body_id("a"), Some(1));
    }

    #[test]
    fn unknown_names_are_silent_no_ops() {
        let mut s = session();
        assert!(!s.remove_by_name("ghost"));
        s.queue_force(ForceCommand::new("ghost", ForceOp::CentralForce(Vec3::Y)));
        s.queue_transform(TransformOverride::to_position("ghost", Vec3::ONE));
        step(&mut s);
        assert_eq!(s.pending_commands(), (0, 0));
    }

    #[test]
    fn falling_sphere_settles_on_the_ground() {
        let mut s = session();
        s.add_body(&RigidBodyDescriptor::new(ShapeSpec::plane()).named("ground"))
            .unwrap();
        s.add_body(
            &RigidBodyDescriptor::new(ShapeSpec::Sphere)
                .named("ball")
                .with_size(Vec3::ONE)
                .with_mass(1.0)
                .at(Vec3::new(0.0, 5.0, 0.0)),
        )
        .unwrap();
        let id = s.body_id("ball").unwrap();

        let mut last_y = 5.0_f32;
        let mut landed = false;
        for _ in 0..120 {
            let (buffer, _) = step_and_recycle(&mut s);
            if let Some(t) = buffer.decode_body(id) {
                if !landed {
                    assert!(t.position.y <= last_y + 1e-4, "rose from {last_y} to {}", t.position.y);
                }
                landed |= t.position.y < 1.05;
                last_y = t.position.y;
            }
        }
        assert!((last_y - 1.0).abs() < 0.1, "y = {last_y}");
        let state = s.body_state("ball").unwrap();
        assert!(state.linear_velocity.y.abs() < 0.5);
    }

    #[test]
    fn impulse_produces_positive_magnitude() {
        let mut s = SimulationSession::new(WorldConfig {
            gravity: [0.0; 3],
            ..Default::default()
        });
        s.add_body(&ball("b", Vec3::ZERO)).unwrap();
        let (buffer, _) = step_and_recycle(&mut s);
        assert_eq!(buffer.body(0).unwrap().magnitude, 0.0);
        assert_eq!(buffer.decode_body(0), None);

        s.queue_force(ForceCommand::new("b", ForceOp::CentralImpulse(Vec3::new(1.0, 0.0, 0.0))));
        let (buffer, _) = step_and_recycle(&mut s);
        let slot = buffer.body(0).unwrap();
        assert!(slot.magnitude > 0.0);
        assert!(slot.position[0] > 0.0);
    }

    #[test]
    fn kinematic_override_moves_without_teleporting() {
        let mut s = SimulationSession::new(WorldConfig {
            gravity: [0.0; 3],
            ..Default::default()
        });
        s.add_body(&RigidBodyDescriptor::new(ShapeSpec::Box).named("k").kinematic())
            .unwrap();
        s.queue_transform(TransformOverride {
            target: "k".into(),
            position: Some(Vec3::new(0.5, 0.0, 0.0)),
            rotation: Some(Quat::IDENTITY),
            hold: HoldMask::default(),
        });
        let (buffer, _) = step_and_recycle(&mut s);
        let t = buffer.decode_body(0).unwrap();
        assert!(t.position.abs_diff_eq(Vec3::new(0.5, 0.0, 0.0), 1e-4));
        // The solver saw continuous motion and derived a velocity from it.
        assert!(s.body_state("k").unwrap().linear_velocity.x > 0.0);
    }

    #[test]
    fn dynamic_override_resets_momentum() {
        let mut s = SimulationSession::new(WorldConfig {
            gravity: [0.0; 3],
            ..Default::default()
        });
        s.add_body(&ball("b", Vec3::ZERO)).unwrap();
        s.queue_force(ForceCommand::new("b", ForceOp::CentralImpulse(Vec3::X * 5.0)));
        step(&mut s);
        s.queue_transform(TransformOverride::to_position("b", Vec3::new(0.0, 3.0, 0.0)));
        step(&mut s);
        let state = s.body_state("b").unwrap();
        assert_eq!(state.linear_velocity, Vec3::ZERO);
        assert!(state.transform.position.abs_diff_eq(Vec3::new(0.0, 3.0, 0.0), 1e-4));
    }

    #[test]
    fn ids_shift_down_after_removal() {
        let mut s = SimulationSession::new(WorldConfig {
            gravity: [0.0; 3],
            ..Default::default()
        });
        for (name, x) in [("a", 0.0), ("b", 5.0), ("c", 10.0)] {
            s.add_body(&ball(name, Vec3::new(x, 0.0, 0.0))).unwrap();
        }
        assert!(s.remove_by_name("b"));
        assert_eq!(s.body_id("c"), Some(1));

        s.queue_force(ForceCommand::new("c", ForceOp::CentralImpulse(Vec3::Y)));
        let (buffer, _) = step_and_recycle(&mut s);
        let t = buffer.decode_body(1).unwrap();
        assert!((t.position.x - 10.0).abs() < 1e-4);
    }

    #[test]
    fn joints_write_their_tag_and_die_with_their_bodies() {
        let mut s = session();
        s.add_body(&ball("a", Vec3::ZERO)).unwrap();
        s.add_body(&ball("b", Vec3::X)).unwrap();
        let hinge = JointDescriptor::new(JointKind::hinge(Vec3::Y), "a", "b")
            .named("h")
            .anchors(Vec3::X * 0.5, -Vec3::X * 0.5);
        s.add_joint(&hinge).unwrap();

        let (buffer, _) = step_and_recycle(&mut s);
        assert_eq!(buffer.joint(0).unwrap().type_tag, 2.0);

        assert!(s.remove_by_name("a"));
        assert_eq!(s.joint_count(), 0);
        assert!(s.lookup("h").is_none());
        assert_eq!(s.native_counts().joints, 0);
    }

    #[test]
    fn joint_with_missing_body_builds_nothing() {
        let mut s = session();
        s.add_body(&ball("a", Vec3::ZERO)).unwrap();
        let err = s
            .add_joint(&JointDescriptor::new(JointKind::PointToPoint, "a", "missing"))
            .unwrap_err();
        assert_eq!(
            err,
            PhysicsError::UnresolvedBody {
                context: "joint",
                name: "missing".into()
            }
        );
        assert_eq!(s.joint_count(), 0);
        assert_eq!(s.native_counts().joints, 0);
    }

    #[test]
    fn motor_updates_reach_named_hinges() {
        let mut s = SimulationSession::new(WorldConfig {
            gravity: [0.0; 3],
            ..Default::default()
        });
        s.add_body(&RigidBodyDescriptor::new(ShapeSpec::Box).named("base")).unwrap();
        s.add_body(&ball("wheel", Vec3::new(0.0, 2.0, 0.0))).unwrap();
        s.add_joint(
            &JointDescriptor::new(JointKind::hinge(Vec3::Y), "base", "wheel")
                .named("axle")
                .anchors(Vec3::new(0.0, 2.0, 0.0), Vec3::ZERO),
        )
        .unwrap();
        s.queue_force(ForceCommand::new(
            "axle",
            ForceOp::Motor {
                target_velocity: 3.0,
                max_impulse: 100.0,
            },
        ));
        step(&mut s);
        step(&mut s);
        let spin = s.body_state("wheel").unwrap().angular_velocity.y.abs();
        assert!((spin - 3.0).abs() < 0.3, "spin = {spin}");

        // A weak motor is capped by its max impulse.
        s.queue_force(ForceCommand::new(
            "axle",
            ForceOp::Motor {
                target_velocity: 30.0,
                max_impulse: 0.01,
            },
        ));
        step(&mut s);
        let capped = s.body_state("wheel").unwrap().angular_velocity.y.abs();
        assert!(capped < 4.0, "capped = {capped}");
    }

    #[test]
    fn overlapping_pair_reports_contact_until_separated() {
        let mut s = session();
        s.add_body(&ball("A", Vec3::ZERO)).unwrap();
        s.add_body(&ball("B", Vec3::new(0.4, 0.0, 0.0))).unwrap();
        let slot = s
            .add_contact_group(&ContactGroupDescriptor::pair("ab", "A", "B"))
            .unwrap();
        assert_eq!(slot, 0);

        let (_, contacts) = step_and_recycle(&mut s);
        assert_eq!(contacts, vec![1]);

        s.queue_transform(TransformOverride::to_position("B", Vec3::new(20.0, 0.0, 0.0)));
        let (_, contacts) = step_and_recycle(&mut s);
        assert_eq!(contacts, vec![0]);
    }

    #[test]
    fn contact_slots_stay_dense_and_disable_is_idempotent() {
        let mut s = session();
        s.add_body(&ball("A", Vec3::ZERO)).unwrap();
        s.add_body(&ball("B", Vec3::new(0.4, 0.0, 0.0))).unwrap();
        for name in ["g0", "g1", "g2"] {
            s.add_contact_group(&ContactGroupDescriptor::single(name, "A")).unwrap();
        }
        assert!(s.add_contact_group(&ContactGroupDescriptor::single("bad", "nobody")).is_err());
        assert!(s.remove_contact_group("g0"));
        assert_eq!(s.contact_groups().slot_of("g2"), Some(1));

        let (_, contacts) = step_and_recycle(&mut s);
        assert_eq!(contacts, vec![1, 1]);

        s.disable_contact_group("g1");
        s.disable_contact_group("g1");
        s.queue_transform(TransformOverride::to_position("B", Vec3::new(20.0, 0.0, 0.0)));
        let (_, contacts) = step_and_recycle(&mut s);
        assert_eq!(contacts, vec![1, 0]);

        s.enable_all_contact_groups();
        let (_, contacts) = step_and_recycle(&mut s);
        assert_eq!(contacts, vec![0, 0]);
    }

    #[test]
    fn terrain_uploads_once_per_change_without_reallocating() {
        let mut s = session();
        let desc = TerrainDescriptor {
            samples: [8, 8],
            heights: vec![0.0; 64],
            size: Vec3::new(20.0, 1.0, 20.0),
            ..Default::default()
        };
        s.add_terrain(&desc).unwrap();

        assert_eq!(step(&mut s).terrain_ready, vec!["terrain".to_string()]);
        assert!(step(&mut s).terrain_ready.is_empty());

        s.upload_terrain_data("terrain", vec![1.0; 64]).unwrap();
        assert_eq!(step(&mut s).terrain_ready.len(), 1);
        assert_eq!(s.height_heap().allocations(), 1);
        assert_eq!(s.height_heap().live(), 1);

        assert!(s.remove_by_name("terrain"));
        assert_eq!(s.height_heap().live(), 0);
        assert_eq!(
            s.upload_terrain_data("terrain", vec![1.0; 64]),
            Err(PhysicsError::UnknownTerrain("terrain".to_string()))
        );
    }

    #[test]
    fn new_terrain_is_solid_before_the_first_step() {
        let mut s = session();
        s.add_terrain(&TerrainDescriptor {
            samples: [4, 4],
            heights: vec![2.0; 16],
            size: Vec3::new(10.0, 1.0, 10.0),
            ..Default::default()
        })
        .unwrap();

        let hit = s.ray_test(Vec3::new(0.3, 10.0, 0.2), Vec3::new(0.3, -10.0, 0.2)).unwrap();
        assert_eq!(hit.name.as_deref(), Some("terrain"));
        assert!((hit.point.y - 2.0).abs() < 1e-3, "hit at {}", hit.point);
        assert_eq!(step(&mut s).terrain_ready, vec!["terrain".to_string()]);
    }

    #[test]
    fn uploads_follow_the_name_to_the_newest_terrain() {
        let mut s = session();
        let flat = |x: f32| TerrainDescriptor {
            samples: [4, 4],
            heights: vec![0.0; 16],
            size: Vec3::new(4.0, 1.0, 4.0),
            position: Vec3::new(x, 0.0, 0.0),
            ..Default::default()
        };
        s.add_terrain(&flat(0.0)).unwrap();
        assert!(s.add_terrain(&flat(20.0)).unwrap().is_overwrite());
        step(&mut s);

        s.upload_terrain_data("terrain", vec![3.0; 16]).unwrap();
        step(&mut s);
        let down = |s: &mut SimulationSession, x: f32| {
            s.ray_test(Vec3::new(x + 0.3, 10.0, 0.2), Vec3::new(x + 0.3, -10.0, 0.2))
                .map(|hit| hit.point.y)
        };
        let newest = down(&mut s, 20.0).unwrap();
        let oldest = down(&mut s, 0.0).unwrap();
        assert!((newest - 3.0).abs() < 1e-3, "newest at {newest}");
        assert!(oldest.abs() < 1e-3, "oldest at {oldest}");

        // The name and the upload target are the same terrain.
        assert!(s.remove_by_name("terrain"));
        assert_eq!(s.terrain_count(), 1);
        assert!(s.upload_terrain_data("terrain", vec![1.0; 16]).is_err());
    }

    #[test]
    fn reset_frees_everything() {
        for full in [false, true] {
            let mut s = session();
            s.add_terrain(&TerrainDescriptor::default()).unwrap();
            s.add_body(&ball("a", Vec3::ZERO)).unwrap();
            s.add_body(&ball("b", Vec3::X)).unwrap();
            s.add_joint(&JointDescriptor::new(JointKind::PointToPoint, "a", "b")).unwrap();
            s.add_contact_group(&ContactGroupDescriptor::pair("ab", "a", "b")).unwrap();
            s.set_gravity(Vec3::ZERO);
            step(&mut s);
            assert_eq!(s.height_heap().live(), 1);

            s.reset(ResetOptions { full });
            assert_eq!(s.height_heap().live(), 0, "full: {full}");
            assert_eq!(s.native_counts(), NativeCounts::default(), "full: {full}");
            assert_eq!(s.name_count(), 0);
            assert!(s.contact_groups().is_empty());
            assert!(s.has_world());

            s.add_body(&ball("c", Vec3::ZERO)).unwrap();
            step(&mut s);
            assert!(s.body_state("c").unwrap().linear_velocity.y < 0.0, "gravity restored");
        }
    }

    #[test]
    fn world_lifecycle_guards() {
        let mut s = session();
        assert!(!s.create_world());
        s.add_terrain(&TerrainDescriptor::default()).unwrap();
        step(&mut s);
        s.destroy_world();
        assert_eq!(s.height_heap().live(), 0);
        assert!(!s.step(FrameInput::default()).status);
        assert_eq!(s.add_body(&ball("a", Vec3::ZERO)), Err(PhysicsError::NoWorld));
        assert!(s.create_world());
        assert!(s.add_body(&ball("a", Vec3::ZERO)).is_ok());
    }

    #[test]
    fn buffer_is_lent_and_returned() {
        let mut s = session();
        let mut outcome = step(&mut s);
        assert!(!s.has_buffer());
        let buffer = outcome.buffer.take().unwrap();
        assert_eq!(buffer.layout(), s.config().layout());
        s.recycle(buffer);
        assert!(s.has_buffer());

        // A lost buffer is replaced rather than stalling the session.
        step(&mut s);
        assert!(step(&mut s).buffer.is_some());
    }

    #[test]
    fn capacity_is_enforced_at_add_time() {
        let mut s = SimulationSession::new(WorldConfig {
            max_bodies: 1,
            max_joints: 0,
            ..Default::default()
        });
        s.add_body(&ball("a", Vec3::ZERO)).unwrap();
        assert!(matches!(
            s.add_body(&ball("b", Vec3::X)),
            Err(PhysicsError::ResultBufferFull { capacity: 1, .. })
        ));
        s.add_body(&RigidBodyDescriptor::new(ShapeSpec::Box).named("wall")).unwrap();
        assert!(s
            .add_joint(&JointDescriptor::new(JointKind::PointToPoint, "a", "wall"))
            .is_err());
    }

    #[test]
    fn parameters_and_ray_test() {
        let mut s = session();
        s.set_parameters(WorldParameters {
            substeps: Some(4),
            time_step: Some(1.0 / 120.0),
            ..Default::default()
        });
        assert_eq!(s.substeps(), 4);
        assert!((s.time_step() - 1.0 / 120.0).abs() < 1e-9);

        s.add_body(&RigidBodyDescriptor::new(ShapeSpec::plane()).named("ground"))
            .unwrap();
        let hit = s.ray_test(Vec3::new(0.0, 10.0, 0.0), Vec3::new(0.0, -10.0, 0.0)).unwrap();
        assert_eq!(hit.name.as_deref(), Some("ground"));
        assert!((hit.distance - 10.0).abs() < 1e-4);
        assert!(hit.normal.abs_diff_eq(Vec3::Y, 1e-4));
    }

    #[test]
    fn entity_dispatch_and_batch_removal() {
        let mut s = session();
        s.add_entity(ball("a", Vec3::ZERO).into()).unwrap();
        s.add_entity(ball("b", Vec3::X * 2.0).into()).unwrap();
        s.add_entity(JointDescriptor::new(JointKind::PointToPoint, "a", "b").named("j").into())
            .unwrap();
        assert_eq!(s.remove_many(["j", "nobody", "a", "b"]), 3);
        assert_eq!(s.native_counts(), NativeCounts::default());
    }
}
