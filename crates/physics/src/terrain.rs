//! Height-field terrain.
//!
//! Height samples live in blocks handed out by a [`HeightHeap`], which keeps
//! a live count so a missing free shows up as a non-zero count instead of a
//! silent leak. Blocks cannot be cloned; the only way to release one is
//! [`HeightHeap::free`].

use crate::collision::interaction_groups;
use crate::convert::isometry;
use crate::descriptor::{TerrainDescriptor, UpAxis};
use crate::error::{PhysicsError, PhysicsResult};
use crate::physics_world::PhysicsWorld;
use glam::{Quat, Vec3};
use rapier3d::na::DMatrix;
use rapier3d::prelude::*;

/// Scratch storage for one terrain's height samples.
#[derive(Debug)]
pub struct HeightBlock {
    samples: Vec<f32>,
}

impl HeightBlock {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }
}

/// Allocation bookkeeping for height blocks.
#[derive(Debug, Default)]
pub struct HeightHeap {
    live: usize,
    allocations: usize,
}

impl HeightHeap {
    pub fn allocate(&mut self, len: usize) -> HeightBlock {
        self.live += 1;
        self.allocations += 1;
        log::trace!("height block allocated ({len} samples, {} live)", self.live);
        HeightBlock {
            samples: vec![0.0; len],
        }
    }

    pub fn free(&mut self, block: HeightBlock) {
        self.live = self.live.saturating_sub(1);
        log::trace!("height block freed ({} samples, {} live)", block.len(), self.live);
    }

    /// Blocks allocated and not yet freed.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Every allocation made over the heap's lifetime.
    pub fn allocations(&self) -> usize {
        self.allocations
    }
}

#[derive(Debug)]
pub struct Terrain {
    pub name: String,
    pub body: RigidBodyHandle,
    size: Vec3,
    samples: [usize; 2],
    staged: Option<Vec<f32>>,
    block: Option<HeightBlock>,
    /// Uploaded at creation; still owed a ready notice on the next advance.
    announce: bool,
}

impl Terrain {
    pub fn is_dirty(&self) -> bool {
        self.staged.is_some()
    }

    pub fn samples(&self) -> [usize; 2] {
        self.samples
    }

    /// Samples currently backing the collision shape.
    pub fn heights(&self) -> Option<&[f32]> {
        self.block.as_ref().map(HeightBlock::as_slice)
    }

    fn stage(&mut self, heights: Vec<f32>) -> PhysicsResult<()> {
        let expected = self.samples[0] * self.samples[1];
        if heights.len() != expected {
            return Err(PhysicsError::HeightDataMismatch {
                name: self.name.clone(),
                expected,
                actual: heights.len(),
            });
        }
        self.staged = Some(heights);
        Ok(())
    }

    /// Copy staged samples into the scratch block and rebuild the shape.
    /// Returns whether anything was uploaded.
    fn advance(&mut self, world: &mut PhysicsWorld, heap: &mut HeightHeap) -> bool {
        let Some(staged) = self.staged.take() else {
            return false;
        };
        if self.block.as_ref().map(HeightBlock::len) != Some(staged.len()) {
            if let Some(old) = self.block.take() {
                heap.free(old);
            }
            self.block = Some(heap.allocate(staged.len()));
        }
        let Some(block) = self.block.as_mut() else {
            return false;
        };
        block.samples.copy_from_slice(&staged);

        let [cols, rows] = self.samples;
        let samples = &block.samples;
        let heights = DMatrix::from_fn(rows, cols, |r, c| samples[r * cols + c]);
        let shape = SharedShape::heightfield(heights, vector![self.size.x, 1.0, self.size.z]);
        let collider = world
            .rigid_body_set
            .get(self.body)
            .and_then(|b| b.colliders().first().copied());
        if let Some(collider) = collider.and_then(|h| world.collider_set.get_mut(h)) {
            collider.set_shape(shape);
        }
        true
    }

    fn release(self, world: &mut PhysicsWorld, heap: &mut HeightHeap) {
        world.remove_body(self.body);
        if let Some(block) = self.block {
            heap.free(block);
        }
    }
}

/// Rotation taking the height field's local +Y onto the requested up axis.
fn up_rotation(axis: UpAxis) -> Quat {
    match axis {
        UpAxis::X => Quat::from_rotation_z(-std::f32::consts::FRAC_PI_2),
        UpAxis::Y => Quat::IDENTITY,
        UpAxis::Z => Quat::from_rotation_x(std::f32::consts::FRAC_PI_2),
    }
}

#[derive(Debug, Default)]
pub struct TerrainManager {
    terrains: Vec<Terrain>,
    heap: HeightHeap,
}

impl TerrainManager {
    /// Create a static height field and upload its initial samples.
    pub fn add(&mut self, world: &mut PhysicsWorld, desc: &TerrainDescriptor) -> PhysicsResult<RigidBodyHandle> {
        let [cols, rows] = desc.samples;
        if cols < 2 || rows < 2 {
            return Err(PhysicsError::TerrainTooSmall {
                name: desc.name.clone(),
            });
        }
        let expected = desc.sample_count();
        if desc.heights.len() != expected {
            return Err(PhysicsError::HeightDataMismatch {
                name: desc.name.clone(),
                expected,
                actual: desc.heights.len(),
            });
        }

        let body = RigidBodyBuilder::fixed()
            .position(isometry(desc.position, desc.rotation * up_rotation(desc.up_axis)))
            .build();
        // Flat placeholder, replaced by the initial upload below.
        let flat = SharedShape::heightfield(
            DMatrix::zeros(rows, cols),
            vector![desc.size.x, 1.0, desc.size.z],
        );
        let collider = ColliderBuilder::new(flat)
            .friction(desc.friction)
            .restitution(desc.restitution)
            .collision_groups(interaction_groups(desc.group, desc.mask))
            .build();
        let body = world.insert_body(body, collider)?;

        let mut terrain = Terrain {
            name: desc.name.clone(),
            body,
            size: desc.size,
            samples: desc.samples,
            staged: Some(desc.heights.clone()),
            block: None,
            announce: false,
        };
        terrain.announce = terrain.advance(world, &mut self.heap);
        self.terrains.push(terrain);
        log::debug!("terrain `{}` added ({cols}x{rows})", desc.name);
        Ok(body)
    }

    /// Stage new samples for the terrain owning `body`; they reach the
    /// collision shape on the next advance.
    pub fn set_height_data(&mut self, body: RigidBodyHandle, heights: Vec<f32>) -> PhysicsResult<()> {
        self.terrains
            .iter_mut()
            .find(|t| t.body == body)
            .ok_or_else(|| PhysicsError::UnknownTerrain(format!("{body:?}")))?
            .stage(heights)
    }

    /// Upload every dirty terrain, returning the names that changed
    /// (including terrains added since the last call).
    pub fn advance(&mut self, world: &mut PhysicsWorld) -> Vec<String> {
        let mut ready = Vec::new();
        for terrain in &mut self.terrains {
            let uploaded = terrain.advance(world, &mut self.heap);
            if uploaded | std::mem::take(&mut terrain.announce) {
                log::debug!("terrain `{}` heights uploaded", terrain.name);
                ready.push(terrain.name.clone());
            }
        }
        ready
    }

    pub fn remove(&mut self, world: &mut PhysicsWorld, body: RigidBodyHandle) -> bool {
        let Some(index) = self.terrains.iter().position(|t| t.body == body) else {
            return false;
        };
        let terrain = self.terrains.remove(index);
        log::debug!("terrain `{}` removed", terrain.name);
        terrain.release(world, &mut self.heap);
        true
    }

    pub fn clear(&mut self, world: &mut PhysicsWorld) {
        for terrain in std::mem::take(&mut self.terrains) {
            terrain.release(world, &mut self.heap);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Terrain> {
        self.terrains.iter().find(|t| t.name == name)
    }

    pub fn heap(&self) -> &HeightHeap {
        &self.heap
    }

    pub fn len(&self) -> usize {
        self.terrains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terrains.is_empty()
    }
}
