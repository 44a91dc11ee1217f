//! Fixed-stride packing of body transforms and joint tags into the flat
//! result buffer exchanged once per step.
//!
//! Layout, in `f32` scalars:
//! - bodies start at offset 0, `BODY_STRIDE` scalars each:
//!   `[magnitude, px, py, pz, qx, qy, qz, qw]`
//! - joints start at `max_bodies * BODY_STRIDE`, `JOINT_STRIDE` scalars each:
//!   `[type_tag, reserved, reserved, reserved]`
//!
//! The buffer is sized once from a [`BufferLayout`] and never resized.

use crate::Transform;
use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};
use thiserror::Error;

pub const BODY_STRIDE: usize = 8;
pub const JOINT_STRIDE: usize = 4;

/// One body's slot range.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct BodySlot {
    /// Scaled linear speed. Zero means "not re-encoded this step".
    pub magnitude: f32,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
}

impl BodySlot {
    pub fn transform(&self) -> Transform {
        let [x, y, z] = self.position;
        let [qx, qy, qz, qw] = self.rotation;
        Transform::from_position_rotation(Vec3::new(x, y, z), Quat::from_xyzw(qx, qy, qz, qw))
    }
}

/// One joint's slot range.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct JointSlot {
    pub type_tag: f32,
    pub reserved: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("body id {id} exceeds buffer capacity of {capacity} bodies")]
    BodyOutOfRange { id: usize, capacity: usize },
    #[error("joint id {id} exceeds buffer capacity of {capacity} joints")]
    JointOutOfRange { id: usize, capacity: usize },
}

/// Capacities fixed at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    pub max_bodies: usize,
    pub max_joints: usize,
}

impl Default for BufferLayout {
    fn default() -> Self {
        Self {
            max_bodies: 1000,
            max_joints: 100,
        }
    }
}

impl BufferLayout {
    pub fn new(max_bodies: usize, max_joints: usize) -> Self {
        Self { max_bodies, max_joints }
    }

    pub fn body_base(&self) -> usize {
        0
    }

    pub fn joint_base(&self) -> usize {
        self.max_bodies * BODY_STRIDE
    }

    pub fn body_offset(&self, id: usize) -> usize {
        self.body_base() + id * BODY_STRIDE
    }

    pub fn joint_offset(&self, id: usize) -> usize {
        self.joint_base() + id * JOINT_STRIDE
    }

    /// Total scalar count.
    pub fn len(&self) -> usize {
        self.joint_base() + self.max_joints * JOINT_STRIDE
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The flat per-step result buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultBuffer {
    layout: BufferLayout,
    data: Vec<f32>,
}

impl ResultBuffer {
    pub fn new(layout: BufferLayout) -> Self {
        Self {
            layout,
            data: vec![0.0; layout.len()],
        }
    }

    pub fn layout(&self) -> BufferLayout {
        self.layout
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Zero every slot without reallocating.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    fn bodies(&self) -> &[BodySlot] {
        bytemuck::cast_slice(&self.data[..self.layout.joint_base()])
    }

    fn bodies_mut(&mut self) -> &mut [BodySlot] {
        let end = self.layout.joint_base();
        bytemuck::cast_slice_mut(&mut self.data[..end])
    }

    fn joints(&self) -> &[JointSlot] {
        bytemuck::cast_slice(&self.data[self.layout.joint_base()..])
    }

    fn joints_mut(&mut self) -> &mut [JointSlot] {
        let start = self.layout.joint_base();
        bytemuck::cast_slice_mut(&mut self.data[start..])
    }

    /// Write a body's magnitude, and its transform only when the magnitude
    /// is strictly positive. A resting body's transform slots keep whatever
    /// was last written there.
    pub fn encode_body(
        &mut self,
        id: usize,
        magnitude: f32,
        transform: &Transform,
    ) -> Result<(), CodecError> {
        let capacity = self.layout.max_bodies;
        let slot = self
            .bodies_mut()
            .get_mut(id)
            .ok_or(CodecError::BodyOutOfRange { id, capacity })?;
        slot.magnitude = magnitude;
        if magnitude > 0.0 {
            let [px, py, pz, qx, qy, qz, qw] = transform.to_array();
            slot.position = [px, py, pz];
            slot.rotation = [qx, qy, qz, qw];
        }
        Ok(())
    }

    pub fn encode_joint(&mut self, id: usize, type_tag: u8) -> Result<(), CodecError> {
        let capacity = self.layout.max_joints;
        let slot = self
            .joints_mut()
            .get_mut(id)
            .ok_or(CodecError::JointOutOfRange { id, capacity })?;
        slot.type_tag = f32::from(type_tag);
        Ok(())
    }

    pub fn body(&self, id: usize) -> Option<&BodySlot> {
        self.bodies().get(id)
    }

    pub fn joint(&self, id: usize) -> Option<&JointSlot> {
        self.joints().get(id)
    }

    /// The transform to apply for body `id`, or `None` when the body was
    /// not re-encoded this step (the host keeps its last known pose).
    pub fn decode_body(&self, id: usize) -> Option<Transform> {
        self.body(id)
            .filter(|slot| slot.magnitude > 0.0)
            .map(BodySlot::transform)
    }
}
