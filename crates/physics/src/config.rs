//! Session configuration and live world tuning.

use engine_core::BufferLayout;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Broadphase strategy chosen at world creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BroadphaseKind {
    /// Bounded sweep-and-prune: dynamic bodies leaving the cube of
    /// `half_extent` around the origin are disabled, and at most
    /// `max_handles` colliders may exist.
    AxisSweep { half_extent: f32, max_handles: usize },
    /// Unbounded bounding-volume tree.
    DynamicTree,
}

impl BroadphaseKind {
    pub fn axis_sweep() -> Self {
        Self::AxisSweep {
            half_extent: 1000.0,
            max_handles: 4096,
        }
    }
}

impl Default for BroadphaseKind {
    fn default() -> Self {
        Self::DynamicTree
    }
}

/// Everything fixed at session start. Loaded from RON by the host binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    #[serde(default)]
    pub broadphase: BroadphaseKind,
    #[serde(default = "default_gravity")]
    pub gravity: [f32; 3],
    /// Result buffer capacity, in bodies.
    #[serde(default = "default_max_bodies")]
    pub max_bodies: usize,
    /// Result buffer capacity, in joints.
    #[serde(default = "default_max_joints")]
    pub max_joints: usize,
    #[serde(default = "default_time_step")]
    pub time_step: f32,
    #[serde(default = "default_substeps")]
    pub substeps: u32,
    #[serde(default)]
    pub allowed_penetration: Option<f32>,
    /// Log dropped queue entries and other swallowed lookups.
    #[serde(default)]
    pub debug: bool,
}

fn default_gravity() -> [f32; 3] {
    [0.0, -10.0, 0.0]
}
fn default_max_bodies() -> usize {
    1000
}
fn default_max_joints() -> usize {
    100
}
fn default_time_step() -> f32 {
    1.0 / 60.0
}
fn default_substeps() -> u32 {
    2
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            broadphase: BroadphaseKind::default(),
            gravity: default_gravity(),
            max_bodies: default_max_bodies(),
            max_joints: default_max_joints(),
            time_step: default_time_step(),
            substeps: default_substeps(),
            allowed_penetration: None,
            debug: false,
        }
    }
}

impl WorldConfig {
    pub fn gravity(&self) -> Vec3 {
        Vec3::from_array(self.gravity)
    }

    pub fn layout(&self) -> BufferLayout {
        BufferLayout::new(self.max_bodies, self.max_joints)
    }
}

/// Live tuning. Absent fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WorldParameters {
    pub gravity: Option<Vec3>,
    pub time_step: Option<f32>,
    pub substeps: Option<u32>,
    pub allowed_penetration: Option<f32>,
}

/// Per-frame input sent with every step request.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameInput {
    /// Opaque input bits forwarded from the host.
    pub input_flags: u32,
    /// Seconds to advance. Zero or negative uses the session time step.
    pub time_step: f32,
}

impl FrameInput {
    pub fn with_time_step(time_step: f32) -> Self {
        Self {
            input_flags: 0,
            time_step,
        }
    }
}

/// Options for a session reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetOptions {
    /// Also destroy and rebuild the world itself.
    pub full: bool,
}
