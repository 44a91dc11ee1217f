//! Rigid-body simulation side of the physics bridge, built on Rapier3D.
//!
//! [`SimulationSession`] owns the world and everything in it. Hosts talk to
//! it through descriptors and named command queues, step it once per frame,
//! and read transforms back from the returned [`engine_core::ResultBuffer`].

pub mod collision;
pub mod config;
pub mod contact;
pub mod convert;
pub mod descriptor;
pub mod error;
pub mod joints;
pub mod physics_world;
pub mod queues;
pub mod raycast;
pub mod registry;
pub mod session;
pub mod shapes;
pub mod terrain;

pub use collision::*;
pub use config::*;
pub use contact::{ContactGroupDescriptor, ContactGroups};
pub use descriptor::*;
pub use error::{PhysicsError, PhysicsResult};
pub use physics_world::*;
pub use queues::{ForceCommand, ForceOp, HoldMask, TransformOverride};
pub use raycast::{RayHit, RaycastHit};
pub use registry::{EntityRef, Insertion};
pub use session::{BodyState, SimulationSession, StepOutcome, MAGNITUDE_SCALE};
pub use terrain::HeightHeap;

// Re-export Rapier for downstream crates
pub use rapier3d;
